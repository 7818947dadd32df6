// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
//! Fixed-capacity columnar row batches exchanged between scanners and consumers.

pub mod pool;

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{ArrayRef, RecordBatch};
use arrow::datatypes::{Field, Schema, SchemaRef};

use crate::common::ids::SlotId;
use crate::common::status::{ScanError, ScanResult};

pub use pool::ChunkPool;

/// A reusable batch of at most `capacity` rows, wrapping an Arrow `RecordBatch`.
///
/// A chunk has exactly one owner at a time: the pool, the worker filling it, the
/// result queue, or the consumer.
#[derive(Debug, Clone)]
pub struct Chunk {
    batch: RecordBatch,
    capacity: usize,
    slot_id_to_index: Arc<HashMap<SlotId, usize>>,
}

impl Chunk {
    /// An empty chunk of `schema` able to hold `capacity` rows.
    pub fn with_capacity(schema: SchemaRef, capacity: usize) -> Self {
        let slot_id_to_index = slot_id_to_index_from_schema(schema.as_ref()).unwrap_or_default();
        Self {
            batch: RecordBatch::new_empty(schema),
            capacity,
            slot_id_to_index: Arc::new(slot_id_to_index),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn into_batch(self) -> RecordBatch {
        self.batch
    }

    pub fn columns(&self) -> &[ArrayRef] {
        self.batch.columns()
    }

    /// Replaces the chunk contents; rejects batches larger than the capacity.
    pub fn fill(&mut self, batch: RecordBatch) -> ScanResult<()> {
        if batch.num_rows() > self.capacity {
            return Err(ScanError::internal(format!(
                "batch of {} rows exceeds chunk capacity {}",
                batch.num_rows(),
                self.capacity
            )));
        }
        if batch.schema() != self.batch.schema() {
            let map = slot_id_to_index_from_schema(batch.schema().as_ref())
                .map_err(ScanError::InternalError)?;
            self.slot_id_to_index = Arc::new(map);
        }
        self.batch = batch;
        Ok(())
    }

    /// Drops the rows but keeps schema and capacity, ready for the next fill.
    pub fn reset(&mut self) {
        self.batch = RecordBatch::new_empty(self.batch.schema());
    }

    /// Keeps only the first `len` rows.
    pub fn truncate(&mut self, len: usize) {
        if len < self.batch.num_rows() {
            self.batch = self.batch.slice(0, len);
        }
    }

    pub fn column_by_slot_id(&self, slot_id: SlotId) -> ScanResult<ArrayRef> {
        let idx = self
            .slot_id_to_index
            .get(&slot_id)
            .copied()
            .ok_or_else(|| {
                ScanError::internal(format!(
                    "slot id {} not found in chunk (num_columns={})",
                    slot_id,
                    self.batch.num_columns()
                ))
            })?;
        self.batch.columns().get(idx).cloned().ok_or_else(|| {
            ScanError::internal(format!("slot id {} mapped to invalid index {}", slot_id, idx))
        })
    }
}

pub const FIELD_META_SLOT_ID: &str = "novarocks.slot_id";

pub fn field_with_slot_id(field: Field, slot_id: SlotId) -> Field {
    let mut meta = field.metadata().clone();
    meta.insert(FIELD_META_SLOT_ID.to_string(), slot_id.to_string());
    field.with_metadata(meta)
}

pub fn field_slot_id(field: &Field) -> Result<Option<SlotId>, String> {
    let Some(v) = field.metadata().get(FIELD_META_SLOT_ID) else {
        return Ok(None);
    };
    Ok(Some(v.parse::<SlotId>()?))
}

/// Fields without slot metadata are skipped; duplicate slot ids are rejected.
fn slot_id_to_index_from_schema(schema: &Schema) -> Result<HashMap<SlotId, usize>, String> {
    let mut map = HashMap::new();
    for (idx, f) in schema.fields().iter().enumerate() {
        let Some(slot_id) = field_slot_id(f.as_ref())? else {
            continue;
        };
        if map.insert(slot_id, idx).is_some() {
            return Err(format!("duplicate slot id {} in chunk schema", slot_id));
        }
    }
    Ok(map)
}
