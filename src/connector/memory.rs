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
//! Connector over in-memory Arrow partitions.
//!
//! Each `ScanRange::Partition { index }` reads one partition; batches are projected
//! onto the output tuple by column name and cut to the chunk capacity.

use std::sync::Arc;

use arrow::array::{Array, RecordBatch, RecordBatchOptions};
use arrow::datatypes::SchemaRef;

use super::{
    ConnectorScanConfig, ConnectorScanPlanNode, DataSource, DataSourceProvider,
    DataSourceProviderRef, ScanRange,
};
use crate::common::status::{ScanError, ScanResult, Status};
use crate::exec::chunk::Chunk;
use crate::runtime::descriptors::TupleDescriptor;
use crate::runtime::runtime_state::RuntimeState;

#[derive(Debug)]
pub struct MemoryTable {
    name: String,
    partitions: Vec<Vec<RecordBatch>>,
}

impl MemoryTable {
    pub fn new(name: impl Into<String>, partitions: Vec<Vec<RecordBatch>>) -> Self {
        Self {
            name: name.into(),
            partitions,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    /// One partition scan range per partition, in order.
    pub fn scan_ranges(&self) -> Vec<ScanRange> {
        (0..self.partitions.len())
            .map(|index| ScanRange::Partition { index })
            .collect()
    }
}

#[derive(Clone, Debug)]
pub struct MemoryScanConfig {
    pub table: Arc<MemoryTable>,
}

pub(crate) struct MemoryConnector;

impl super::Connector for MemoryConnector {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn create_data_source_provider(
        &self,
        plan: &ConnectorScanPlanNode,
        tuple: &TupleDescriptor,
    ) -> ScanResult<DataSourceProviderRef> {
        match &plan.config {
            ConnectorScanConfig::Memory(cfg) => Ok(Arc::new(MemoryDataSourceProvider {
                table: Arc::clone(&cfg.table),
                schema: tuple.arrow_schema(),
            })),
            _ => Err(ScanError::invalid_argument(format!(
                "unsupported scan config for connector {}",
                self.name()
            ))),
        }
    }
}

pub struct MemoryDataSourceProvider {
    table: Arc<MemoryTable>,
    schema: SchemaRef,
}

impl MemoryDataSourceProvider {
    pub fn new(table: Arc<MemoryTable>, schema: SchemaRef) -> Self {
        Self { table, schema }
    }
}

impl DataSourceProvider for MemoryDataSourceProvider {
    fn create_data_source(&self, scan_range: &ScanRange) -> ScanResult<Box<dyn DataSource>> {
        let partition = match scan_range {
            ScanRange::Partition { index } if *index < self.table.num_partitions() => Some(*index),
            ScanRange::Partition { index } => {
                return Err(ScanError::invalid_argument(format!(
                    "partition {} out of range for table {} with {} partitions",
                    index,
                    self.table.name(),
                    self.table.num_partitions()
                )));
            }
            ScanRange::Empty => None,
            other => {
                return Err(ScanError::invalid_argument(format!(
                    "memory table {} cannot read range {}",
                    self.table.name(),
                    other.describe()
                )));
            }
        };
        Ok(Box::new(MemoryDataSource {
            table: Arc::clone(&self.table),
            partition,
            schema: self.schema.clone(),
            next_batch: 0,
            current: None,
            row_offset: 0,
            rows_read: 0,
        }))
    }
}

struct MemoryDataSource {
    table: Arc<MemoryTable>,
    partition: Option<usize>,
    schema: SchemaRef,
    next_batch: usize,
    current: Option<RecordBatch>,
    row_offset: usize,
    rows_read: u64,
}

impl MemoryDataSource {
    fn project(&self, batch: &RecordBatch) -> ScanResult<RecordBatch> {
        let mut columns = Vec::with_capacity(self.schema.fields().len());
        for field in self.schema.fields() {
            let column = batch.column_by_name(field.name()).ok_or_else(|| {
                ScanError::Corruption(format!(
                    "column {} missing in memory table {}",
                    field.name(),
                    self.table.name()
                ))
            })?;
            if column.data_type() != field.data_type() {
                return Err(ScanError::Corruption(format!(
                    "column {} of memory table {} has type {}, expected {}",
                    field.name(),
                    self.table.name(),
                    column.data_type(),
                    field.data_type()
                )));
            }
            columns.push(Arc::clone(column));
        }
        let options = RecordBatchOptions::new().with_row_count(Some(batch.num_rows()));
        Ok(RecordBatch::try_new_with_options(
            self.schema.clone(),
            columns,
            &options,
        )?)
    }
}

impl DataSource for MemoryDataSource {
    fn name(&self) -> &str {
        "MemoryDataSource"
    }

    fn open(&mut self, _state: &RuntimeState) -> Status {
        Ok(())
    }

    fn get_next(&mut self, _state: &RuntimeState, chunk: &mut Chunk) -> Status {
        let capacity = chunk.capacity().max(1);
        loop {
            if let Some(batch) = &self.current
                && self.row_offset < batch.num_rows()
            {
                let len = capacity.min(batch.num_rows() - self.row_offset);
                let out = batch.slice(self.row_offset, len);
                self.row_offset += len;
                self.rows_read += len as u64;
                return chunk.fill(out);
            }
            self.current = None;

            let Some(partition) = self.partition else {
                return Err(ScanError::end_of_file("empty scan range"));
            };
            let Some(batch) = self.table.partitions[partition].get(self.next_batch) else {
                return Err(ScanError::end_of_file(format!(
                    "partition {partition} of {} exhausted",
                    self.table.name()
                )));
            };
            self.next_batch += 1;
            self.current = Some(self.project(batch)?);
            self.row_offset = 0;
        }
    }

    fn close(&mut self, _state: &RuntimeState) {
        self.current = None;
    }

    fn raw_rows_read(&self) -> u64 {
        self.rows_read
    }
}
