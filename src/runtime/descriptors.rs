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
//! Output row layout handed down by the planner.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};

use crate::common::ids::{SlotId, TupleId};
use crate::common::status::{ScanError, ScanResult};
use crate::exec::chunk::field_with_slot_id;

#[derive(Clone, Debug)]
pub struct SlotDescriptor {
    pub id: SlotId,
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl SlotDescriptor {
    pub fn new(id: SlotId, name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            id,
            name: name.into(),
            data_type,
            nullable,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TupleDescriptor {
    pub id: TupleId,
    pub slots: Vec<SlotDescriptor>,
}

impl TupleDescriptor {
    pub fn new(id: TupleId, slots: Vec<SlotDescriptor>) -> Self {
        Self { id, slots }
    }

    /// Arrow schema of the tuple, one field per slot tagged with its slot id.
    pub fn arrow_schema(&self) -> SchemaRef {
        let fields: Vec<Field> = self
            .slots
            .iter()
            .map(|s| field_with_slot_id(Field::new(&s.name, s.data_type.clone(), s.nullable), s.id))
            .collect();
        Arc::new(Schema::new(fields))
    }
}

#[derive(Clone, Debug, Default)]
pub struct DescriptorTbl {
    tuples: HashMap<TupleId, TupleDescriptor>,
}

impl DescriptorTbl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tuple(&mut self, tuple: TupleDescriptor) {
        self.tuples.insert(tuple.id, tuple);
    }

    pub fn get_tuple(&self, id: TupleId) -> ScanResult<&TupleDescriptor> {
        self.tuples
            .get(&id)
            .ok_or_else(|| ScanError::invalid_argument(format!("unknown tuple id {id}")))
    }
}
