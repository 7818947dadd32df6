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
use crate::common::status::{ScanError, ScanResult};

/// Parameters a plan node needs to decompose itself into pipeline operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineBuilderContext {
    dop: i32,
    chunk_size: usize,
}

impl PipelineBuilderContext {
    pub fn new(dop: i32, chunk_size: usize) -> ScanResult<Self> {
        if dop <= 0 {
            return Err(ScanError::invalid_argument(format!(
                "pipeline dop must be positive, got {dop}"
            )));
        }
        if chunk_size == 0 {
            return Err(ScanError::invalid_argument("chunk_size must be positive"));
        }
        Ok(Self { dop, chunk_size })
    }

    /// Degree of parallelism: number of drivers per pipeline.
    pub fn dop(&self) -> i32 {
        self.dop
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}
