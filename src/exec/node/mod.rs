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
pub mod connector_scan;

use crate::common::status::{ScanResult, Status};
use crate::connector::ScanRange;
use crate::exec::chunk::Chunk;
use crate::runtime::runtime_state::RuntimeState;

/// Pull-based operator contract of the non-pipeline execution model.
pub trait ExecNode: Send {
    fn prepare(&mut self, state: &RuntimeState) -> Status;

    fn open(&mut self, state: &RuntimeState) -> Status;

    /// Next chunk, or `None` at end-of-stream.
    fn get_next(&mut self, state: &RuntimeState) -> ScanResult<Option<Chunk>>;

    /// Idempotent.
    fn close(&mut self, state: &RuntimeState) -> Status;
}

pub trait ScanNode: ExecNode {
    fn set_scan_ranges(&mut self, scan_ranges: Vec<ScanRange>) -> Status;

    /// Whether an empty range set is a valid "read nothing" request.
    fn accept_empty_scan_ranges(&self) -> bool;
}
