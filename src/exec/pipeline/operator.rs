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
//! Core operator traits.
//!
//! Responsibilities:
//! - Defines the base operator and source-operator contracts driven by pipeline drivers.
//!
//! Key exported interfaces:
//! - Types: `Operator`, `SourceOperator`.

use crate::common::status::{ScanResult, Status};
use crate::exec::chunk::Chunk;
use crate::runtime::runtime_state::RuntimeState;

/// Base operator contract implemented by every pipeline operator.
pub trait Operator: Send {
    fn name(&self) -> &str;

    fn prepare(&mut self, state: &RuntimeState) -> Status {
        let _ = state;
        Ok(())
    }

    /// Idempotent.
    fn close(&mut self, state: &RuntimeState) -> Status {
        let _ = state;
        Ok(())
    }

    fn cancel(&mut self) {}

    fn is_finished(&self) -> bool {
        false
    }

    fn as_source_mut(&mut self) -> Option<&mut dyn SourceOperator> {
        None
    }
}

/// Operator at the head of a pipeline: produces chunks without input.
pub trait SourceOperator: Operator {
    /// Whether `pull_chunk` may produce a chunk right now.
    fn has_output(&self) -> bool;

    /// Next chunk, or `None` when this operator is done.
    fn pull_chunk(&mut self, state: &RuntimeState) -> ScanResult<Option<Chunk>>;
}
