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
//! Minimal source driver.
//!
//! Responsibilities:
//! - Pulls one source operator to completion on the calling thread, forwarding chunks.
//!
//! Current limitations:
//! - No blocking/yield scheduling; a host engine supplies its own driver loop.

use crate::common::status::{ScanError, Status};
use crate::exec::chunk::Chunk;
use crate::novarocks_logging::debug;
use crate::runtime::runtime_state::RuntimeState;

use super::operator::Operator;

pub struct PipelineDriver {
    driver_id: i32,
    source: Box<dyn Operator>,
    num_chunks: usize,
    num_rows: usize,
}

impl PipelineDriver {
    pub fn new(driver_id: i32, source: Box<dyn Operator>) -> Self {
        Self {
            driver_id,
            source,
            num_chunks: 0,
            num_rows: 0,
        }
    }

    pub fn driver_id(&self) -> i32 {
        self.driver_id
    }

    pub fn num_chunks(&self) -> usize {
        self.num_chunks
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Prepares the source, pulls until it is finished and closes it.
    ///
    /// The source is closed even when pulling fails; the pull error wins.
    pub fn run(&mut self, state: &RuntimeState, mut sink: impl FnMut(Chunk)) -> Status {
        self.source.prepare(state)?;
        let result = self.pull_all(state, &mut sink);
        let closed = self.source.close(state);
        debug!(
            driver_id = self.driver_id,
            operator = self.source.name(),
            chunks = self.num_chunks,
            rows = self.num_rows,
            "pipeline driver finished"
        );
        result.and(closed)
    }

    fn pull_all(&mut self, state: &RuntimeState, sink: &mut impl FnMut(Chunk)) -> Status {
        let name = self.source.name().to_string();
        let source = self
            .source
            .as_source_mut()
            .ok_or_else(|| ScanError::internal(format!("{name} is not a source operator")))?;
        while !source.is_finished() {
            match source.pull_chunk(state)? {
                Some(chunk) => {
                    self.num_chunks += 1;
                    self.num_rows += chunk.len();
                    sink(chunk);
                }
                None => break,
            }
        }
        Ok(())
    }
}
