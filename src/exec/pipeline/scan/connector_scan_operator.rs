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
//! Connector scan source operators for the pipeline engine.
//!
//! Responsibilities:
//! - Splits the scan ranges of one connector scan node across pipeline drivers.
//! - Drives one scanner at a time on the driver thread, reusing chunks from a private pool.
//!
//! Key exported interfaces:
//! - Types: `ConnectorScanOperatorFactory`, `ConnectorScanOperator`.
//!
//! Current limitations:
//! - The operator never blocks; a driver with no morsel left simply finishes.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use arrow::datatypes::SchemaRef;

use super::morsel::{FixedMorselQueue, MorselQueue, MorselQueueRef};
use crate::common::ids::PlanNodeId;
use crate::common::status::{ScanError, ScanResult, Status};
use crate::connector::{ConnectorScanner, DataSourceProviderRef, ScanRange};
use crate::exec::chunk::{Chunk, ChunkPool};
use crate::exec::node::connector_scan::status_box::StatusBox;
use crate::exec::pipeline::operator::{Operator, SourceOperator};
use crate::exec::pipeline::operator_factory::OperatorFactory;
use crate::novarocks_logging::debug;
use crate::runtime::runtime_state::RuntimeState;

/// Row limit shared by every operator of one factory.
#[derive(Debug)]
struct RowLimit {
    remaining: AtomicUsize,
}

impl RowLimit {
    fn new(limit: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(limit),
        }
    }

    /// Claims up to `rows` rows and returns how many were granted.
    fn take(&self, rows: usize) -> usize {
        let prev = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| {
                Some(r.saturating_sub(rows))
            })
            .unwrap_or(0);
        prev.min(rows)
    }

    fn exhausted(&self) -> bool {
        self.remaining.load(Ordering::Acquire) == 0
    }
}

pub struct ConnectorScanOperatorFactory {
    name: String,
    schema: SchemaRef,
    provider: DataSourceProviderRef,
    morsels: Arc<FixedMorselQueue>,
    status: Arc<StatusBox>,
    chunks_per_scanner: usize,
    chunk_size: usize,
    limit: Option<Arc<RowLimit>>,
}

impl ConnectorScanOperatorFactory {
    pub fn new(
        node_id: PlanNodeId,
        schema: SchemaRef,
        provider: DataSourceProviderRef,
        scan_ranges: Vec<ScanRange>,
        chunks_per_scanner: usize,
        chunk_size: usize,
        limit: Option<usize>,
    ) -> Self {
        Self {
            name: format!("CONNECTOR_SCAN (id={node_id})"),
            schema,
            provider,
            morsels: FixedMorselQueue::new(scan_ranges),
            status: Arc::new(StatusBox::new()),
            chunks_per_scanner: chunks_per_scanner.max(1),
            chunk_size,
            limit: limit.map(|l| Arc::new(RowLimit::new(l))),
        }
    }

    pub fn morsel_queue(&self) -> MorselQueueRef {
        self.morsels.clone()
    }

    /// First error recorded by any operator of this factory.
    pub fn status(&self) -> Status {
        self.status.get()
    }
}

impl OperatorFactory for ConnectorScanOperatorFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn create(&self, dop: i32, driver_id: i32) -> Box<dyn Operator> {
        debug!(
            operator = %self.name,
            dop,
            driver_id,
            morsels = self.morsels.num_original_morsels(),
            "create connector scan operator"
        );
        Box::new(ConnectorScanOperator {
            name: self.name.clone(),
            driver_id,
            provider: Arc::clone(&self.provider),
            morsels: self.morsel_queue(),
            status: Arc::clone(&self.status),
            chunk_pool: ChunkPool::new(self.schema.clone(), self.chunk_size),
            chunks_per_scanner: self.chunks_per_scanner,
            limit: self.limit.clone(),
            current: None,
            prepared: false,
            finished: false,
            rows_returned: 0,
        })
    }

    fn is_source(&self) -> bool {
        true
    }
}

pub struct ConnectorScanOperator {
    name: String,
    driver_id: i32,
    provider: DataSourceProviderRef,
    morsels: MorselQueueRef,
    status: Arc<StatusBox>,
    chunk_pool: ChunkPool,
    chunks_per_scanner: usize,
    limit: Option<Arc<RowLimit>>,
    current: Option<ConnectorScanner>,
    prepared: bool,
    finished: bool,
    rows_returned: usize,
}

impl ConnectorScanOperator {
    pub fn driver_id(&self) -> i32 {
        self.driver_id
    }

    pub fn rows_returned(&self) -> usize {
        self.rows_returned
    }

    /// Opens the scanner of the next morsel; false when none is left.
    fn next_scanner(&mut self, state: &RuntimeState) -> ScanResult<bool> {
        let Some(morsel) = self.morsels.try_get() else {
            return Ok(false);
        };
        let data_source = self
            .provider
            .create_data_source(&morsel.scan_range)
            .inspect_err(|err| {
                self.status.update_error(err.clone());
            })?;
        let mut scanner = ConnectorScanner::new(morsel.id, morsel.scan_range, data_source);
        if let Err(err) = scanner.open(state) {
            self.status.update_error(err.clone());
            scanner.close(state);
            return Err(err);
        }
        self.current = Some(scanner);
        Ok(true)
    }

    fn borrow_chunk(&self) -> ScanResult<Chunk> {
        if let Some(chunk) = self.chunk_pool.try_pop() {
            return Ok(chunk);
        }
        self.chunk_pool.fill(1)?;
        Ok(self.chunk_pool.pop())
    }

    fn close_current(&mut self, state: &RuntimeState) {
        if let Some(mut scanner) = self.current.take() {
            scanner.close(state);
        }
    }

    fn finish(&mut self, state: &RuntimeState) {
        self.close_current(state);
        self.chunk_pool.clear();
        self.finished = true;
    }

    fn apply_limit(&mut self, mut chunk: Chunk) -> Option<Chunk> {
        if let Some(limit) = &self.limit {
            let granted = limit.take(chunk.len());
            if granted < chunk.len() || limit.exhausted() {
                chunk.truncate(granted);
                self.status
                    .update_error(ScanError::end_of_file("limit reached"));
            }
            if granted == 0 {
                self.chunk_pool.push(chunk);
                return None;
            }
        }
        self.rows_returned += chunk.len();
        Some(chunk)
    }
}

impl Operator for ConnectorScanOperator {
    fn name(&self) -> &str {
        &self.name
    }

    fn prepare(&mut self, _state: &RuntimeState) -> Status {
        if self.prepared {
            return Ok(());
        }
        self.chunk_pool.reserve(self.chunks_per_scanner);
        self.chunk_pool.fill(self.chunks_per_scanner)?;
        self.prepared = true;
        Ok(())
    }

    fn close(&mut self, state: &RuntimeState) -> Status {
        if !self.finished {
            self.finish(state);
        }
        Ok(())
    }

    fn cancel(&mut self) {
        self.status
            .update_error(ScanError::cancelled("connector scan operator cancelled"));
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn as_source_mut(&mut self) -> Option<&mut dyn SourceOperator> {
        Some(self)
    }
}

impl SourceOperator for ConnectorScanOperator {
    fn has_output(&self) -> bool {
        !self.finished
            && self.status.is_ok()
            && (self.current.is_some() || !self.morsels.empty())
    }

    fn pull_chunk(&mut self, state: &RuntimeState) -> ScanResult<Option<Chunk>> {
        if !self.prepared {
            return Err(ScanError::internal(format!(
                "{} pulled before prepare",
                self.name
            )));
        }
        loop {
            if self.finished {
                return Ok(None);
            }
            if state.is_cancelled() {
                self.status
                    .update_error(ScanError::cancelled("query cancelled"));
            }
            if let Err(err) = self.status.get() {
                self.finish(state);
                if err.is_end_of_file() {
                    return Ok(None);
                }
                return Err(err);
            }
            if self.current.is_none() {
                let opened = match self.next_scanner(state) {
                    Ok(opened) => opened,
                    Err(err) => {
                        self.finish(state);
                        return Err(err);
                    }
                };
                if !opened {
                    self.finish(state);
                    return Ok(None);
                }
            }
            let mut chunk = self.borrow_chunk()?;
            let Some(scanner) = self.current.as_mut() else {
                self.chunk_pool.push(chunk);
                continue;
            };
            match scanner.get_next(state, &mut chunk) {
                Ok(()) if chunk.is_empty() => self.chunk_pool.push(chunk),
                Ok(()) => {
                    if let Some(chunk) = self.apply_limit(chunk) {
                        return Ok(Some(chunk));
                    }
                }
                Err(err) => {
                    self.chunk_pool.push(chunk);
                    self.close_current(state);
                    if !err.is_end_of_file() {
                        self.status.update_error(err.clone());
                        self.finish(state);
                        return Err(err);
                    }
                }
            }
        }
    }
}
