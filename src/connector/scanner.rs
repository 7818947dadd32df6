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
use std::time::{Duration, Instant};

use super::{DataSource, ScanRange};
use crate::common::status::{ScanError, Status};
use crate::exec::chunk::Chunk;
use crate::novarocks_logging::debug;
use crate::runtime::runtime_state::RuntimeState;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScannerState {
    Created,
    Opened,
    Running,
    /// Parked in the pending queue after it has run, waiting for a worker slot or a
    /// free chunk. Scanners parked before their first run stay `Created`.
    Suspended,
    Exhausted,
    Errored,
    Closed,
}

/// Drives one data source over its scan range.
///
/// A scanner is owned by exactly one place at a time (the pending queue or one
/// worker), so it needs no internal locking.
pub struct ConnectorScanner {
    id: usize,
    scan_range: ScanRange,
    data_source: Box<dyn DataSource>,
    state: ScannerState,
    pending_since: Option<Instant>,
}

impl ConnectorScanner {
    pub fn new(id: usize, scan_range: ScanRange, data_source: Box<dyn DataSource>) -> Self {
        Self {
            id,
            scan_range,
            data_source,
            state: ScannerState::Created,
            pending_since: None,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn scan_range(&self) -> &ScanRange {
        &self.scan_range
    }

    pub fn state(&self) -> ScannerState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == ScannerState::Closed
    }

    pub fn raw_rows_read(&self) -> u64 {
        self.data_source.raw_rows_read()
    }

    pub fn num_rows_read(&self) -> u64 {
        self.data_source.num_rows_read()
    }

    /// Opens the data source on first use; later calls are no-ops.
    pub fn open(&mut self, state: &RuntimeState) -> Status {
        if self.state != ScannerState::Created {
            return Ok(());
        }
        match self.data_source.open(state) {
            Ok(()) => {
                self.state = ScannerState::Opened;
                Ok(())
            }
            Err(e) => {
                self.state = ScannerState::Errored;
                Err(e)
            }
        }
    }

    /// Reads the next batch into `chunk`.
    pub fn get_next(&mut self, state: &RuntimeState, chunk: &mut Chunk) -> Status {
        match self.state {
            ScannerState::Exhausted | ScannerState::Closed => {
                return Err(ScanError::end_of_file(format!("scanner {} exhausted", self.id)));
            }
            ScannerState::Errored => {
                return Err(ScanError::internal(format!(
                    "scanner {} driven after failure",
                    self.id
                )));
            }
            ScannerState::Created => self.open(state)?,
            _ => {}
        }
        self.state = ScannerState::Running;
        match self.data_source.get_next(state, chunk) {
            Ok(()) => Ok(()),
            Err(e) if e.is_end_of_file() => {
                self.state = ScannerState::Exhausted;
                Err(e)
            }
            Err(e) => {
                self.state = ScannerState::Errored;
                Err(e)
            }
        }
    }

    /// Closes the data source once; later calls are no-ops.
    pub fn close(&mut self, state: &RuntimeState) {
        if self.state == ScannerState::Closed {
            return;
        }
        if self.state != ScannerState::Created {
            self.data_source.close(state);
        }
        debug!(
            scanner_id = self.id,
            range = %self.scan_range.describe(),
            raw_rows_read = self.raw_rows_read(),
            "connector scanner closed"
        );
        self.state = ScannerState::Closed;
    }

    pub fn enter_pending_queue(&mut self) {
        if !matches!(self.state, ScannerState::Created | ScannerState::Closed) {
            self.state = ScannerState::Suspended;
        }
        self.pending_since = Some(Instant::now());
    }

    /// Returns how long the scanner sat in the pending queue.
    pub fn exit_pending_queue(&mut self) -> Duration {
        if self.state == ScannerState::Suspended {
            self.state = ScannerState::Opened;
        }
        self.pending_since
            .take()
            .map(|t| t.elapsed())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for ConnectorScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorScanner")
            .field("id", &self.id)
            .field("scan_range", &self.scan_range)
            .field("data_source", &self.data_source.name())
            .field("state", &self.state)
            .finish()
    }
}
