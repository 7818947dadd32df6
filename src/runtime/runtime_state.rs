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
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::common::config;
use crate::runtime::scan_executor::{ScanExecutor, scan_executor};

/// Per-fragment-instance execution context shared by every operator of a fragment.
///
/// Clones share the cancellation flag.
#[derive(Clone)]
pub struct RuntimeState {
    chunk_size: usize,
    cancelled: Arc<AtomicBool>,
    scan_executor: Option<Arc<ScanExecutor>>,
}

impl RuntimeState {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            cancelled: Arc::new(AtomicBool::new(false)),
            scan_executor: None,
        }
    }

    /// Runs scanners on `executor` instead of the process-wide pool.
    pub fn with_scan_executor(mut self, executor: Arc<ScanExecutor>) -> Self {
        self.scan_executor = Some(executor);
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn scan_executor(&self) -> Arc<ScanExecutor> {
        match &self.scan_executor {
            Some(executor) => Arc::clone(executor),
            None => scan_executor(),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self::new(config::chunk_size())
    }
}

impl std::fmt::Debug for RuntimeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeState")
            .field("chunk_size", &self.chunk_size)
            .field("cancelled", &self.is_cancelled())
            .field("dedicated_scan_executor", &self.scan_executor.is_some())
            .finish()
    }
}
