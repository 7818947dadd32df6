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
//! Scan morsel queue.
//!
//! Responsibilities:
//! - Distributes scan ranges across the drivers of one scan pipeline.
//!
//! Key exported interfaces:
//! - Types: `ScanMorsel`, `MorselQueue`, `MorselQueueRef`, `FixedMorselQueue`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::connector::ScanRange;

/// One unit of scan work: a scan range tagged with its position in the plan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanMorsel {
    pub id: usize,
    pub scan_range: ScanRange,
}

/// Queue contract for handing scan morsels to scan drivers.
pub trait MorselQueue: Send + Sync {
    fn try_get(&self) -> Option<ScanMorsel>;
    fn unget(&self, morsel: ScanMorsel);
    fn empty(&self) -> bool;
    fn num_original_morsels(&self) -> usize;
}

pub type MorselQueueRef = Arc<dyn MorselQueue>;

/// Morsel queue over a scan-range set known up front.
pub struct FixedMorselQueue {
    queue: Mutex<VecDeque<ScanMorsel>>,
    size: AtomicUsize,
    original_morsels: usize,
}

impl FixedMorselQueue {
    pub fn new(scan_ranges: Vec<ScanRange>) -> Arc<Self> {
        let morsels: VecDeque<ScanMorsel> = scan_ranges
            .into_iter()
            .enumerate()
            .map(|(id, scan_range)| ScanMorsel { id, scan_range })
            .collect();
        let size = morsels.len();
        Arc::new(Self {
            queue: Mutex::new(morsels),
            size: AtomicUsize::new(size),
            original_morsels: size,
        })
    }
}

impl MorselQueue for FixedMorselQueue {
    fn try_get(&self) -> Option<ScanMorsel> {
        if self.size.load(Ordering::Acquire) == 0 {
            return None;
        }
        let mut guard = self.queue.lock().expect("morsel queue lock");
        let morsel = guard.pop_front();
        if morsel.is_some() {
            self.size.fetch_sub(1, Ordering::AcqRel);
        }
        morsel
    }

    fn unget(&self, morsel: ScanMorsel) {
        let mut guard = self.queue.lock().expect("morsel queue lock");
        guard.push_front(morsel);
        self.size.fetch_add(1, Ordering::AcqRel);
    }

    fn empty(&self) -> bool {
        self.size.load(Ordering::Acquire) == 0
    }

    fn num_original_morsels(&self) -> usize {
        self.original_morsels
    }
}
