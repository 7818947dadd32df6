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
//! Scanner scheduling for the connector scan node.
//!
//! Concurrency model:
//! - At most `num_scanners` scanner tasks are in the executor at once (`running_threads`).
//!   Every increment happens under the pending-queue lock after a budget check.
//! - A finished worker hands its slot straight to the most recently parked scanner
//!   instead of releasing it, as long as the chunk pool has something to offer.
//! - A worker that finds the chunk pool empty parks its scanner and releases the slot.
//!   The consumer refills one chunk per chunk it takes and resubmits parked scanners.
//! - Chunks in the pool, in workers' hands and in the result queue never exceed the
//!   pool size, which caps memory regardless of consumer speed.
//!
//! Lock order: pending queue, then chunk pool.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use arrow::datatypes::SchemaRef;

use super::ConnectorScanOptions;
use super::status_box::StatusBox;
use crate::common::status::{ScanError, Status};
use crate::connector::ConnectorScanner;
use crate::exec::chunk::{Chunk, ChunkPool};
use crate::exec::stack::Stack;
use crate::novarocks_logging::{debug, warn};
use crate::runtime::blocking_queue::UnboundedBlockingQueue;
use crate::runtime::profile::{CounterRef, RuntimeProfile, TUnit, clamp_u128_to_i64};
use crate::runtime::runtime_state::RuntimeState;
use crate::runtime::scan_executor::ScanExecutor;

const SLOW_CLOSE_LOG_INTERVAL: Duration = Duration::from_secs(5);

pub(super) const SCANNER_QUEUE_COUNTER: &str = "ScannerQueueCounter";
pub(super) const SCANNER_QUEUE_TIME: &str = "ScannerQueueTime";
pub(super) const PEAK_SCANNER_THREADS: &str = "PeakScannerThreads";
pub(super) const CHUNK_BUFFER_CAPACITY: &str = "ChunkBufferCapacity";
pub(super) const ROWS_READ: &str = "RowsRead";
pub(super) const PEAK_RESULT_QUEUE_DEPTH: &str = "PeakResultQueueDepth";

/// Point-in-time view of the scheduler counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub scanners_total: usize,
    pub scanner_submits: usize,
    pub running_threads: usize,
    pub peak_running_threads: usize,
    pub closed_scanners: usize,
    pub pending_scanners: usize,
    pub chunk_pool_size: usize,
    pub chunk_pool_capacity: usize,
    pub chunks_borrowed: usize,
    pub chunks_returned: usize,
    pub chunks_published: usize,
    /// Chunks waiting in the result queue for the consumer.
    pub queued_chunks: usize,
}

struct ScanCounters {
    queue_counter: CounterRef,
    queue_timer: CounterRef,
    peak_threads: CounterRef,
    rows_read: CounterRef,
    peak_queue_depth: CounterRef,
}

enum DriveOutcome {
    /// The scanner is done: exhausted, failed, or the scan as a whole stopped.
    Finished,
    /// No chunk to fill; the scanner waits for the consumer.
    ChunkPoolEmpty,
    /// The scanner read its share of rows and should give the thread away.
    SliceExhausted,
}

pub(super) struct ScanScheduler {
    state: RuntimeState,
    executor: Arc<ScanExecutor>,
    num_scanners: usize,
    chunks_per_scanner: usize,
    scanner_row_num: u64,
    close_wait: Duration,
    chunk_pool: ChunkPool,
    pending: Mutex<Stack<ConnectorScanner>>,
    workers_idle: Condvar,
    status: StatusBox,
    result_chunks: UnboundedBlockingQueue<Chunk>,
    scanners_total: AtomicUsize,
    scanner_submit_count: AtomicUsize,
    running_threads: AtomicUsize,
    peak_running_threads: AtomicUsize,
    closed_scanners: AtomicUsize,
    chunks_published: AtomicUsize,
    counters: ScanCounters,
}

impl ScanScheduler {
    pub(super) fn new(
        state: RuntimeState,
        options: &ConnectorScanOptions,
        schema: SchemaRef,
        chunk_capacity: usize,
        profile: &RuntimeProfile,
    ) -> Self {
        let executor = state.scan_executor();
        Self {
            state,
            executor,
            num_scanners: options.num_scanners,
            chunks_per_scanner: options.chunks_per_scanner,
            scanner_row_num: options.scanner_row_num as u64,
            close_wait: options.close_wait,
            chunk_pool: ChunkPool::new(schema, chunk_capacity),
            pending: Mutex::new(Stack::new()),
            workers_idle: Condvar::new(),
            status: StatusBox::new(),
            result_chunks: UnboundedBlockingQueue::new(),
            scanners_total: AtomicUsize::new(0),
            scanner_submit_count: AtomicUsize::new(0),
            running_threads: AtomicUsize::new(0),
            peak_running_threads: AtomicUsize::new(0),
            closed_scanners: AtomicUsize::new(0),
            chunks_published: AtomicUsize::new(0),
            counters: ScanCounters {
                queue_counter: profile.add_counter(SCANNER_QUEUE_COUNTER, TUnit::Unit),
                queue_timer: profile.add_timer(SCANNER_QUEUE_TIME),
                peak_threads: profile.add_counter(PEAK_SCANNER_THREADS, TUnit::Unit),
                rows_read: profile.add_counter(ROWS_READ, TUnit::Unit),
                peak_queue_depth: profile.add_counter(PEAK_RESULT_QUEUE_DEPTH, TUnit::Unit),
            },
        }
    }

    /// Seeds the chunk pool and submits the first wave of scanners.
    ///
    /// `scanners` is in scan-range order; the ones that do not fit the budget are
    /// parked so that the LIFO pops them back in that same order.
    pub(super) fn start(
        self: &Arc<Self>,
        scanners: Vec<ConnectorScanner>,
        profile: &RuntimeProfile,
    ) -> Status {
        let total = scanners.len();
        let concurrency = self.num_scanners.min(total);
        let num_chunks = concurrency * self.chunks_per_scanner;
        self.chunk_pool.reserve(num_chunks);
        self.chunk_pool.fill(num_chunks)?;
        profile.counter_set(CHUNK_BUFFER_CAPACITY, TUnit::Unit, num_chunks as i64);
        self.scanners_total.store(total, Ordering::Release);

        let mut pending = self.lock_pending();
        pending.reserve(total);
        for mut scanner in scanners {
            scanner.enter_pending_queue();
            pending.push(scanner);
        }
        pending.reverse();
        debug!(
            scanners = total,
            concurrency,
            chunks = num_chunks,
            "connector scan start"
        );
        for _ in 0..concurrency {
            let scanner = pending.pop();
            self.submit_locked(&pending, scanner);
        }
        self.maybe_finish_locked();
        Ok(())
    }

    pub(super) fn update_status(&self, status: &Status) {
        if !self.status.update(status) {
            return;
        }
        if let Err(err) = status {
            if err.is_end_of_file() || err.is_cancelled() {
                debug!(status = %err, "connector scan stopped");
            } else {
                warn!(error = %err, "connector scan failed");
            }
        }
    }

    pub(super) fn status(&self) -> Status {
        self.status.get()
    }

    /// Blocks for the next chunk; `None` once every producer is done and the queue drained.
    pub(super) fn next_chunk(&self) -> Option<Chunk> {
        let chunk = self.result_chunks.blocking_get();
        debug_assert!(chunk.is_some() || self.result_chunks.is_empty());
        chunk
    }

    /// Replaces the chunk the consumer just took and wakes a parked scanner if it can run.
    pub(super) fn on_chunk_consumed(self: &Arc<Self>) -> Status {
        let mut pending = self.lock_pending();
        self.chunk_pool.fill(1)?;
        if !self.status.is_ok() || pending.empty() {
            return Ok(());
        }
        let running = self.running_threads.load(Ordering::Acquire);
        let pooled = self.chunk_pool.len();
        if running < self.num_scanners && (running == 0 || pooled >= self.chunks_per_scanner) {
            let scanner = pending.pop();
            self.submit_locked(&pending, scanner);
        }
        Ok(())
    }

    /// Stops the scan, waits for in-flight workers and closes every parked scanner.
    pub(super) fn cancel_and_wait(&self) {
        self.update_status(&Err(ScanError::cancelled("connector scan node closed")));
        self.result_chunks.shutdown();

        let mut pending = self.lock_pending();
        let mut waited = Duration::ZERO;
        let mut next_log = SLOW_CLOSE_LOG_INTERVAL;
        while self.running_threads.load(Ordering::Acquire) > 0 {
            let (guard, _) = self
                .workers_idle
                .wait_timeout(pending, self.close_wait)
                .expect("connector scan pending lock");
            pending = guard;
            waited += self.close_wait;
            if waited >= next_log {
                warn!(
                    running = self.running_threads.load(Ordering::Acquire),
                    waited_ms = waited.as_millis() as u64,
                    "still waiting for connector scanners to stop"
                );
                next_log += SLOW_CLOSE_LOG_INTERVAL;
            }
        }
        let parked: Vec<ConnectorScanner> = pending.drain().collect();
        drop(pending);
        for mut scanner in parked {
            self.counters
                .queue_timer
                .add(clamp_u128_to_i64(scanner.exit_pending_queue().as_nanos()));
            scanner.close(&self.state);
            self.closed_scanners.fetch_add(1, Ordering::AcqRel);
        }
        drop(self.result_chunks.drain());
        self.chunk_pool.clear();
    }

    pub(super) fn stats(&self) -> ScanStats {
        let pending = self.lock_pending().size();
        ScanStats {
            scanners_total: self.scanners_total.load(Ordering::Acquire),
            scanner_submits: self.scanner_submit_count.load(Ordering::Acquire),
            running_threads: self.running_threads.load(Ordering::Acquire),
            peak_running_threads: self.peak_running_threads.load(Ordering::Acquire),
            closed_scanners: self.closed_scanners.load(Ordering::Acquire),
            pending_scanners: pending,
            chunk_pool_size: self.chunk_pool.len(),
            chunk_pool_capacity: self.chunk_pool.max_size(),
            chunks_borrowed: self.chunk_pool.borrowed(),
            chunks_returned: self.chunk_pool.returned(),
            chunks_published: self.chunks_published.load(Ordering::Acquire),
            queued_chunks: self.result_chunks.len(),
        }
    }

    fn lock_pending(&self) -> MutexGuard<'_, Stack<ConnectorScanner>> {
        self.pending.lock().expect("connector scan pending lock")
    }

    /// Takes a concurrency slot for `scanner` and hands it to the executor.
    ///
    /// REQUIRES: the pending lock is held and a slot is free.
    fn submit_locked(
        self: &Arc<Self>,
        _pending: &MutexGuard<'_, Stack<ConnectorScanner>>,
        mut scanner: ConnectorScanner,
    ) {
        debug_assert!(self.running_threads.load(Ordering::Acquire) < self.num_scanners);
        self.note_dequeued(&mut scanner);
        let running = self.running_threads.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_running_threads.fetch_max(running, Ordering::AcqRel);
        self.counters.peak_threads.update_max(running as i64);

        let shared = Arc::clone(self);
        if let Err(mut scanner) = self
            .executor
            .force_submit(scanner, move |s| shared.run_scanner(s))
        {
            self.running_threads.fetch_sub(1, Ordering::AcqRel);
            self.update_status(&Err(ScanError::internal("scan executor is shut down")));
            scanner.close(&self.state);
            self.closed_scanners.fetch_add(1, Ordering::AcqRel);
            self.maybe_finish_locked();
            self.workers_idle.notify_all();
        }
    }

    fn note_dequeued(&self, scanner: &mut ConnectorScanner) {
        let waited = scanner.exit_pending_queue();
        self.counters
            .queue_timer
            .add(clamp_u128_to_i64(waited.as_nanos()));
        self.counters.queue_counter.add(1);
        self.scanner_submit_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Gives back a concurrency slot. REQUIRES: the pending lock is held.
    fn release_slot_locked(&self) {
        let prev = self.running_threads.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "released a scanner slot that was never taken");
        self.maybe_finish_locked();
        self.workers_idle.notify_all();
    }

    /// Ends the result stream once nothing can produce into it anymore.
    fn maybe_finish_locked(&self) {
        let all_closed = self.closed_scanners.load(Ordering::Acquire)
            == self.scanners_total.load(Ordering::Acquire);
        let stopped = self.running_threads.load(Ordering::Acquire) == 0 && !self.status.is_ok();
        if all_closed || stopped {
            self.result_chunks.shutdown();
        }
    }

    fn run_scanner(self: Arc<Self>, mut scanner: ConnectorScanner) {
        loop {
            match self.drive(&mut scanner) {
                DriveOutcome::SliceExhausted => {
                    let shared = Arc::clone(&self);
                    match self
                        .executor
                        .try_submit(scanner, move |s| shared.run_scanner(s))
                    {
                        Ok(()) => {
                            self.scanner_submit_count.fetch_add(1, Ordering::AcqRel);
                            self.counters.queue_counter.add(1);
                            return;
                        }
                        // Executor saturated: keep the slot and carry on here.
                        Err(s) => scanner = s,
                    }
                }
                DriveOutcome::ChunkPoolEmpty => {
                    let mut pending = self.lock_pending();
                    if !self.chunk_pool.is_empty() {
                        continue;
                    }
                    scanner.enter_pending_queue();
                    pending.push(scanner);
                    self.release_slot_locked();
                    return;
                }
                DriveOutcome::Finished => {
                    scanner.close(&self.state);
                    self.closed_scanners.fetch_add(1, Ordering::AcqRel);
                    let mut pending = self.lock_pending();
                    if self.status.is_ok() && !pending.empty() && !self.chunk_pool.is_empty() {
                        let mut next = pending.pop();
                        drop(pending);
                        self.note_dequeued(&mut next);
                        scanner = next;
                        continue;
                    }
                    self.release_slot_locked();
                    return;
                }
            }
        }
    }

    /// Cooperative cancellation point, checked before every batch.
    fn checkpoint(&self) -> bool {
        if self.state.is_cancelled() {
            self.update_status(&Err(ScanError::cancelled("query cancelled")));
        }
        self.status.is_ok()
    }

    fn drive(&self, scanner: &mut ConnectorScanner) -> DriveOutcome {
        if !self.checkpoint() {
            return DriveOutcome::Finished;
        }
        if let Err(err) = scanner.open(&self.state) {
            self.update_status(&Err(err));
            return DriveOutcome::Finished;
        }
        let slice_end = scanner.raw_rows_read().saturating_add(self.scanner_row_num);
        loop {
            if !self.checkpoint() {
                return DriveOutcome::Finished;
            }
            let Some(mut chunk) = self.chunk_pool.try_pop() else {
                return DriveOutcome::ChunkPoolEmpty;
            };
            if let Err(err) = scanner.get_next(&self.state, &mut chunk) {
                self.chunk_pool.push(chunk);
                if !err.is_end_of_file() {
                    self.update_status(&Err(err));
                }
                return DriveOutcome::Finished;
            }
            if chunk.is_empty() {
                self.chunk_pool.push(chunk);
                continue;
            }
            self.counters.rows_read.add(chunk.len() as i64);
            if let Err(chunk) = self.result_chunks.put(chunk) {
                // Closed underneath us.
                self.chunk_pool.push(chunk);
                return DriveOutcome::Finished;
            }
            self.chunks_published.fetch_add(1, Ordering::AcqRel);
            self.counters
                .peak_queue_depth
                .update_max(self.result_chunks.len() as i64);
            if scanner.raw_rows_read() >= slice_end {
                return DriveOutcome::SliceExhausted;
            }
        }
    }
}
