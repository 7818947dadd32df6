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
//! Shared thread pool that runs connector scanner tasks.
//!
//! The queue is bounded. `try_submit` hands the payload back to the caller when the pool
//! is saturated or shutting down, so the caller can keep the work instead of losing it
//! inside a rejected closure. `force_submit` ignores the bound.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::thread;

use crate::common::config::{scan_thread_pool_queue_size, scan_thread_pool_thread_num};
use crate::novarocks_logging::debug;

type ScanTask = Box<dyn FnOnce() + Send + 'static>;

pub struct ScanExecutor {
    inner: Arc<ScanExecutorInner>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl ScanExecutor {
    pub fn new(num_threads: usize, queue_capacity: usize) -> Self {
        let inner = Arc::new(ScanExecutorInner::new(queue_capacity));
        let threads = num_threads.max(1);
        let mut workers = Vec::with_capacity(threads);
        for i in 0..threads {
            let inner_clone = Arc::clone(&inner);
            let handle = thread::Builder::new()
                .name(format!("scan_executor_{i}"))
                .spawn(move || worker_loop(inner_clone))
                .unwrap_or_else(|e| panic!("spawn scan executor thread: {e}"));
            workers.push(handle);
        }
        debug!(threads, queue_capacity, "scan executor started");
        Self { inner, workers }
    }

    /// Queues `task` unless the queue is full or shut down.
    pub fn submit<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.push_with((), move |_| task(), false).is_ok()
    }

    /// Queues `run(payload)`; on rejection the untouched payload is returned.
    pub fn try_submit<T, F>(&self, payload: T, run: F) -> Result<(), T>
    where
        T: Send + 'static,
        F: FnOnce(T) + Send + 'static,
    {
        self.inner.push_with(payload, run, false)
    }

    /// Like `try_submit` but ignores the queue bound; fails only after shutdown.
    pub fn force_submit<T, F>(&self, payload: T, run: F) -> Result<(), T>
    where
        T: Send + 'static,
        F: FnOnce(T) + Send + 'static,
    {
        self.inner.push_with(payload, run, true)
    }

    pub fn num_tasks(&self) -> usize {
        self.inner.num_tasks()
    }

    pub fn num_threads(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for ScanExecutor {
    fn drop(&mut self) {
        self.inner.shutdown();
        let current = thread::current().id();
        for handle in self.workers.drain(..) {
            // The last reference may be released by a task running on one of our own threads.
            if handle.thread().id() == current {
                continue;
            }
            let _ = handle.join();
        }
    }
}

struct ScanExecutorInner {
    queue: Mutex<VecDeque<ScanTask>>,
    cv: Condvar,
    capacity: usize,
    shutdown: AtomicBool,
}

impl ScanExecutorInner {
    fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            cv: Condvar::new(),
            capacity: capacity.max(1),
            shutdown: AtomicBool::new(false),
        }
    }

    fn push_with<T, F>(&self, payload: T, run: F, force: bool) -> Result<(), T>
    where
        T: Send + 'static,
        F: FnOnce(T) + Send + 'static,
    {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(payload);
        }
        let mut queue = self.queue.lock().expect("scan executor queue lock");
        if !force && queue.len() >= self.capacity {
            return Err(payload);
        }
        queue.push_back(Box::new(move || run(payload)));
        self.cv.notify_one();
        Ok(())
    }

    fn num_tasks(&self) -> usize {
        let queue = self.queue.lock().expect("scan executor queue lock");
        queue.len()
    }

    fn take(&self) -> Option<ScanTask> {
        let mut queue = self.queue.lock().expect("scan executor queue lock");
        while queue.is_empty() && !self.shutdown.load(Ordering::Acquire) {
            queue = self
                .cv
                .wait(queue)
                .expect("scan executor queue condvar wait");
        }
        // Drain what was accepted before shutdown so no submitted task is silently dropped.
        queue.pop_front()
    }

    fn shutdown(&self) {
        let _queue = self.queue.lock().expect("scan executor queue lock");
        self.shutdown.store(true, Ordering::Release);
        self.cv.notify_all();
    }
}

fn worker_loop(inner: Arc<ScanExecutorInner>) {
    while let Some(task) = inner.take() {
        task();
    }
}

static SCAN_EXECUTOR: OnceLock<Arc<ScanExecutor>> = OnceLock::new();

/// Process-wide executor sized from config.
pub fn scan_executor() -> Arc<ScanExecutor> {
    Arc::clone(SCAN_EXECUTOR.get_or_init(|| {
        let threads = scan_thread_pool_thread_num();
        let queue_capacity = scan_thread_pool_queue_size();
        Arc::new(ScanExecutor::new(threads, queue_capacity))
    }))
}
