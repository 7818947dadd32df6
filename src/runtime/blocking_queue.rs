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
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// Unbounded multi-producer FIFO with a blocking consumer side.
///
/// After `shutdown`, producers are refused but items already queued are still handed
/// out; `blocking_get` returns `None` only once the queue is both shut down and empty.
#[derive(Debug)]
pub struct UnboundedBlockingQueue<T> {
    state: Mutex<QueueState<T>>,
    not_empty: Condvar,
}

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    shutdown: bool,
}

impl<T> UnboundedBlockingQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                shutdown: false,
            }),
            not_empty: Condvar::new(),
        }
    }

    /// Never blocks. Hands the item back if the queue has been shut down.
    pub fn put(&self, item: T) -> Result<(), T> {
        let mut state = self.state.lock().expect("blocking queue lock");
        if state.shutdown {
            return Err(item);
        }
        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    pub fn blocking_get(&self) -> Option<T> {
        let mut state = self.state.lock().expect("blocking queue lock");
        while state.items.is_empty() && !state.shutdown {
            state = self
                .not_empty
                .wait(state)
                .expect("blocking queue condvar wait");
        }
        state.items.pop_front()
    }

    pub fn shutdown(&self) {
        let mut state = self.state.lock().expect("blocking queue lock");
        state.shutdown = true;
        drop(state);
        self.not_empty.notify_all();
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("blocking queue lock").items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes and returns everything still queued.
    pub fn drain(&self) -> Vec<T> {
        self.state
            .lock()
            .expect("blocking queue lock")
            .items
            .drain(..)
            .collect()
    }
}

impl<T> Default for UnboundedBlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
