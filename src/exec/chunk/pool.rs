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
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use arrow::datatypes::SchemaRef;

use super::Chunk;
use crate::common::status::{ScanError, ScanResult};
use crate::exec::stack::Stack;

/// Cache of pre-sized chunks that bounds how many batches a scan keeps in flight.
///
/// The pool never holds more than `max_size` chunks; exceeding it means a chunk was
/// returned twice, which is treated as a fatal bookkeeping bug.
#[derive(Debug)]
pub struct ChunkPool {
    schema: SchemaRef,
    chunk_capacity: usize,
    max_size: AtomicUsize,
    chunks: Mutex<Stack<Chunk>>,
    created: AtomicUsize,
    borrowed: AtomicUsize,
    returned: AtomicUsize,
}

impl ChunkPool {
    pub fn new(schema: SchemaRef, chunk_capacity: usize) -> Self {
        Self {
            schema,
            chunk_capacity,
            max_size: AtomicUsize::new(0),
            chunks: Mutex::new(Stack::new()),
            created: AtomicUsize::new(0),
            borrowed: AtomicUsize::new(0),
            returned: AtomicUsize::new(0),
        }
    }

    /// Sets the pool size limit and pre-sizes storage for it.
    pub fn reserve(&self, n: usize) {
        self.max_size.store(n, Ordering::Release);
        let mut chunks = self.chunks.lock().expect("chunk pool lock");
        let extra = n.saturating_sub(chunks.size());
        chunks.reserve(extra);
    }

    /// Allocates `count` fresh chunks into the pool.
    pub fn fill(&self, count: usize) -> ScanResult<()> {
        let mut chunks = self.chunks.lock().expect("chunk pool lock");
        let max_size = self.max_size.load(Ordering::Acquire);
        if chunks.size() + count > max_size {
            return Err(ScanError::ResourceExhausted(format!(
                "chunk pool overflow: size={} fill={} max={}",
                chunks.size(),
                count,
                max_size
            )));
        }
        for _ in 0..count {
            chunks.push(Chunk::with_capacity(
                self.schema.clone(),
                self.chunk_capacity,
            ));
        }
        self.created.fetch_add(count, Ordering::AcqRel);
        Ok(())
    }

    /// Returns a borrowed chunk, emptied.
    pub fn push(&self, mut chunk: Chunk) {
        chunk.reset();
        let mut chunks = self.chunks.lock().expect("chunk pool lock");
        assert!(
            chunks.size() < self.max_size.load(Ordering::Acquire),
            "chunk pool corrupted: more chunks returned than borrowed"
        );
        chunks.push(chunk);
        self.returned.fetch_add(1, Ordering::AcqRel);
    }

    /// REQUIRES: not empty.
    pub fn pop(&self) -> Chunk {
        self.try_pop()
            .unwrap_or_else(|| panic!("pop from an empty chunk pool"))
    }

    pub fn try_pop(&self) -> Option<Chunk> {
        let chunk = self.chunks.lock().expect("chunk pool lock").try_pop();
        if chunk.is_some() {
            self.borrowed.fetch_add(1, Ordering::AcqRel);
        }
        chunk
    }

    pub fn len(&self) -> usize {
        self.chunks.lock().expect("chunk pool lock").size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_size(&self) -> usize {
        self.max_size.load(Ordering::Acquire)
    }

    pub fn chunk_capacity(&self) -> usize {
        self.chunk_capacity
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::Acquire)
    }

    pub fn borrowed(&self) -> usize {
        self.borrowed.load(Ordering::Acquire)
    }

    pub fn returned(&self) -> usize {
        self.returned.load(Ordering::Acquire)
    }

    /// Drops every pooled chunk; used at teardown.
    pub fn clear(&self) {
        let mut chunks = self.chunks.lock().expect("chunk pool lock");
        chunks.drain().for_each(drop);
    }
}
