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
//! Common utilities and helpers for integration tests.
#![allow(dead_code)]
#![allow(unused_imports)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arrow::array::{Array, Int64Array, RecordBatch};
use arrow::datatypes::{DataType, SchemaRef};
use tempfile::TempDir;

use novarocks_scan::common::ids::{SlotId, TupleId};
use novarocks_scan::connector::{DataSource, DataSourceProvider, ScanRange};
use novarocks_scan::exec::node::connector_scan::{ConnectorScanNode, ConnectorScanOptions};
use novarocks_scan::runtime::descriptors::{SlotDescriptor, TupleDescriptor};
use novarocks_scan::runtime::scan_executor::ScanExecutor;
use novarocks_scan::{Chunk, RuntimeState, ScanError, ScanResult, Status};
use novarocks_scan::{novarocks_config, novarocks_logging};

pub const RANGE_SLOT: SlotId = SlotId(1);
pub const SEQ_SLOT: SlotId = SlotId(2);

/// Test configuration for integration tests.
pub struct TestConfig {
    /// Temporary directory for test artifacts
    pub temp_dir: TempDir,
    /// Test config path
    pub config_path: PathBuf,
}

impl TestConfig {
    /// Create a new test configuration with small scan settings.
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let config_path = temp_dir.path().join("test_novarocks_scan.toml");

        let config_content = r#"
log_level = "debug"

[scan]
max_scanners = 3
scanner_row_num = 64
chunk_size = 16
scan_thread_pool_thread_num = 4
scan_thread_pool_queue_size = 128
close_wait_ms = 5
"#;

        std::fs::write(&config_path, config_content)?;

        Ok(Self {
            temp_dir,
            config_path,
        })
    }

    /// Initialize logging for tests.
    pub fn init_logging(&self) {
        novarocks_logging::init_with_level("debug");
    }

    /// Load the test configuration.
    pub fn load_config(&self) -> anyhow::Result<&'static novarocks_config::ScanNodeConfig> {
        novarocks_config::init_from_path(&self.config_path)
    }
}

impl Default for TestConfig {
    fn default() -> Self {
        Self::new().expect("Failed to create test config")
    }
}

/// Output tuple of the test connector: `(range BIGINT, seq BIGINT)`.
pub fn test_tuple() -> TupleDescriptor {
    TupleDescriptor::new(
        TupleId(0),
        vec![
            SlotDescriptor::new(RANGE_SLOT, "range", DataType::Int64, false),
            SlotDescriptor::new(SEQ_SLOT, "seq", DataType::Int64, false),
        ],
    )
}

/// Counters shared by every data source of one `TestSourceProvider`.
#[derive(Debug, Default)]
pub struct SourceStats {
    pub created: AtomicUsize,
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub batches: AtomicUsize,
}

impl SourceStats {
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::Acquire)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::Acquire)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::Acquire)
    }

    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::Acquire)
    }
}

/// Data sources that emit `batches_per_range` batches of `rows_per_batch` rows per range.
///
/// Each row carries its range index and the batch sequence number, so consumers can
/// check per-range ordering. `fail_at = Some((range, seq))` makes that batch fail.
pub struct TestSourceProvider {
    pub source_stats: Arc<SourceStats>,
    pub batches_per_range: usize,
    pub rows_per_batch: usize,
    pub delay: Duration,
    pub fail_at: Option<(usize, usize)>,
    pub accept_empty: bool,
}

impl TestSourceProvider {
    pub fn new(batches_per_range: usize, rows_per_batch: usize) -> Self {
        Self {
            source_stats: Arc::new(SourceStats::default()),
            batches_per_range,
            rows_per_batch,
            delay: Duration::ZERO,
            fail_at: None,
            accept_empty: true,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_failure(mut self, range: usize, seq: usize) -> Self {
        self.fail_at = Some((range, seq));
        self
    }

    pub fn rejecting_empty_ranges(mut self) -> Self {
        self.accept_empty = false;
        self
    }
}

impl DataSourceProvider for TestSourceProvider {
    fn create_data_source(&self, scan_range: &ScanRange) -> ScanResult<Box<dyn DataSource>> {
        let (range, batches) = match scan_range {
            ScanRange::Partition { index } => (*index, self.batches_per_range),
            ScanRange::Empty => (usize::MAX, 0),
            other => {
                return Err(ScanError::invalid_argument(format!(
                    "test source cannot read {}",
                    other.describe()
                )));
            }
        };
        self.source_stats.created.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(TestSource {
            source_stats: Arc::clone(&self.source_stats),
            range,
            batches,
            next_seq: 0,
            rows_per_batch: self.rows_per_batch,
            delay: self.delay,
            fail_at: self.fail_at.filter(|(r, _)| *r == range).map(|(_, s)| s),
            rows_read: 0,
        }))
    }

    fn accept_empty_scan_ranges(&self) -> bool {
        self.accept_empty
    }
}

struct TestSource {
    source_stats: Arc<SourceStats>,
    range: usize,
    batches: usize,
    next_seq: usize,
    rows_per_batch: usize,
    delay: Duration,
    fail_at: Option<usize>,
    rows_read: u64,
}

impl TestSource {
    fn read_batch(&mut self, chunk: &mut Chunk) -> Status {
        if self.next_seq >= self.batches {
            return Err(ScanError::end_of_file("test source exhausted"));
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        if self.fail_at == Some(seq) {
            return Err(ScanError::IoError(format!(
                "injected failure at range {} batch {seq}",
                self.range
            )));
        }
        let n = self.rows_per_batch;
        let batch = RecordBatch::try_new(
            chunk.schema(),
            vec![
                Arc::new(Int64Array::from(vec![self.range as i64; n])),
                Arc::new(Int64Array::from(vec![seq as i64; n])),
            ],
        )?;
        chunk.fill(batch)?;
        self.rows_read += n as u64;
        self.source_stats.batches.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

impl DataSource for TestSource {
    fn name(&self) -> &str {
        "test"
    }

    fn open(&mut self, _state: &RuntimeState) -> Status {
        self.source_stats.opened.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn get_next(&mut self, _state: &RuntimeState, chunk: &mut Chunk) -> Status {
        let active = self.source_stats.active.fetch_add(1, Ordering::AcqRel) + 1;
        self.source_stats.max_active.fetch_max(active, Ordering::AcqRel);
        let result = self.read_batch(chunk);
        self.source_stats.active.fetch_sub(1, Ordering::AcqRel);
        result
    }

    fn close(&mut self, _state: &RuntimeState) {
        self.source_stats.closed.fetch_add(1, Ordering::AcqRel);
    }

    fn raw_rows_read(&self) -> u64 {
        self.rows_read
    }
}

pub fn partitions(n: usize) -> Vec<ScanRange> {
    (0..n).map(|index| ScanRange::Partition { index }).collect()
}

pub fn options(num_scanners: usize, chunks_per_scanner: usize) -> ConnectorScanOptions {
    ConnectorScanOptions {
        num_scanners,
        chunks_per_scanner,
        scanner_row_num: 1 << 20,
        close_wait: Duration::from_millis(5),
    }
}

/// Runtime state with a private scan executor.
pub fn test_state(chunk_size: usize, threads: usize) -> RuntimeState {
    RuntimeState::new(chunk_size).with_scan_executor(Arc::new(ScanExecutor::new(threads, 1024)))
}

pub fn test_node(provider: Arc<TestSourceProvider>, opts: ConnectorScanOptions) -> ConnectorScanNode {
    ConnectorScanNode::with_provider(1, "test", test_tuple().arrow_schema(), provider)
        .with_options(opts)
}

/// `(range, seq)` of the first row of a test chunk.
pub fn chunk_key(chunk: &Chunk) -> (usize, usize) {
    let value = |slot| {
        let col = chunk.column_by_slot_id(slot).expect("test column");
        col.as_any()
            .downcast_ref::<Int64Array>()
            .expect("int64 column")
            .value(0) as usize
    };
    (value(RANGE_SLOT), value(SEQ_SLOT))
}

/// Batches received per range, in arrival order.
#[derive(Debug, Default)]
pub struct Arrivals {
    pub per_range: BTreeMap<usize, Vec<usize>>,
    pub chunks: usize,
    pub rows: usize,
}

impl Arrivals {
    pub fn record(&mut self, chunk: &Chunk) {
        let (range, seq) = chunk_key(chunk);
        self.per_range.entry(range).or_default().push(seq);
        self.chunks += 1;
        self.rows += chunk.len();
    }

    pub fn assert_in_order(&self) {
        for (range, seqs) in &self.per_range {
            let expected: Vec<usize> = (0..seqs.len()).collect();
            assert_eq!(seqs, &expected, "batches of range {range} out of order");
        }
    }
}

/// Wait for a condition to become true, with timeout.
pub fn wait_for<F>(mut condition: F, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

/// Run `f` and fail the test if it does not finish within `timeout`.
pub fn run_with_timeout<F, T>(timeout: Duration, f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    use std::sync::mpsc;

    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(f());
    });

    match rx.recv_timeout(timeout) {
        Ok(v) => v,
        Err(_) => panic!("test timed out after {:?}", timeout),
    }
}

/// Assert that a result is Ok and return the value.
#[macro_export]
macro_rules! assert_ok {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
    ($result:expr, $message:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("{}: {:?}", $message, e),
        }
    };
}

/// Assert that a result is Err.
#[macro_export]
macro_rules! assert_err {
    ($result:expr) => {
        match $result {
            Ok(value) => panic!("Expected Err, got Ok: {:?}", value),
            Err(e) => e,
        }
    };
}
