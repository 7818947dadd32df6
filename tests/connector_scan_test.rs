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
//! Integration tests for the connector scan node.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use novarocks_scan::common::ids::TupleId;
use novarocks_scan::connector::{
    Connector, ConnectorScanConfig, DataSourceProviderRef, ScanRange,
};
use novarocks_scan::exec::pipeline::builder::PipelineBuilderContext;
use novarocks_scan::exec::pipeline::driver::PipelineDriver;
use novarocks_scan::runtime::descriptors::{DescriptorTbl, TupleDescriptor};
use novarocks_scan::{
    ConnectorRegistry, ConnectorScanNode, ConnectorScanOptions, ConnectorScanPlanNode, ExecNode,
    RuntimeState, ScanError, ScanNode, ScanResult,
};

use crate::common::*;

mod common;

const TIMEOUT: Duration = Duration::from_secs(30);

fn drain(node: &mut ConnectorScanNode, state: &RuntimeState) -> (Arrivals, ScanResult<()>) {
    let mut arrivals = Arrivals::default();
    loop {
        match node.get_next(state) {
            Ok(Some(chunk)) => arrivals.record(&chunk),
            Ok(None) => return (arrivals, Ok(())),
            Err(e) => return (arrivals, Err(e)),
        }
    }
}

fn open_node(
    provider: &Arc<TestSourceProvider>,
    opts: ConnectorScanOptions,
    ranges: Vec<ScanRange>,
    state: &RuntimeState,
) -> ConnectorScanNode {
    let mut node = test_node(Arc::clone(provider), opts);
    assert_ok!(node.set_scan_ranges(ranges));
    assert_ok!(node.prepare(state));
    assert_ok!(node.open(state));
    node
}

#[test]
fn test_no_scan_ranges_ends_immediately() {
    let provider = Arc::new(TestSourceProvider::new(3, 4));
    let state = test_state(8, 2);
    let mut node = open_node(&provider, options(2, 2), vec![], &state);

    assert!(assert_ok!(node.get_next(&state)).is_none());
    assert!(node.stats().is_none(), "no scheduler should be started");
    assert_eq!(provider.source_stats.created.load(std::sync::atomic::Ordering::Acquire), 0);
    assert_ok!(node.close(&state));
}

#[test]
fn test_empty_scan_ranges_padded_when_not_accepted() {
    let provider = Arc::new(TestSourceProvider::new(3, 4).rejecting_empty_ranges());
    let state = test_state(8, 2);
    let mut node = open_node(&provider, options(2, 2), vec![], &state);
    assert!(!node.accept_empty_scan_ranges());

    let (arrivals, result) = drain(&mut node, &state);
    assert_ok!(result);
    assert_eq!(arrivals.chunks, 0);
    let stats = node.stats().expect("scan started");
    assert_eq!(stats.scanners_total, 1);
    assert_eq!(stats.closed_scanners, 1);
    assert_ok!(node.close(&state));
}

#[test]
fn test_budget_bounds_running_scanners() {
    let provider = Arc::new(TestSourceProvider::new(3, 4).with_delay(Duration::from_millis(2)));
    let source_stats = Arc::clone(&provider.source_stats);
    let (arrivals, stats) = run_with_timeout(TIMEOUT, move || {
        let state = test_state(8, 4);
        let mut node = open_node(&provider, options(2, 2), partitions(10), &state);
        let (arrivals, result) = drain(&mut node, &state);
        assert_ok!(result);
        assert_ok!(node.close(&state));
        (arrivals, node.stats().expect("stats"))
    });

    assert_eq!(arrivals.chunks, 30);
    assert_eq!(arrivals.rows, 120);
    assert_eq!(arrivals.per_range.len(), 10);
    arrivals.assert_in_order();

    assert!(source_stats.max_active() <= 2, "max active {}", source_stats.max_active());
    assert!(stats.peak_running_threads <= 2);
    assert_eq!(stats.scanners_total, 10);
    assert_eq!(stats.closed_scanners, 10);
    assert_eq!(source_stats.opened(), 10);
    assert_eq!(source_stats.closed(), 10);
    assert_eq!(stats.running_threads, 0);
}

#[test]
fn test_chunk_conservation() {
    let provider = Arc::new(TestSourceProvider::new(7, 3));
    let state = test_state(4, 3);
    let mut node = open_node(&provider, options(3, 2), partitions(6), &state);
    let (arrivals, result) = drain(&mut node, &state);
    assert_ok!(result);

    let stats = node.stats().expect("stats");
    assert_eq!(stats.chunks_published, arrivals.chunks);
    assert_eq!(
        stats.chunks_borrowed,
        stats.chunks_returned + stats.chunks_published
    );
    assert!(stats.chunk_pool_size <= stats.chunk_pool_capacity);
    assert_eq!(stats.chunk_pool_capacity, 6);
    assert_eq!(stats.closed_scanners, stats.scanners_total);
    assert_eq!(stats.queued_chunks, 0);
    assert_ok!(node.close(&state));
}

#[test]
fn test_time_slicing_keeps_budget_and_order() {
    let provider = Arc::new(TestSourceProvider::new(5, 2));
    let source_stats = Arc::clone(&provider.source_stats);
    let (arrivals, stats) = run_with_timeout(TIMEOUT, move || {
        let state = test_state(4, 8);
        let opts = ConnectorScanOptions {
            scanner_row_num: 4,
            ..options(3, 1)
        };
        let mut node = open_node(&provider, opts, partitions(64), &state);
        let (arrivals, result) = drain(&mut node, &state);
        assert_ok!(result);
        assert_ok!(node.close(&state));
        (arrivals, node.stats().expect("stats"))
    });

    assert_eq!(arrivals.chunks, 64 * 5);
    arrivals.assert_in_order();
    assert!(source_stats.max_active() <= 3, "max active {}", source_stats.max_active());
    assert!(stats.peak_running_threads <= 3);
    assert!(stats.scanner_submits > stats.scanners_total);
    assert_eq!(stats.closed_scanners, 64);
}

#[test]
fn test_failed_scanner_reports_error_after_drain() {
    let provider = Arc::new(
        TestSourceProvider::new(4, 2)
            .with_delay(Duration::from_millis(1))
            .with_failure(2, 1),
    );
    let source_stats = Arc::clone(&provider.source_stats);
    let (arrivals, result, stats) = run_with_timeout(TIMEOUT, move || {
        let state = test_state(4, 5);
        let mut node = open_node(&provider, options(5, 2), partitions(5), &state);
        let (arrivals, result) = drain(&mut node, &state);
        // The failure stays the answer; end-of-stream is never reported afterwards.
        for _ in 0..2 {
            let again = assert_err!(node.get_next(&state));
            assert!(matches!(again, ScanError::IoError(_)), "{again}");
        }
        assert_ok!(node.close(&state));
        (arrivals, result, node.stats().expect("stats"))
    });

    let err = assert_err!(result);
    assert!(matches!(err, ScanError::IoError(_)), "{err}");
    assert_eq!(arrivals.per_range.get(&2), Some(&vec![0]));
    arrivals.assert_in_order();
    for seqs in arrivals.per_range.values() {
        assert!(seqs.len() <= 4);
    }
    assert_eq!(stats.running_threads, 0);
    assert_eq!(stats.closed_scanners, stats.scanners_total);
    assert_eq!(source_stats.closed(), source_stats.opened());
}

#[test]
fn test_error_is_sticky_while_scanners_remain_parked() {
    let provider = Arc::new(TestSourceProvider::new(3, 2).with_failure(0, 0));
    let source_stats = Arc::clone(&provider.source_stats);
    run_with_timeout(TIMEOUT, move || {
        let state = test_state(4, 2);
        let mut node = open_node(&provider, options(1, 2), partitions(3), &state);

        let first = assert_err!(node.get_next(&state));
        assert!(matches!(first, ScanError::IoError(_)), "{first}");
        let stats = node.stats().expect("stats");
        assert_eq!(stats.scanners_total, 3);
        assert!(stats.closed_scanners < stats.scanners_total, "{stats:?}");
        assert_eq!(stats.queued_chunks, 0);

        for _ in 0..3 {
            match node.get_next(&state) {
                Err(err) => assert_eq!(err, first),
                Ok(chunk) => panic!(
                    "get_next after a failure returned {:?} with {:?}",
                    chunk.map(|c| c.len()),
                    node.stats()
                ),
            }
        }

        assert_ok!(node.close(&state));
        let stats = node.stats().expect("stats");
        assert_eq!(stats.closed_scanners, stats.scanners_total);
        assert_eq!(stats.pending_scanners, 0);
    });
    assert_eq!(source_stats.closed(), source_stats.opened());
}

#[test]
fn test_stalled_consumer_applies_backpressure() {
    let provider = Arc::new(TestSourceProvider::new(6, 2));
    let source_stats = Arc::clone(&provider.source_stats);
    let state = test_state(4, 2);
    let mut node = open_node(&provider, options(1, 2), partitions(1), &state);

    let published = |node: &ConnectorScanNode| node.stats().expect("stats").chunks_published;
    assert!(wait_for(|| published(&node) == 2, TIMEOUT));
    thread::sleep(Duration::from_millis(50));
    let stats = node.stats().expect("stats");
    assert_eq!(stats.chunks_published, 2);
    assert_eq!(source_stats.batches(), 2);
    assert_eq!(stats.running_threads, 0);
    assert_eq!(stats.pending_scanners, 1);

    let first = assert_ok!(node.get_next(&state)).expect("first chunk");
    assert_eq!(chunk_key(&first), (0, 0));
    assert!(wait_for(|| published(&node) >= 3, TIMEOUT));

    let (rest, result) = drain(&mut node, &state);
    assert_ok!(result);
    assert_eq!(rest.chunks, 5);
    assert_eq!(rest.per_range.get(&0), Some(&vec![1, 2, 3, 4, 5]));
    assert_ok!(node.close(&state));
}

#[test]
fn test_close_mid_stream_closes_every_scanner() {
    let provider = Arc::new(TestSourceProvider::new(50, 2).with_delay(Duration::from_millis(1)));
    let source_stats = Arc::clone(&provider.source_stats);
    let stats = run_with_timeout(TIMEOUT, move || {
        let state = test_state(4, 4);
        let mut node = open_node(&provider, options(2, 2), partitions(20), &state);
        for _ in 0..3 {
            assert!(assert_ok!(node.get_next(&state)).is_some());
        }
        assert_ok!(node.close(&state));
        assert_ok!(node.close(&state));
        assert!(node.get_next(&state).is_err());
        node.stats().expect("stats")
    });

    assert_eq!(stats.running_threads, 0);
    assert_eq!(stats.pending_scanners, 0);
    assert_eq!(stats.closed_scanners, 20);
    assert_eq!(source_stats.closed(), source_stats.opened());
}

#[test]
fn test_drop_without_close_stops_workers() {
    let provider = Arc::new(TestSourceProvider::new(50, 2).with_delay(Duration::from_millis(1)));
    let source_stats = Arc::clone(&provider.source_stats);
    run_with_timeout(TIMEOUT, move || {
        let state = test_state(4, 4);
        let mut node = open_node(&provider, options(3, 2), partitions(6), &state);
        assert!(assert_ok!(node.get_next(&state)).is_some());
        drop(node);
    });
    assert_eq!(source_stats.closed(), source_stats.opened());
}

#[test]
fn test_runtime_cancellation() {
    let provider = Arc::new(TestSourceProvider::new(1000, 2).with_delay(Duration::from_millis(1)));
    let err = run_with_timeout(TIMEOUT, move || {
        let state = test_state(4, 2);
        let mut node = open_node(&provider, options(2, 2), partitions(4), &state);
        assert!(assert_ok!(node.get_next(&state)).is_some());
        state.cancel();
        let err = loop {
            match node.get_next(&state) {
                Ok(Some(_)) => continue,
                Ok(None) => panic!("cancelled scan reported end of stream"),
                Err(e) => break e,
            }
        };
        assert!(assert_err!(node.get_next(&state)).is_cancelled());
        assert_ok!(node.close(&state));
        err
    });
    assert!(err.is_cancelled(), "{err}");
}

#[test]
fn test_cancelled_before_open() {
    let provider = Arc::new(TestSourceProvider::new(1, 1));
    let state = test_state(4, 1);
    let mut node = test_node(provider, options(1, 1));
    assert_ok!(node.set_scan_ranges(partitions(2)));
    assert_ok!(node.prepare(&state));
    state.cancel();
    assert!(assert_err!(node.open(&state)).is_cancelled());
    assert_ok!(node.close(&state));
}

#[test]
fn test_limit_truncates_and_stops() {
    let provider = Arc::new(TestSourceProvider::new(5, 4));
    let state = test_state(4, 2);
    let mut node = test_node(Arc::clone(&provider), options(2, 2)).with_limit(Some(10));
    assert_ok!(node.set_scan_ranges(partitions(3)));
    assert_ok!(node.prepare(&state));
    assert_ok!(node.open(&state));

    let (arrivals, result) = drain(&mut node, &state);
    assert_ok!(result);
    assert_eq!(arrivals.rows, 10);
    assert_eq!(node.num_rows_returned(), 10);
    assert!(assert_ok!(node.get_next(&state)).is_none());
    assert_ok!(node.close(&state));
}

#[test]
fn test_invalid_scan_range_fails_open() {
    let provider = Arc::new(TestSourceProvider::new(1, 1));
    let state = test_state(4, 1);
    let mut node = test_node(Arc::clone(&provider), options(1, 1));
    assert_ok!(node.set_scan_ranges(vec![
        ScanRange::Partition { index: 0 },
        ScanRange::File {
            path: "/data/part-0.parquet".to_string(),
            offset: 0,
            length: 128,
        },
    ]));
    assert_ok!(node.prepare(&state));
    let err = assert_err!(node.open(&state));
    assert!(matches!(err, ScanError::InvalidArgument(_)), "{err}");
    assert!(node.stats().is_none());
    assert_eq!(provider.source_stats.opened(), 0);
    assert_ok!(node.close(&state));
}

#[test]
fn test_invalid_options_fail_prepare() {
    let state = test_state(4, 1);
    for opts in [options(0, 1), options(1, 0)] {
        let mut node = test_node(Arc::new(TestSourceProvider::new(1, 1)), opts);
        let err = assert_err!(node.prepare(&state));
        assert!(matches!(err, ScanError::InvalidArgument(_)), "{err}");
    }
    let mut node = test_node(Arc::new(TestSourceProvider::new(1, 1)), options(1, 1));
    assert!(node.open(&state).is_err(), "open before prepare");
}

#[test]
fn test_profile_counters() {
    let provider = Arc::new(TestSourceProvider::new(2, 2));
    let state = test_state(4, 2);
    let mut node = open_node(&provider, options(2, 3), partitions(5), &state);
    let (arrivals, result) = drain(&mut node, &state);
    assert_ok!(result);
    assert_ok!(node.close(&state));

    let profile = node.profile();
    let counter = |name: &str| {
        profile
            .get_counter(name)
            .unwrap_or_else(|| panic!("missing counter {name}"))
            .value()
    };
    assert_eq!(counter("ScanRanges"), 5);
    assert_eq!(counter("ChunkBufferCapacity"), 6);
    assert!(counter("ScannerQueueCounter") >= 5);
    assert!(counter("ScannerQueueTime") >= 0);
    assert!(counter("PeakScannerThreads") <= 2);
    assert_eq!(counter("RowsRead"), arrivals.rows as i64);
    let depth = counter("PeakResultQueueDepth");
    assert!((0..=6).contains(&depth), "peak queue depth {depth}");
    assert_eq!(profile.get_info_string("Connector").as_deref(), Some("test"));
}

struct TestConnector {
    provider: Arc<TestSourceProvider>,
}

impl Connector for TestConnector {
    fn name(&self) -> &'static str {
        "test"
    }

    fn create_data_source_provider(
        &self,
        _plan: &ConnectorScanPlanNode,
        _tuple: &TupleDescriptor,
    ) -> ScanResult<DataSourceProviderRef> {
        let provider: DataSourceProviderRef = self.provider.clone();
        Ok(provider)
    }
}

#[test]
fn test_node_from_plan_and_registry() {
    let provider = Arc::new(TestSourceProvider::new(2, 2));
    let mut registry = ConnectorRegistry::default();
    registry.register(Arc::new(TestConnector {
        provider: Arc::clone(&provider),
    }));
    let mut descs = DescriptorTbl::new();
    descs.add_tuple(test_tuple());

    let mut plan = ConnectorScanPlanNode {
        node_id: 3,
        tuple_id: TupleId(0),
        connector_name: "test".to_string(),
        limit: None,
        config: ConnectorScanConfig::Opaque,
    };
    let state = test_state(4, 2);
    let mut node =
        assert_ok!(ConnectorScanNode::new(&plan, &descs, &registry)).with_options(options(2, 2));
    assert_eq!(node.node_id(), 3);
    assert_ok!(node.set_scan_ranges(partitions(3)));
    assert_ok!(node.prepare(&state));
    assert_ok!(node.open(&state));
    let (arrivals, result) = drain(&mut node, &state);
    assert_ok!(result);
    assert_eq!(arrivals.chunks, 6);
    assert_ok!(node.close(&state));

    plan.connector_name = "hive".to_string();
    assert!(ConnectorScanNode::new(&plan, &descs, &registry).is_err());
    plan.connector_name = "test".to_string();
    plan.tuple_id = TupleId(9);
    assert!(ConnectorScanNode::new(&plan, &descs, &registry).is_err());
}

#[test]
fn test_decompose_to_pipeline() {
    let provider = Arc::new(TestSourceProvider::new(3, 2));
    let mut node = test_node(Arc::clone(&provider), options(2, 2));
    assert_ok!(node.set_scan_ranges(partitions(5)));
    let ctx = assert_ok!(PipelineBuilderContext::new(2, 4));
    let factories = assert_ok!(node.decompose_to_pipeline(&ctx));
    assert_eq!(factories.len(), 1);
    let factory = Arc::clone(&factories[0]);
    assert!(factory.is_source());

    let handles: Vec<_> = (0..ctx.dop())
        .map(|driver_id| {
            let factory = Arc::clone(&factory);
            thread::spawn(move || {
                let state = RuntimeState::new(4);
                let mut driver = PipelineDriver::new(driver_id, factory.create(2, driver_id));
                let mut arrivals = Arrivals::default();
                assert_ok!(driver.run(&state, |chunk| arrivals.record(&chunk)));
                arrivals
            })
        })
        .collect();
    let mut chunks = 0;
    for handle in handles {
        let arrivals = handle.join().expect("driver thread");
        arrivals.assert_in_order();
        chunks += arrivals.chunks;
    }
    assert_eq!(chunks, 15);
    assert_eq!(provider.source_stats.closed(), provider.source_stats.opened());
    assert!(node.stats().is_none(), "pipeline path does not start scan threads");
}
