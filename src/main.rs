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
use std::env;
use std::process;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, anyhow, bail};
use arrow::array::{Int64Array, RecordBatch};
use arrow::datatypes::{DataType, Field, Schema};

use novarocks_scan::common::ids::{SlotId, TupleId};
use novarocks_scan::connector::{ConnectorScanConfig, MemoryScanConfig, MemoryTable};
use novarocks_scan::runtime::descriptors::{DescriptorTbl, SlotDescriptor, TupleDescriptor};
use novarocks_scan::runtime::scan_executor::ScanExecutor;
use novarocks_scan::{
    ConnectorRegistry, ConnectorScanNode, ConnectorScanPlanNode, ExecNode, RuntimeState, ScanNode,
};
use novarocks_scan::{novarocks_config, novarocks_logging};

struct Args {
    config_path: Option<String>,
    partitions: usize,
    rows: usize,
    limit: Option<usize>,
}

fn usage() {
    eprintln!(
        "Usage: novarocks-scan [--config <path>] [--partitions <n>] [--rows <n>] [--limit <n>]"
    );
    eprintln!("  Scans a generated in-memory table and prints the scan profile.");
}

fn parse_args() -> Result<Args> {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut parsed = Args {
        config_path: None,
        partitions: 8,
        rows: 100_000,
        limit: None,
    };
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = |name: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| anyhow!("missing value for {name}"))
        };
        match arg.as_str() {
            "--config" | "-c" => parsed.config_path = Some(value("--config")?),
            "--partitions" => parsed.partitions = value("--partitions")?.parse()?,
            "--rows" => parsed.rows = value("--rows")?.parse()?,
            "--limit" => parsed.limit = Some(value("--limit")?.parse()?),
            "--help" | "-h" => {
                usage();
                process::exit(0);
            }
            other => bail!("unknown arg: {other} (try --help)"),
        }
    }
    Ok(parsed)
}

fn generate_table(partitions: usize, rows: usize) -> Result<MemoryTable> {
    let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
    let mut out = Vec::with_capacity(partitions);
    for p in 0..partitions {
        let start = (p * rows) as i64;
        let ids = Int64Array::from_iter_values(start..start + rows as i64);
        let batch = RecordBatch::try_new(schema.clone(), vec![Arc::new(ids)])
            .context("build partition batch")?;
        out.push(vec![batch]);
    }
    Ok(MemoryTable::new("generated", out))
}

fn run(args: Args) -> Result<()> {
    let default_cfg;
    let cfg = match &args.config_path {
        Some(p) => novarocks_config::init_from_path(p)?,
        None => match novarocks_config::init_from_env_or_default() {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("{e:#}; using built-in defaults");
                default_cfg = novarocks_config::ScanNodeConfig::default();
                &default_cfg
            }
        },
    };
    novarocks_logging::init_with_level(cfg.effective_log_filter());

    let table = Arc::new(generate_table(args.partitions, args.rows)?);
    let tuple = TupleDescriptor::new(
        TupleId(0),
        vec![SlotDescriptor::new(SlotId::new(1), "id", DataType::Int64, false)],
    );
    let mut descs = DescriptorTbl::new();
    descs.add_tuple(tuple);
    let plan = ConnectorScanPlanNode {
        node_id: 0,
        tuple_id: TupleId(0),
        connector_name: "memory".to_string(),
        limit: args.limit,
        config: ConnectorScanConfig::Memory(MemoryScanConfig {
            table: Arc::clone(&table),
        }),
    };

    let executor = Arc::new(ScanExecutor::new(
        cfg.scan.actual_scan_threads(),
        cfg.scan.scan_thread_pool_queue_size,
    ));
    let state = RuntimeState::new(cfg.scan.chunk_size).with_scan_executor(executor);
    let mut node = ConnectorScanNode::new(&plan, &descs, &ConnectorRegistry::default())?;
    node.set_scan_ranges(table.scan_ranges())?;

    let started = Instant::now();
    node.prepare(&state)?;
    node.open(&state)?;
    let mut rows = 0usize;
    let mut chunks = 0usize;
    let result = loop {
        match node.get_next(&state) {
            Ok(Some(chunk)) => {
                rows += chunk.len();
                chunks += 1;
            }
            Ok(None) => break Ok(()),
            Err(err) => break Err(err),
        }
    };
    node.close(&state)?;
    result?;

    novarocks_logging::info!(
        rows,
        chunks,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "scan finished"
    );
    println!("rows={rows} chunks={chunks}");
    print!("{}", node.profile().pretty_print());
    Ok(())
}

fn main() {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e:#}");
            usage();
            process::exit(1);
        }
    };
    if let Err(e) = run(args) {
        eprintln!("novarocks-scan failed: {e:#}");
        process::exit(1);
    }
}
