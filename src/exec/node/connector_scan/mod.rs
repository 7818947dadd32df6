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
//! Connector scan node: runs one scanner per scan range on the shared scan executor
//! and hands their chunks to a single consumer.
//!
//! Chunk order is preserved per scanner only; chunks of different scanners interleave
//! arbitrarily. A failing scanner records the first error, the other workers notice
//! it before their next batch, and the consumer sees the error after draining the
//! chunks already produced.

mod scheduler;
pub mod status_box;

use std::sync::Arc;
use std::time::Duration;

use arrow::datatypes::SchemaRef;

pub use scheduler::ScanStats;
use scheduler::ScanScheduler;

use super::{ExecNode, ScanNode};
use crate::common::config;
use crate::common::ids::PlanNodeId;
use crate::common::status::{ScanError, ScanResult, Status};
use crate::connector::{
    ConnectorRegistry, ConnectorScanPlanNode, ConnectorScanner, DataSourceProviderRef, ScanRange,
};
use crate::exec::chunk::Chunk;
use crate::exec::pipeline::builder::PipelineBuilderContext;
use crate::exec::pipeline::operator_factory::OperatorFactory;
use crate::exec::pipeline::scan::ConnectorScanOperatorFactory;
use crate::novarocks_logging::{debug, info};
use crate::runtime::descriptors::DescriptorTbl;
use crate::runtime::profile::{RuntimeProfile, TUnit};
use crate::runtime::runtime_state::RuntimeState;

const SCAN_RANGES_COUNTER: &str = "ScanRanges";

/// Tunables of a connector scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectorScanOptions {
    /// Ceiling on scanner tasks running at once.
    pub num_scanners: usize,
    /// Chunks reserved per running scanner; the pool holds `num_scanners * chunks_per_scanner`.
    pub chunks_per_scanner: usize,
    /// Rows a scanner reads before it yields its thread.
    pub scanner_row_num: usize,
    /// Poll interval while `close` waits for workers.
    pub close_wait: Duration,
}

impl ConnectorScanOptions {
    pub fn from_config(chunk_size: usize) -> Self {
        let scanner_row_num = config::scanner_row_num();
        Self {
            num_scanners: config::connector_scan_max_scanners(),
            chunks_per_scanner: (scanner_row_num / chunk_size.max(1)).max(1),
            scanner_row_num,
            close_wait: Duration::from_millis(config::scan_close_wait_ms()),
        }
    }

    pub fn validate(&self) -> Status {
        if self.num_scanners == 0 {
            return Err(ScanError::invalid_argument("num_scanners must be positive"));
        }
        if self.chunks_per_scanner == 0 {
            return Err(ScanError::invalid_argument(
                "chunks_per_scanner must be positive",
            ));
        }
        if self.scanner_row_num == 0 {
            return Err(ScanError::invalid_argument("scanner_row_num must be positive"));
        }
        if self.close_wait.is_zero() {
            return Err(ScanError::invalid_argument("close_wait must be positive"));
        }
        Ok(())
    }
}

pub struct ConnectorScanNode {
    node_id: PlanNodeId,
    connector_name: String,
    limit: Option<usize>,
    schema: SchemaRef,
    provider: DataSourceProviderRef,
    options_override: Option<ConnectorScanOptions>,
    options: Option<ConnectorScanOptions>,
    chunk_size: usize,
    scan_ranges: Vec<ScanRange>,
    profile: RuntimeProfile,
    scheduler: Option<Arc<ScanScheduler>>,
    prepared: bool,
    opened: bool,
    eos: bool,
    /// Returned by every `get_next` once the scan has failed.
    terminal_error: Option<ScanError>,
    closed: bool,
    num_rows_returned: usize,
}

impl ConnectorScanNode {
    /// Resolves the output tuple and the connector named by `plan`.
    pub fn new(
        plan: &ConnectorScanPlanNode,
        descs: &DescriptorTbl,
        registry: &ConnectorRegistry,
    ) -> ScanResult<Self> {
        let tuple = descs.get_tuple(plan.tuple_id)?;
        let provider = registry.create_data_source_provider(plan, tuple)?;
        Ok(Self::with_provider(
            plan.node_id,
            plan.connector_name.clone(),
            tuple.arrow_schema(),
            provider,
        )
        .with_limit(plan.limit))
    }

    pub fn with_provider(
        node_id: PlanNodeId,
        connector_name: impl Into<String>,
        schema: SchemaRef,
        provider: DataSourceProviderRef,
    ) -> Self {
        let profile = RuntimeProfile::new(format!("CONNECTOR_SCAN_NODE (id={node_id})"));
        let connector_name = connector_name.into();
        profile.add_info_string("Connector", connector_name.clone());
        Self {
            node_id,
            connector_name,
            limit: None,
            schema,
            provider,
            options_override: None,
            options: None,
            chunk_size: 0,
            scan_ranges: Vec::new(),
            profile,
            scheduler: None,
            prepared: false,
            opened: false,
            eos: false,
            terminal_error: None,
            closed: false,
            num_rows_returned: 0,
        }
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Overrides the config-derived tunables.
    pub fn with_options(mut self, options: ConnectorScanOptions) -> Self {
        self.options_override = Some(options);
        self
    }

    pub fn node_id(&self) -> PlanNodeId {
        self.node_id
    }

    pub fn connector_name(&self) -> &str {
        &self.connector_name
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn profile(&self) -> &RuntimeProfile {
        &self.profile
    }

    pub fn data_source_provider(&self) -> &DataSourceProviderRef {
        &self.provider
    }

    /// `None` until `open` has started scanners.
    pub fn stats(&self) -> Option<ScanStats> {
        self.scheduler.as_ref().map(|s| s.stats())
    }

    pub fn num_rows_returned(&self) -> usize {
        self.num_rows_returned
    }

    /// Builds the source operator factories for the pipeline engine instead of
    /// running scanners on the scan executor.
    pub fn decompose_to_pipeline(
        &self,
        context: &PipelineBuilderContext,
    ) -> ScanResult<Vec<Arc<dyn OperatorFactory>>> {
        let options = match self.options_override {
            Some(options) => options,
            None => ConnectorScanOptions::from_config(context.chunk_size()),
        };
        options.validate()?;
        let mut scan_ranges = self.scan_ranges.clone();
        if scan_ranges.is_empty() && !self.accept_empty_scan_ranges() {
            scan_ranges.push(ScanRange::Empty);
        }
        let factory = ConnectorScanOperatorFactory::new(
            self.node_id,
            self.schema.clone(),
            Arc::clone(&self.provider),
            scan_ranges,
            options.chunks_per_scanner,
            context.chunk_size(),
            self.limit,
        );
        let factory: Arc<dyn OperatorFactory> = Arc::new(factory);
        Ok(vec![factory])
    }

    fn create_scanners(&self, scan_ranges: &[ScanRange]) -> ScanResult<Vec<ConnectorScanner>> {
        let mut scanners = Vec::with_capacity(scan_ranges.len());
        for (id, range) in scan_ranges.iter().enumerate() {
            let data_source = self.provider.create_data_source(range)?;
            scanners.push(ConnectorScanner::new(id, range.clone(), data_source));
        }
        Ok(scanners)
    }

    fn start_scan(&mut self, state: &RuntimeState) -> Status {
        let options = self
            .options
            .ok_or_else(|| ScanError::internal("connector scan node opened before prepare"))?;
        let mut scan_ranges = self.scan_ranges.clone();
        if scan_ranges.is_empty() {
            if self.accept_empty_scan_ranges() {
                debug!(node_id = self.node_id, "no scan ranges, nothing to scan");
                self.eos = true;
                return Ok(());
            }
            scan_ranges.push(ScanRange::Empty);
        }
        let scanners = self.create_scanners(&scan_ranges)?;
        let scheduler = Arc::new(ScanScheduler::new(
            state.clone(),
            &options,
            self.schema.clone(),
            self.chunk_size,
            &self.profile,
        ));
        self.scheduler = Some(Arc::clone(&scheduler));
        scheduler.start(scanners, &self.profile)
    }

    fn apply_limit(&mut self, chunk: &mut Chunk) {
        if let Some(limit) = self.limit {
            let remaining = limit.saturating_sub(self.num_rows_returned);
            if chunk.len() >= remaining {
                chunk.truncate(remaining);
                self.eos = true;
                if let Some(scheduler) = &self.scheduler {
                    scheduler.update_status(&Err(ScanError::end_of_file("limit reached")));
                }
            }
        }
        self.num_rows_returned += chunk.len();
    }
}

impl ExecNode for ConnectorScanNode {
    fn prepare(&mut self, state: &RuntimeState) -> Status {
        if state.chunk_size() == 0 {
            return Err(ScanError::invalid_argument("chunk_size must be positive"));
        }
        let options = match self.options_override {
            Some(options) => options,
            None => ConnectorScanOptions::from_config(state.chunk_size()),
        };
        options.validate()?;
        self.options = Some(options);
        self.chunk_size = state.chunk_size();
        self.prepared = true;
        Ok(())
    }

    fn open(&mut self, state: &RuntimeState) -> Status {
        if !self.prepared {
            return Err(ScanError::internal("connector scan node opened before prepare"));
        }
        if self.closed {
            return Err(ScanError::internal("connector scan node opened after close"));
        }
        if self.opened {
            return Ok(());
        }
        if state.is_cancelled() {
            return Err(ScanError::cancelled("query cancelled"));
        }
        self.opened = true;
        if self.limit == Some(0) {
            self.eos = true;
            return Ok(());
        }
        self.start_scan(state)
    }

    fn get_next(&mut self, state: &RuntimeState) -> ScanResult<Option<Chunk>> {
        if self.closed {
            return Err(ScanError::internal("get_next on a closed connector scan node"));
        }
        if !self.opened {
            return Err(ScanError::internal("get_next before open"));
        }
        if let Some(err) = &self.terminal_error {
            return Err(err.clone());
        }
        if self.eos {
            return Ok(None);
        }
        let Some(scheduler) = self.scheduler.clone() else {
            return Err(ScanError::internal("connector scan node has no scheduler"));
        };
        if state.is_cancelled() {
            let err = ScanError::cancelled("query cancelled");
            scheduler.update_status(&Err(err.clone()));
            self.terminal_error = Some(err.clone());
            return Err(err);
        }
        match scheduler.next_chunk() {
            Some(mut chunk) => {
                if let Err(err) = scheduler.on_chunk_consumed() {
                    self.terminal_error = Some(err.clone());
                    return Err(err);
                }
                self.apply_limit(&mut chunk);
                Ok(Some(chunk))
            }
            None => match scheduler.status() {
                Ok(()) => {
                    scheduler.update_status(&Err(ScanError::end_of_file(
                        "EOF of connector scan node",
                    )));
                    self.eos = true;
                    Ok(None)
                }
                Err(err) if err.is_end_of_file() => {
                    self.eos = true;
                    Ok(None)
                }
                Err(err) => {
                    self.terminal_error = Some(err.clone());
                    Err(err)
                }
            },
        }
    }

    fn close(&mut self, _state: &RuntimeState) -> Status {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Some(scheduler) = &self.scheduler {
            scheduler.cancel_and_wait();
            let stats = scheduler.stats();
            info!(
                node_id = self.node_id,
                connector = %self.connector_name,
                scanners = stats.scanners_total,
                peak_threads = stats.peak_running_threads,
                rows_returned = self.num_rows_returned,
                "connector scan node closed"
            );
        }
        Ok(())
    }
}

impl ScanNode for ConnectorScanNode {
    fn set_scan_ranges(&mut self, scan_ranges: Vec<ScanRange>) -> Status {
        if self.opened {
            return Err(ScanError::invalid_argument(
                "scan ranges must be set before open",
            ));
        }
        self.profile
            .counter_set(SCAN_RANGES_COUNTER, TUnit::Unit, scan_ranges.len() as i64);
        self.scan_ranges = scan_ranges;
        Ok(())
    }

    fn accept_empty_scan_ranges(&self) -> bool {
        self.provider.accept_empty_scan_ranges()
    }
}

impl Drop for ConnectorScanNode {
    fn drop(&mut self) {
        if !self.closed
            && let Some(scheduler) = &self.scheduler
        {
            scheduler.cancel_and_wait();
        }
    }
}

impl std::fmt::Debug for ConnectorScanNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorScanNode")
            .field("node_id", &self.node_id)
            .field("connector", &self.connector_name)
            .field("scan_ranges", &self.scan_ranges.len())
            .field("limit", &self.limit)
            .field("opened", &self.opened)
            .field("eos", &self.eos)
            .field("closed", &self.closed)
            .finish()
    }
}
