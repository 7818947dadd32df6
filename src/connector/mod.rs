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
//! Data-source abstraction driven by the connector scan node.
//!
//! A `Connector` turns a scan plan node into a `DataSourceProvider`, which in turn
//! creates one `DataSource` per scan range. The scan node only ever sees these traits.

pub mod memory;
pub mod scanner;

use std::collections::HashMap;
use std::sync::Arc;

use crate::common::ids::{PlanNodeId, TupleId};
use crate::common::status::{ScanResult, Status};
use crate::exec::chunk::Chunk;
use crate::runtime::descriptors::TupleDescriptor;
use crate::runtime::runtime_state::RuntimeState;

pub use memory::{MemoryScanConfig, MemoryTable};
pub use scanner::{ConnectorScanner, ScannerState};

/// One unit of source data assigned to a single scanner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanRange {
    /// A partition of a table, addressed by position.
    Partition { index: usize },
    /// A byte range of a file.
    File {
        path: String,
        offset: u64,
        length: u64,
    },
    /// Placeholder range that yields no rows.
    Empty,
}

impl ScanRange {
    pub fn describe(&self) -> String {
        match self {
            ScanRange::Partition { index } => format!("partition={index}"),
            ScanRange::File {
                path,
                offset,
                length,
            } => format!("path={path} offset={offset} length={length}"),
            ScanRange::Empty => "empty".to_string(),
        }
    }
}

/// Connector-specific part of a scan plan node.
#[derive(Clone, Debug)]
pub enum ConnectorScanConfig {
    Memory(MemoryScanConfig),
    /// The connector carries its own configuration.
    Opaque,
}

/// Plan node describing a connector scan.
#[derive(Clone, Debug)]
pub struct ConnectorScanPlanNode {
    pub node_id: PlanNodeId,
    pub tuple_id: TupleId,
    pub connector_name: String,
    pub limit: Option<usize>,
    pub config: ConnectorScanConfig,
}

/// Reads rows of one scan range.
pub trait DataSource: Send {
    fn name(&self) -> &str;

    fn open(&mut self, state: &RuntimeState) -> Status;

    /// Fills `chunk` with the next batch; `Err(EndOfFile)` once the range is exhausted.
    fn get_next(&mut self, state: &RuntimeState, chunk: &mut Chunk) -> Status;

    fn close(&mut self, state: &RuntimeState);

    fn raw_rows_read(&self) -> u64;

    fn num_rows_read(&self) -> u64 {
        self.raw_rows_read()
    }
}

/// Creates data sources for the scan ranges of one scan node.
pub trait DataSourceProvider: Send + Sync {
    fn create_data_source(&self, scan_range: &ScanRange) -> ScanResult<Box<dyn DataSource>>;

    /// Whether an empty range set means "nothing to read" rather than "read everything once".
    fn accept_empty_scan_ranges(&self) -> bool {
        true
    }
}

pub type DataSourceProviderRef = Arc<dyn DataSourceProvider>;

pub trait Connector: Send + Sync {
    fn name(&self) -> &'static str;

    fn create_data_source_provider(
        &self,
        plan: &ConnectorScanPlanNode,
        tuple: &TupleDescriptor,
    ) -> ScanResult<DataSourceProviderRef>;
}

#[derive(Clone)]
pub struct ConnectorRegistry {
    connectors: HashMap<&'static str, Arc<dyn Connector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self {
            connectors: HashMap::new(),
        }
    }

    pub fn register(&mut self, connector: Arc<dyn Connector>) {
        self.connectors.insert(connector.name(), connector);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Connector>> {
        self.connectors.get(name).cloned()
    }

    pub fn create_data_source_provider(
        &self,
        plan: &ConnectorScanPlanNode,
        tuple: &TupleDescriptor,
    ) -> ScanResult<DataSourceProviderRef> {
        let Some(connector) = self.connectors.get(plan.connector_name.as_str()) else {
            return Err(crate::common::status::ScanError::invalid_argument(format!(
                "unknown connector: {}",
                plan.connector_name
            )));
        };
        connector.create_data_source_provider(plan, tuple)
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        let mut reg = ConnectorRegistry::new();
        reg.register(Arc::new(memory::MemoryConnector));
        reg
    }
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.connectors.keys().copied().collect();
        names.sort();
        f.debug_struct("ConnectorRegistry")
            .field("connectors", &names)
            .finish()
    }
}
