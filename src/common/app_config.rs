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
use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static CONFIG: OnceLock<ScanNodeConfig> = OnceLock::new();

fn default_log_level() -> String {
    "info".to_string()
}

pub fn init_from_path(path: impl AsRef<Path>) -> Result<&'static ScanNodeConfig> {
    if let Some(cfg) = CONFIG.get() {
        return Ok(cfg);
    }
    let path = path.as_ref().to_path_buf();
    let cfg = ScanNodeConfig::load_from_file(&path)?;
    Ok(CONFIG.get_or_init(|| cfg))
}

pub fn init_from_env_or_default() -> Result<&'static ScanNodeConfig> {
    if let Some(cfg) = CONFIG.get() {
        return Ok(cfg);
    }
    let path = config_path_from_env_or_default()?;
    let cfg = ScanNodeConfig::load_from_file(&path)?;
    Ok(CONFIG.get_or_init(|| cfg))
}

pub fn config() -> Result<&'static ScanNodeConfig> {
    init_from_env_or_default()
}

fn config_path_from_env_or_default() -> Result<PathBuf> {
    if let Ok(p) = std::env::var("NOVAROCKS_SCAN_CONFIG")
        && !p.trim().is_empty()
    {
        return Ok(PathBuf::from(p));
    }

    let candidates = [PathBuf::from("novarocks_scan.toml")];
    for p in candidates {
        if p.exists() {
            return Ok(p);
        }
    }

    Err(anyhow!(
        "missing config file: set $NOVAROCKS_SCAN_CONFIG or create ./novarocks_scan.toml"
    ))
}

#[derive(Clone, Debug, Deserialize)]
pub struct ScanNodeConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional full tracing EnvFilter expression, taking precedence over `log_level`.
    /// Example: "novarocks_scan=debug"
    #[serde(default)]
    pub log_filter: Option<String>,

    #[serde(default)]
    pub scan: ScanConfig,
}

impl ScanNodeConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read config file: {}", path.display()))?;
        let cfg: ScanNodeConfig =
            toml::from_str(&s).with_context(|| format!("parse toml: {}", path.display()))?;
        Ok(cfg)
    }

    /// Filter expression handed to the logging layer.
    pub fn effective_log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(&self.log_level)
    }
}

impl Default for ScanNodeConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_filter: None,
            scan: ScanConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ScanConfig {
    /// Upper bound of scanner threads a single connector scan node may occupy.
    #[serde(default = "default_max_scanners")]
    pub max_scanners: usize,
    /// Rows a scanner reads before yielding its thread; also sizes the chunk pool.
    #[serde(default = "default_scanner_row_num")]
    pub scanner_row_num: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// 0 means one thread per available core.
    #[serde(default)]
    pub scan_thread_pool_thread_num: usize,
    #[serde(default = "default_scan_thread_pool_queue_size")]
    pub scan_thread_pool_queue_size: usize,
    #[serde(default = "default_close_wait_ms")]
    pub close_wait_ms: u64,
}

fn default_max_scanners() -> usize {
    50
}
fn default_scanner_row_num() -> usize {
    16_384
}
fn default_chunk_size() -> usize {
    4096
}
fn default_scan_thread_pool_queue_size() -> usize {
    102_400
}
fn default_close_wait_ms() -> u64 {
    10
}

impl ScanConfig {
    pub fn actual_scan_threads(&self) -> usize {
        if self.scan_thread_pool_thread_num > 0 {
            return self.scan_thread_pool_thread_num;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_scanners: default_max_scanners(),
            scanner_row_num: default_scanner_row_num(),
            chunk_size: default_chunk_size(),
            scan_thread_pool_thread_num: 0,
            scan_thread_pool_queue_size: default_scan_thread_pool_queue_size(),
            close_wait_ms: default_close_wait_ms(),
        }
    }
}
