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
use crate::novarocks_config::config as novarocks_app_config;

pub(crate) fn connector_scan_max_scanners() -> usize {
    novarocks_app_config()
        .ok()
        .map(|c| c.scan.max_scanners)
        .unwrap_or(50)
}

pub(crate) fn scanner_row_num() -> usize {
    novarocks_app_config()
        .ok()
        .map(|c| c.scan.scanner_row_num)
        .unwrap_or(16_384)
}

pub(crate) fn chunk_size() -> usize {
    novarocks_app_config()
        .ok()
        .map(|c| c.scan.chunk_size)
        .unwrap_or(4096)
}

pub(crate) fn scan_thread_pool_thread_num() -> usize {
    novarocks_app_config()
        .ok()
        .map(|c| c.scan.actual_scan_threads())
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
}

pub(crate) fn scan_thread_pool_queue_size() -> usize {
    novarocks_app_config()
        .ok()
        .map(|c| c.scan.scan_thread_pool_queue_size)
        .unwrap_or(102_400)
}

pub(crate) fn scan_close_wait_ms() -> u64 {
    novarocks_app_config()
        .ok()
        .map(|c| c.scan.close_wait_ms)
        .unwrap_or(10)
}
