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
//! Status values shared by scanners, the scan node and the pipeline operators.
//!
//! `EndOfFile` doubles as the in-band "no more rows" signal of a data source, and
//! `Cancelled` is what `close` records; neither is a user-visible failure once the
//! scan has reached end-of-stream.

use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ScanError {
    #[error("end of file: {0}")]
    EndOfFile(String),
    #[error("cancelled: {0}")]
    Cancelled(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("internal error: {0}")]
    InternalError(String),
    #[error("io error: {0}")]
    IoError(String),
    #[error("corruption: {0}")]
    Corruption(String),
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
}

impl ScanError {
    pub fn end_of_file(msg: impl Into<String>) -> Self {
        Self::EndOfFile(msg.into())
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    pub fn is_end_of_file(&self) -> bool {
        matches!(self, Self::EndOfFile(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

impl From<arrow::error::ArrowError> for ScanError {
    fn from(err: arrow::error::ArrowError) -> Self {
        Self::InternalError(format!("arrow: {err}"))
    }
}

pub type ScanResult<T> = Result<T, ScanError>;

/// Unit status, `Ok(())` being the success value.
pub type Status = ScanResult<()>;
