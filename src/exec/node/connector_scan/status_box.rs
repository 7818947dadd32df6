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

use crate::common::status::{ScanError, Status};

/// Shared scan status where the first failure wins.
///
/// Starts as `Ok(())`. Only the first non-ok update is kept; later updates, ok or
/// not, are discarded.
#[derive(Debug)]
pub struct StatusBox {
    status: Mutex<Status>,
}

impl StatusBox {
    pub fn new() -> Self {
        Self {
            status: Mutex::new(Ok(())),
        }
    }

    /// Returns true if `status` was recorded.
    pub fn update(&self, status: &Status) -> bool {
        let Err(err) = status else {
            return false;
        };
        let mut guard = self.status.lock().expect("scan status lock");
        if guard.is_ok() {
            *guard = Err(err.clone());
            return true;
        }
        false
    }

    pub fn update_error(&self, err: ScanError) -> bool {
        self.update(&Err(err))
    }

    pub fn get(&self) -> Status {
        self.status.lock().expect("scan status lock").clone()
    }

    pub fn is_ok(&self) -> bool {
        self.status.lock().expect("scan status lock").is_ok()
    }
}

impl Default for StatusBox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn first_error_wins() {
        let status = StatusBox::new();
        assert!(status.get().is_ok());
        assert!(!status.update(&Ok(())));
        assert!(status.update_error(ScanError::IoError("first".to_string())));
        assert!(!status.update_error(ScanError::IoError("second".to_string())));
        assert!(!status.update(&Ok(())));
        assert_eq!(
            status.get(),
            Err(ScanError::IoError("first".to_string()))
        );
    }

    #[test]
    fn racing_writers_keep_exactly_one_error() {
        let status = Arc::new(StatusBox::new());
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let status = Arc::clone(&status);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    status.update_error(ScanError::IoError(format!("worker {i}")))
                })
            })
            .collect();
        let winners: Vec<bool> = handles
            .into_iter()
            .map(|h| h.join().expect("writer"))
            .collect();
        assert_eq!(winners.iter().filter(|w| **w).count(), 1);
        let winner = winners.iter().position(|w| *w).expect("one winner");
        assert_eq!(
            status.get(),
            Err(ScanError::IoError(format!("worker {winner}")))
        );
    }
}
