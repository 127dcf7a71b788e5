// Copyright 2021 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Tunables of a retrieval and their defaults.

use crate::{progress::PROGRESS_INTERVAL, Error, Result};
use serde::{Deserialize, Serialize};
use std::{num::NonZeroUsize, thread, time::Duration};

/// Plaintext size of one full part as produced by the uploader, defined as 2.5MB.
pub const SEGMENT_SIZE: usize = 2_621_440;
/// Iterations of the checksum token derivation.
pub const CHECKSUM_ITERATIONS: u32 = 1024;
/// Parts held in memory at once, counting both ciphertext and plaintext.
pub const PARTS_PER_BATCH: usize = 16;
/// API name sent with every part request.
pub const DEFAULT_API: &str = "RUST_API";

/// Tunables of a retrieval.
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Threads in the worker pool shared by the fetch and decrypt stages.
    pub max_workers: usize,
    /// Consecutive parts fetched and decrypted before they are written out in order.
    pub parts_per_batch: usize,
    /// Plaintext size of a full part; part buffers reserve the cipher's encrypted size of it.
    pub segment_size: usize,
    /// Cost parameter of the checksum token derivation.
    pub checksum_iterations: u32,
    /// Minimum time between two callbacks while writing the destination.
    pub progress_interval: Duration,
    /// API name reported to the server.
    pub api: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_workers: thread::available_parallelism().map_or(4, NonZeroUsize::get),
            parts_per_batch: PARTS_PER_BATCH,
            segment_size: SEGMENT_SIZE,
            checksum_iterations: CHECKSUM_ITERATIONS,
            progress_interval: PROGRESS_INTERVAL,
            api: DEFAULT_API.to_string(),
        }
    }
}

impl RetrievalConfig {
    /// Sets the worker pool size.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Sets how many parts are in flight between two ordered writes.
    pub fn with_parts_per_batch(mut self, parts_per_batch: usize) -> Self {
        self.parts_per_batch = parts_per_batch;
        self
    }

    /// Sets the plaintext size of a full part.
    pub fn with_segment_size(mut self, segment_size: usize) -> Self {
        self.segment_size = segment_size;
        self
    }

    /// Sets the checksum derivation cost.
    pub fn with_checksum_iterations(mut self, iterations: u32) -> Self {
        self.checksum_iterations = iterations;
        self
    }

    /// Sets the minimum time between two progress callbacks of the write stage.
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Sets the API name sent with each request.
    pub fn with_api(mut self, api: impl Into<String>) -> Self {
        self.api = api.into();
        self
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(Error::InvalidArgument("max_workers must be at least 1".into()));
        }
        if self.parts_per_batch == 0 {
            return Err(Error::InvalidArgument(
                "parts_per_batch must be at least 1".into(),
            ));
        }
        if self.checksum_iterations == 0 {
            return Err(Error::InvalidArgument(
                "checksum_iterations must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
