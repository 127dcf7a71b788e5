// Copyright 2021 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

#![doc(hidden)]

use crate::{
    AesPartCipher, DecryptionKey, DownloadRequest, Endpoint, Error, FileInfo, PackageInfo,
    Progress, Result, Transport,
};
use bytes::Bytes;
use rand::{self, Rng};
use std::{
    collections::HashMap,
    io::{Cursor, Read},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    thread,
    time::Duration,
};

/// Generates random bytes using provided `size`.
pub fn random_bytes(size: usize) -> Bytes {
    let mut bytes = vec![0u8; size];
    rand::thread_rng().fill(bytes.as_mut_slice());
    Bytes::from(bytes)
}

/// Records every progress update in arrival order.
#[derive(Default, Debug)]
pub struct RecordingProgress {
    updates: Mutex<Vec<(String, f64)>>,
}

impl RecordingProgress {
    /// All updates so far.
    pub fn updates(&self) -> Vec<(String, f64)> {
        self.updates
            .lock()
            .map(|updates| updates.clone())
            .unwrap_or_default()
    }

    /// The percentages reported for `stage`, in arrival order.
    pub fn stage(&self, stage: &str) -> Vec<f64> {
        self.updates()
            .into_iter()
            .filter(|(name, _)| name == stage)
            .map(|(_, percentage)| percentage)
            .collect()
    }
}

impl Progress for RecordingProgress {
    fn update(&self, stage: &str, percentage: f64) {
        if let Ok(mut updates) = self.updates.lock() {
            updates.push((stage.to_string(), percentage));
        }
    }
}

/// In-memory stand-in for the remote part store.
///
/// Serves pre-encrypted parts by index, optionally after a random delay so completions arrive
/// out of order, and keeps a log of every request along with the peak number of concurrent
/// calls.
#[derive(Debug)]
pub struct SegmentServer {
    parts: HashMap<usize, Bytes>,
    failing_part: Option<usize>,
    expected_checksum: Option<String>,
    max_delay: Duration,
    requests: Mutex<Vec<(Endpoint, DownloadRequest)>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl SegmentServer {
    /// Serves `parts[i]` as part `i + 1`.
    pub fn new(parts: Vec<Bytes>) -> Self {
        Self {
            parts: parts
                .into_iter()
                .enumerate()
                .map(|(i, part)| (i + 1, part))
                .collect(),
            failing_part: None,
            expected_checksum: None,
            max_delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Fails every request for `part`.
    pub fn failing_on(mut self, part: usize) -> Self {
        self.failing_part = Some(part);
        self
    }

    /// Rejects requests not carrying `checksum`.
    pub fn expecting_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.expected_checksum = Some(checksum.into());
        self
    }

    /// Delays each response by a random duration up to `max_delay`.
    pub fn with_jitter(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Replaces the stored bytes of `part`.
    pub fn replace_part(&mut self, part: usize, content: Bytes) {
        let _ = self.parts.insert(part, content);
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<(Endpoint, DownloadRequest)> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    /// The largest number of calls that were in progress at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn serve(&self, request: &DownloadRequest) -> Result<Bytes> {
        if let Some(expected) = &self.expected_checksum {
            if &request.checksum != expected {
                return Err(Error::Transport("401 checksum rejected".to_string()));
            }
        }
        if !self.max_delay.is_zero() {
            let micros = self.max_delay.as_micros() as u64;
            thread::sleep(Duration::from_micros(
                rand::thread_rng().gen_range(0..=micros),
            ));
        }
        if self.failing_part == Some(request.part) {
            return Err(Error::Transport(format!("503 part {} unavailable", request.part)));
        }
        self.parts
            .get(&request.part)
            .cloned()
            .ok_or_else(|| Error::Transport(format!("404 no part {}", request.part)))
    }
}

impl Transport for SegmentServer {
    fn call(&self, endpoint: &Endpoint, request: &DownloadRequest) -> Result<Box<dyn Read + Send>> {
        self.requests
            .lock()
            .map_err(|_| Error::Poison)?
            .push((endpoint.clone(), request.clone()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let served = self.serve(request);
        let _ = self.in_flight.fetch_sub(1, Ordering::SeqCst);

        Ok(Box::new(Cursor::new(served?)))
    }
}

/// Secrets of the fixture package.
pub fn package(files: Vec<FileInfo>) -> PackageInfo {
    PackageInfo {
        package_id: "pkg-0001".to_string(),
        package_code: "package-code".to_string(),
        key_code: "key-code".to_string(),
        server_secret: "server-secret".to_string(),
        files,
    }
}

/// The key `package` decrypts with.
pub fn package_key(package: &PackageInfo) -> DecryptionKey {
    DecryptionKey::new(&package.server_secret, &package.key_code)
}

/// Splits `plaintext` into parts of `part_size` bytes and encrypts each one separately.
pub fn encrypt_parts(plaintext: &[u8], part_size: usize, key: &DecryptionKey) -> Result<Vec<Bytes>> {
    if part_size == 0 {
        return Err(Error::InvalidArgument("part size must be at least 1".into()));
    }
    plaintext
        .chunks(part_size)
        .map(|part| AesPartCipher.encrypt(part, key))
        .collect()
}

/// A package holding one random file `file_id` of `size` bytes in parts of `part_size` bytes,
/// the file's plaintext, and a server holding its encrypted parts.
pub fn fixture(
    file_id: &str,
    size: usize,
    part_size: usize,
) -> Result<(PackageInfo, Bytes, SegmentServer)> {
    let plaintext = random_bytes(size);
    let mut package = package(vec![]);
    let parts = encrypt_parts(&plaintext, part_size, &package_key(&package))?;
    package.files.push(FileInfo::new(
        file_id,
        format!("{file_id}.bin"),
        size as u64,
        parts.len(),
    ));
    Ok((package, plaintext, SegmentServer::new(parts)))
}
