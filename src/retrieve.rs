// Copyright 2021 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Concurrent fetch, decryption and ordered reassembly of a segmented file.

use crate::{
    endpoint::{DOWNLOAD_FILE, DOWNLOAD_FILE_FROM_DIRECTORY},
    metadata::locate_file,
    progress::StageCounter,
    BlockStream, DataStream, DecryptionKey, DirectoryInfo, DownloadRequest, Endpoint,
    EndpointTable, Error, FileInfo, NoProgress, PackageInfo, PartCipher, Progress,
    ProgressStream, Result, RetrievalConfig, Transport,
};
use bytes::Bytes;
use rayon::prelude::*;
use std::{
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tracing::{debug, info, warn};

/// Progress stage reported while parts are fetched.
pub const DOWNLOADING: &str = "Downloading Parts";
/// Progress stage reported while parts are decrypted.
pub const DECRYPTING: &str = "Decrypting";
/// Progress stage reported while plaintext is written to the destination.
pub const WRITING: &str = "Writing";

/// Shared flag that aborts a retrieval in progress.
///
/// Clones observe the same flag. Workers check it before starting on a part and the engine
/// checks it between batches; a cancelled retrieval fails with [`Error::Cancelled`] and
/// produces no destination.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// A token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of every retrieval holding this token.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

struct FetchedPart {
    index: usize,
    ciphertext: Bytes,
}

struct DecryptedPart {
    index: usize,
    plaintext: Bytes,
}

/// Everything derived once per retrieval and shared read-only by the workers.
struct Prepared {
    file: FileInfo,
    endpoint: Endpoint,
    checksum: String,
    key: DecryptionKey,
}

/// Retrieves files of one package: fetches their encrypted parts through a [`Transport`],
/// decrypts them with a [`PartCipher`] and writes the plaintext, in part order, into a file or
/// a [`BlockStream`].
///
/// Parts are handled in batches of [`RetrievalConfig::parts_per_batch`]. Within a batch every
/// part is fetched on the worker pool, then every part is decrypted, then the plaintext is
/// written out in ascending part order, so at most one batch is held in memory whatever the
/// file size. Any failure aborts the retrieval once the in-flight workers have finished and
/// nothing is handed back.
pub struct SegmentedRetrieval<T, C> {
    transport: T,
    cipher: C,
    package: PackageInfo,
    directory: Option<DirectoryInfo>,
    password: Option<String>,
    progress: Arc<dyn Progress>,
    endpoints: EndpointTable,
    config: RetrievalConfig,
    cancellation: CancellationToken,
}

impl<T: Transport, C: PartCipher> SegmentedRetrieval<T, C> {
    /// Creates an engine for the files of `package`.
    pub fn new(transport: T, cipher: C, package: PackageInfo) -> Self {
        Self {
            transport,
            cipher,
            package,
            directory: None,
            password: None,
            progress: Arc::new(NoProgress),
            endpoints: EndpointTable::default(),
            config: RetrievalConfig::default(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Also looks files up in `directory`, and fetches parts through the directory endpoint.
    pub fn with_directory(mut self, directory: DirectoryInfo) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Sends `password` with every part request.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Reports progress to `progress`.
    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    /// Replaces the endpoint templates.
    pub fn with_endpoints(mut self, endpoints: EndpointTable) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Replaces the tunables.
    pub fn with_config(mut self, config: RetrievalConfig) -> Self {
        self.config = config;
        self
    }

    /// Aborts retrievals when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// The token cancelling this engine's retrievals.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Retrieves `file_id` into the file at `output`.
    ///
    /// The plaintext is written to a temporary file next to `output` which is renamed onto
    /// `output` only once every part has been written; on failure the temporary file is removed
    /// and `output` is left untouched.
    pub fn download_file(&self, file_id: &str, output: &Path) -> Result<PathBuf> {
        let prepared = self.prepare(file_id)?;
        let parent = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut temp = tempfile::Builder::new()
            .prefix(".retrieval-")
            .suffix(".part")
            .tempfile_in(parent)?;

        let written = self
            .reassemble(&prepared, temp.as_file_mut())
            .inspect_err(|error| warn!(file_id, %error, "retrieval to file failed"))?;
        temp.as_file().sync_all()?;
        let _file = temp.persist(output).map_err(|error| Error::Io(error.error))?;

        info!(file_id, bytes = written, output = %output.display(), "file retrieved");
        Ok(output.to_path_buf())
    }

    /// Retrieves `file_id` into `dir`, named after the file's own name.
    pub fn download_file_to_dir(&self, file_id: &str, dir: &Path) -> Result<PathBuf> {
        let file = self.locate(file_id)?;
        let name = Path::new(&file.file_name).file_name().ok_or_else(|| {
            Error::InvalidArgument(format!("unusable file name {:?}", file.file_name))
        })?;
        self.download_file(file_id, &dir.join(name))
    }

    /// Retrieves `file_id` into memory, positioned at its first byte.
    pub fn download_stream(&self, file_id: &str) -> Result<BlockStream> {
        let prepared = self.prepare(file_id)?;
        let mut stream = BlockStream::with_capacity(prepared.file.file_size)?;

        let written = self
            .reassemble(&prepared, &mut stream)
            .inspect_err(|error| warn!(file_id, %error, "retrieval to stream failed"))?;
        stream.set_len(written);
        let _ = stream.seek(SeekFrom::Start(0))?;

        info!(file_id, bytes = written, "file retrieved into memory");
        Ok(stream)
    }

    /// Looks `file_id` up in the package, then in the directory.
    pub fn locate(&self, file_id: &str) -> Result<FileInfo> {
        locate_file(&self.package, self.directory.as_ref(), file_id)
    }

    fn prepare(&self, file_id: &str) -> Result<Prepared> {
        self.config.validate()?;
        let file = self.locate(file_id)?;
        let endpoint = self.endpoint(file_id)?;
        let checksum = self.cipher.derive_checksum(
            &self.package.key_code,
            &self.package.package_code,
            self.config.checksum_iterations,
        )?;
        let key = DecryptionKey::new(&self.package.server_secret, &self.package.key_code);
        info!(
            file_id,
            parts = file.parts,
            size = file.file_size,
            "retrieving file"
        );
        Ok(Prepared {
            file,
            endpoint,
            checksum,
            key,
        })
    }

    fn endpoint(&self, file_id: &str) -> Result<Endpoint> {
        let package_id = self.package.package_id.as_str();
        match &self.directory {
            Some(directory) => self.endpoints.resolve(
                DOWNLOAD_FILE_FROM_DIRECTORY,
                &[
                    ("packageId", package_id),
                    ("fileId", file_id),
                    ("directoryId", directory.directory_id.as_str()),
                ],
            ),
            None => self.endpoints.resolve(
                DOWNLOAD_FILE,
                &[("packageId", package_id), ("fileId", file_id)],
            ),
        }
    }

    /// Runs the fetch and decrypt stages batch by batch and writes each batch in part order.
    /// Returns the number of plaintext bytes written.
    fn reassemble<S: DataStream>(&self, prepared: &Prepared, destination: S) -> Result<u64> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.max_workers)
            .thread_name(|i| format!("retrieval-worker-{i}"))
            .build()
            .map_err(|e| Error::Generic(format!("Failed to build worker pool: {e}")))?;

        let total_parts = prepared.file.parts;
        let sink = &*self.progress;
        let fetched = StageCounter::new(DOWNLOADING, total_parts, sink);
        let decrypted = StageCounter::new(DECRYPTING, total_parts, sink);
        let mut writer = ProgressStream::new(
            destination,
            self.progress.clone(),
            WRITING,
            prepared.file.file_size,
            0.0,
        )
        .with_interval(self.config.progress_interval);

        if total_parts == 0 {
            fetched.report()?;
            decrypted.report()?;
        }

        let indices: Vec<usize> = (1..=total_parts).collect();
        let mut written = 0;
        for (batch_number, batch) in indices.chunks(self.config.parts_per_batch).enumerate() {
            self.cancellation.check()?;
            debug!(
                first = batch[0],
                last = batch[batch.len() - 1],
                "fetching batch"
            );

            let parts = pool.install(|| self.fetch_parts(prepared, batch, &fetched))?;
            if batch_number == 0 {
                decrypted.report()?;
            }
            let mut parts = pool.install(|| self.decrypt_parts(prepared, parts, &decrypted))?;
            parts.sort_unstable_by_key(|part| part.index);

            for part in parts {
                writer.write_all(&part.plaintext)?;
                written += part.plaintext.len() as u64;
            }
        }
        writer.flush()?;
        sink.update(WRITING, 100.0);

        if written != prepared.file.file_size {
            warn!(
                declared = prepared.file.file_size,
                actual = written,
                "plaintext size differs from the declared file size"
            );
        }
        Ok(written)
    }

    fn fetch_parts(
        &self,
        prepared: &Prepared,
        batch: &[usize],
        counter: &StageCounter<'_>,
    ) -> Result<Vec<FetchedPart>> {
        batch
            .par_iter()
            .map(|&index| {
                let part = self.fetch_part(prepared, index)?;
                counter.advance()?;
                Ok(part)
            })
            .collect()
    }

    fn fetch_part(&self, prepared: &Prepared, index: usize) -> Result<FetchedPart> {
        self.cancellation.check()?;
        let request = DownloadRequest {
            api: self.config.api.clone(),
            checksum: prepared.checksum.clone(),
            part: index,
            password: self.password.clone(),
        };

        let capacity = self.cipher.ciphertext_len(self.config.segment_size);
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(capacity)
            .map_err(|_| Error::Allocation(capacity))?;

        let response = self
            .transport
            .call(&prepared.endpoint, &request)
            .inspect_err(|error| warn!(part = index, %error, "part request failed"))?;
        read_part(response, &mut buffer)
            .map_err(|e| Error::Transport(format!("Failed to read part {index}: {e}")))?;

        debug!(part = index, bytes = buffer.len(), "part fetched");
        Ok(FetchedPart {
            index,
            ciphertext: Bytes::from(buffer),
        })
    }

    fn decrypt_parts(
        &self,
        prepared: &Prepared,
        parts: Vec<FetchedPart>,
        counter: &StageCounter<'_>,
    ) -> Result<Vec<DecryptedPart>> {
        parts
            .into_par_iter()
            .map(|part| {
                self.cancellation.check()?;
                let plaintext = self
                    .cipher
                    .decrypt(&part.ciphertext, &prepared.key)
                    .inspect_err(|error| warn!(part = part.index, %error, "part decryption failed"))?;
                counter.advance()?;
                Ok(DecryptedPart {
                    index: part.index,
                    plaintext,
                })
            })
            .collect()
    }
}

/// Reads a response body to exhaustion into `buffer`, which only grows if the body is larger
/// than its reserved capacity.
fn read_part(mut response: impl Read, buffer: &mut Vec<u8>) -> std::io::Result<usize> {
    response.read_to_end(buffer)
}
