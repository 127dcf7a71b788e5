// Copyright 2021 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Retrieval of files stored as independently encrypted parts.
//!
//! A file in a package is uploaded as `N` parts, each encrypted on its own with key material
//! shared by the whole package. This library fetches the parts concurrently through a
//! caller-supplied [`Transport`], decrypts them in parallel with a [`PartCipher`], and writes
//! the plaintext back together in part order, either into a file or into an in-memory
//! [`BlockStream`].
//!
//! Work is spread over a bounded pool of worker threads and progresses batch by batch, so no
//! more than [`RetrievalConfig::parts_per_batch`] parts are held in memory at once. Progress is
//! reported per stage to a [`Progress`] sink; the write stage goes through a
//! [`ProgressStream`], which throttles its callbacks by time.
//!
//! # Use
//!
//! The caller provides the package metadata (its secrets and file listing), a [`Transport`]
//! able to perform authenticated remote calls, and a [`PartCipher`]. [`AesPartCipher`] is the
//! AES-128-CBC implementation.
//!
//! # Examples
//!
//! ```
//! use segmented_retrieval::{
//!     test_helpers::fixture, AesPartCipher, RetrievalConfig, SegmentedRetrieval,
//! };
//! use std::io::Read;
//!
//! fn main() -> segmented_retrieval::Result<()> {
//!     // A 10kB file stored as three parts, served from memory.
//!     let (package, plaintext, server) = fixture("report", 10_000, 4_096)?;
//!
//!     let engine = SegmentedRetrieval::new(server, AesPartCipher, package)
//!         .with_config(RetrievalConfig::default().with_max_workers(2));
//!     let mut stream = engine.download_stream("report")?;
//!
//!     let mut content = Vec::new();
//!     let _ = stream.read_to_end(&mut content)?;
//!     assert_eq!(content, plaintext.to_vec());
//!     Ok(())
//! }
//! ```

#![doc(test(attr(deny(warnings))))]
// For explanation of lint checks, run `rustc -W help`.
#![forbid(
    arithmetic_overflow,
    mutable_transmutes,
    no_mangle_const_items,
    unknown_crate_types,
    unsafe_code
)]
#![deny(
    bad_style,
    improper_ctypes,
    non_shorthand_field_patterns,
    overflowing_literals,
    unconditional_recursion,
    unused_allocation,
    unused_comparisons,
    unused_parens,
    while_true
)]
#![warn(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![allow(
    missing_copy_implementations,
    missing_debug_implementations,
    variant_size_differences
)]

mod aes;
mod block_stream;
mod config;
mod endpoint;
mod error;
mod metadata;
mod progress;
mod retrieve;
mod stream;
pub mod test_helpers;
mod transport;

pub use self::{
    aes::{AesPartCipher, DecryptionKey, PartCipher},
    block_stream::{BlockStream, BLOCK_SIZE},
    config::{RetrievalConfig, CHECKSUM_ITERATIONS, DEFAULT_API, PARTS_PER_BATCH, SEGMENT_SIZE},
    endpoint::{Endpoint, EndpointTable, Method, DOWNLOAD_FILE, DOWNLOAD_FILE_FROM_DIRECTORY},
    error::{Error, Result},
    metadata::{locate_file, DirectoryInfo, FileInfo, PackageInfo},
    progress::{NoProgress, Progress, ProgressStream, TracingProgress, PROGRESS_INTERVAL},
    retrieve::{CancellationToken, SegmentedRetrieval, DECRYPTING, DOWNLOADING, WRITING},
    stream::DataStream,
    transport::{DownloadRequest, Transport},
};
