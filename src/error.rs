// Copyright 2021 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

use std::io::Error as IoError;
use thiserror::Error;

/// Specialisation of `std::Result` for this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors which can arise while retrieving, decrypting or reassembling a segmented file.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The requested file is neither in the package nor in the attached directory.
    #[error("File not found: {0}")]
    NotFound(String),
    /// A remote call for a part failed (network, authentication or server error).
    #[error("Transport error: {0}")]
    Transport(String),
    /// A part could not be decrypted, usually a wrong key or corrupt ciphertext.
    #[error("Decryption error: {0}")]
    Decryption(String),
    /// An argument handed to a stream or the engine was out of range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// A part buffer could not be reserved at the configured segment size.
    #[error("Allocation of {0} bytes failed")]
    Allocation(usize),
    /// The retrieval was cancelled before it completed.
    #[error("Retrieval cancelled")]
    Cancelled,
    /// No endpoint template is registered under this operation name.
    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(String),
    /// A lock guarding a progress counter was poisoned by a panicking worker.
    #[error("Lock poisoned")]
    Poison,
    /// Failure of the underlying file or stream.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),
    /// Anything else.
    #[error("Generic error {0}")]
    Generic(String),
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Error::Poison
    }
}
