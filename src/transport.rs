// Copyright 2021 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The request body and the transport seam part requests go through.

use crate::{Endpoint, Result};
use serde::{Deserialize, Serialize};
use std::{io::Read, sync::Arc};

/// Body of a single part request.
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    /// Name of the calling API, reported to the server.
    pub api: String,
    /// Checksum token derived from the package secrets.
    pub checksum: String,
    /// Index of the part to fetch, starting at 1.
    pub part: usize,
    /// Package password, for packages that require one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Authenticated session able to perform remote calls.
///
/// The engine calls `call` from several worker threads at once. Failures should be reported as
/// [`Error::Transport`](crate::Error::Transport); retries and timeouts are the transport's
/// business, and any error returned here aborts the whole retrieval.
pub trait Transport: Send + Sync {
    /// Sends `request` to `endpoint` and returns the response body, to be read to exhaustion.
    fn call(&self, endpoint: &Endpoint, request: &DownloadRequest) -> Result<Box<dyn Read + Send>>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn call(&self, endpoint: &Endpoint, request: &DownloadRequest) -> Result<Box<dyn Read + Send>> {
        (**self).call(endpoint, request)
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn call(&self, endpoint: &Endpoint, request: &DownloadRequest) -> Result<Box<dyn Read + Send>> {
        (**self).call(endpoint, request)
    }
}
