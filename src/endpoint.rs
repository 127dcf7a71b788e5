// Copyright 2021 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Named request templates and their resolution into concrete endpoints.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Template name for downloading a part of a file attached to a package.
pub const DOWNLOAD_FILE: &str = "downloadFile";
/// Template name for downloading a part of a file inside a package directory.
pub const DOWNLOAD_FILE_FROM_DIRECTORY: &str = "downloadFileFromDirectory";

/// HTTP verb of an endpoint.
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Debug)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
}

/// A fully resolved request descriptor.
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct Endpoint {
    /// Verb used for the call.
    pub method: Method,
    /// Path with every `{placeholder}` substituted.
    pub path: String,
    /// MIME type of the request body.
    pub content_type: String,
}

/// Lookup of endpoint templates by operation name.
#[derive(Clone, Debug)]
pub struct EndpointTable {
    templates: HashMap<String, Endpoint>,
}

impl Default for EndpointTable {
    fn default() -> Self {
        let mut table = Self::empty();
        table.insert(
            DOWNLOAD_FILE,
            Endpoint {
                method: Method::Post,
                path: "/package/{packageId}/file/{fileId}/download/".to_string(),
                content_type: "application/json".to_string(),
            },
        );
        table.insert(
            DOWNLOAD_FILE_FROM_DIRECTORY,
            Endpoint {
                method: Method::Post,
                path: "/package/{packageId}/directory/{directoryId}/file/{fileId}/download/"
                    .to_string(),
                content_type: "application/json".to_string(),
            },
        );
        table
    }
}

impl EndpointTable {
    /// A table with no templates.
    pub fn empty() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    /// Registers (or replaces) the template for `name`.
    pub fn insert(&mut self, name: impl Into<String>, template: Endpoint) {
        let _ = self.templates.insert(name.into(), template);
    }

    /// Resolves the template `name`, substituting each `(key, value)` for `{key}` in the path.
    ///
    /// Fails with [`Error::UnknownEndpoint`] if no template is registered under `name`, and
    /// with [`Error::InvalidArgument`] if a placeholder of the template has no value. Values
    /// are inserted verbatim and never scanned for placeholders themselves.
    pub fn resolve(&self, name: &str, params: &[(&str, &str)]) -> Result<Endpoint> {
        let template = self
            .templates
            .get(name)
            .ok_or_else(|| Error::UnknownEndpoint(name.to_string()))?;

        let mut path = String::with_capacity(template.path.len());
        let mut rest = template.path.as_str();
        while let Some(open) = rest.find('{') {
            path.push_str(&rest[..open]);
            let close = rest[open..].find('}').map(|i| open + i).ok_or_else(|| {
                Error::InvalidArgument(format!("unterminated placeholder in {name}"))
            })?;
            let key = &rest[open + 1..close];
            let value = params
                .iter()
                .find(|(param, _)| *param == key)
                .map(|(_, value)| *value)
                .ok_or_else(|| {
                    Error::InvalidArgument(format!("no value for {{{key}}} in {name}"))
                })?;
            path.push_str(value);
            rest = &rest[close + 1..];
        }
        path.push_str(rest);

        Ok(Endpoint {
            path,
            ..template.clone()
        })
    }
}
