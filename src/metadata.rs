// Copyright 2021 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Package, directory and file descriptors, and file lookup.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Formatter};

/// A file stored as `parts` independently encrypted segments.
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    /// Identifier used in part requests.
    pub file_id: String,
    /// Name the file was uploaded under.
    pub file_name: String,
    /// Plaintext size in bytes as declared by the server.
    pub file_size: u64,
    /// Number of encrypted parts, numbered from 1.
    pub parts: usize,
}

impl FileInfo {
    /// Describes a file of `file_size` bytes stored in `parts` segments.
    pub fn new(
        file_id: impl Into<String>,
        file_name: impl Into<String>,
        file_size: u64,
        parts: usize,
    ) -> Self {
        Self {
            file_id: file_id.into(),
            file_name: file_name.into(),
            file_size,
            parts,
        }
    }
}

/// A package: the secrets shared by all of its files, and the files themselves.
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct PackageInfo {
    /// Identifier used in part requests.
    pub package_id: String,
    /// Package code, the salt of the checksum token.
    pub package_code: String,
    /// Client-held secret, part of both the checksum token and the decryption key.
    pub key_code: String,
    /// Server-held secret, the other half of the decryption key.
    pub server_secret: String,
    /// Files attached directly to the package.
    #[serde(default)]
    pub files: Vec<FileInfo>,
}

impl Debug for PackageInfo {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        formatter
            .debug_struct("PackageInfo")
            .field("package_id", &self.package_id)
            .field("package_code", &"<redacted>")
            .field("key_code", &"<redacted>")
            .field("server_secret", &"<redacted>")
            .field("files", &self.files)
            .finish()
    }
}

/// A directory of a workspace package, carrying its own file listing.
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryInfo {
    /// Identifier used in part requests.
    pub directory_id: String,
    /// Files in this directory.
    #[serde(default)]
    pub files: Vec<FileInfo>,
}

/// Finds `file_id` in the package's files, then in the directory's files.
pub fn locate_file(
    package: &PackageInfo,
    directory: Option<&DirectoryInfo>,
    file_id: &str,
) -> Result<FileInfo> {
    package
        .files
        .iter()
        .chain(directory.into_iter().flat_map(|dir| dir.files.iter()))
        .find(|file| file.file_id == file_id)
        .cloned()
        .ok_or_else(|| Error::NotFound(file_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package() -> PackageInfo {
        PackageInfo {
            package_id: "pkg".into(),
            package_code: "code".into(),
            key_code: "key".into(),
            server_secret: "secret".into(),
            files: vec![FileInfo::new("a", "a.bin", 10, 1)],
        }
    }

    #[test]
    fn package_files_are_searched_first() -> Result<()> {
        let directory = DirectoryInfo {
            directory_id: "dir".into(),
            files: vec![FileInfo::new("a", "shadowed.bin", 99, 9)],
        };
        let found = locate_file(&package(), Some(&directory), "a")?;
        assert_eq!(found.file_name, "a.bin");
        Ok(())
    }

    #[test]
    fn directory_is_the_fallback() -> Result<()> {
        let directory = DirectoryInfo {
            directory_id: "dir".into(),
            files: vec![FileInfo::new("b", "b.bin", 20, 2)],
        };
        let found = locate_file(&package(), Some(&directory), "b")?;
        assert_eq!(found.parts, 2);
        Ok(())
    }

    #[test]
    fn missing_everywhere_is_not_found() {
        let result = locate_file(&package(), None, "b");
        assert!(matches!(result, Err(Error::NotFound(id)) if id == "b"));
    }

    #[test]
    fn wire_names_are_camel_case() -> serde_json::Result<()> {
        let json = r#"{"fileId":"f1","fileName":"report.pdf","fileSize":42,"parts":3}"#;
        let file: FileInfo = serde_json::from_str(json)?;
        assert_eq!(file, FileInfo::new("f1", "report.pdf", 42, 3));

        let package: PackageInfo = serde_json::from_str(
            r#"{"packageId":"p","packageCode":"c","keyCode":"k","serverSecret":"s"}"#,
        )?;
        assert!(package.files.is_empty());
        assert!(!format!("{package:?}").contains("\"s\""));
        Ok(())
    }
}
