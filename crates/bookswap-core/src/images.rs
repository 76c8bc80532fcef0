// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cover image storage.
//!
//! Uploaded images are written under a single directory with a random name.
//! Files are not part of any database transaction: a file written for an
//! approval that later fails stays on disk.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::CoreError;

/// Extension used when the uploaded file name has none.
const DEFAULT_EXTENSION: &str = ".jpg";

/// Directory-backed image store.
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    /// Store images under `root` (created on first write).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory images are written to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a stored image.
    pub fn path_of(&self, image_name: &str) -> PathBuf {
        self.root.join(image_name)
    }

    /// Random file name keeping the lower-cased extension of `original_filename`.
    pub fn image_name(original_filename: &str) -> String {
        let suffix = Path::new(original_filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty())
            .map(|ext| format!(".{}", ext.to_lowercase()))
            .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
        format!("{}{}", Uuid::new_v4().simple(), suffix)
    }

    /// Write `bytes` and return the stored image name.
    pub async fn save(&self, original_filename: &str, bytes: &[u8]) -> Result<String, CoreError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| CoreError::Storage {
                path: self.root.display().to_string(),
                details: e.to_string(),
            })?;

        let name = Self::image_name(original_filename);
        let path = self.path_of(&name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| CoreError::Storage {
                path: path.display().to_string(),
                details: e.to_string(),
            })?;

        Ok(name)
    }
}
