// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for KeyFS Core

use crate::store::StoreError;

/// Core filesystem error type
#[derive(thiserror::Error, Debug)]
pub enum FsError {
    #[error("not found")]
    NotFound,
    /// The store refused a commit. Validation failures, read-only keys and
    /// permission problems all land here undifferentiated; the reason string
    /// is whatever the store reported.
    #[error("write rejected: {0}")]
    WriteRejected(String),
    #[error("directory not empty")]
    NotEmpty,
    #[error("no attribute data")]
    NoAttributeData,
    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for FsError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Rejected(reason) => FsError::WriteRejected(reason),
            other => FsError::Store(other),
        }
    }
}

pub type FsResult<T> = Result<T, FsError>;
