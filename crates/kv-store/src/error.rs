use std::path::{Path, PathBuf};

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error on {path:?} ({source})")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Store directory {0:?} does not exist")]
    NotFound(PathBuf),
    #[error("{0:?} is not a directory")]
    NotADirectory(PathBuf),
    #[error("Store {0:?} is locked by another process. Remove the LOCK file if no other process uses it.")]
    Locked(PathBuf),
    #[error("Table {file:?} is corrupted ({reason})")]
    Corrupted { file: PathBuf, reason: Box<str> },
    #[error("Checksum mismatch in block {block} of {file:?}. The data is corrupted.")]
    ChecksumMismatch { file: PathBuf, block: usize },
    #[error("Table {file:?} uses schema version {found}, but the max supported version is {supported}")]
    UnsupportedVersion {
        file: PathBuf,
        found: u8,
        supported: u8,
    },
    #[error("Invalid argument ({0})")]
    InvalidArgument(Box<str>),
    #[error("The store is opened read-only")]
    ReadOnly,
}

impl StoreError {
    pub(crate) fn io(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
        move |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Failure while decoding bytes that are not yet attributed to a file.
#[derive(Debug)]
pub(crate) enum DecodeError {
    ChecksumMismatch,
    Invalid(Box<str>),
}

impl DecodeError {
    pub(crate) fn invalid(reason: &str) -> Self {
        DecodeError::Invalid(reason.into())
    }

    pub(crate) fn in_block(self, file: &Path, block: usize) -> StoreError {
        match self {
            DecodeError::ChecksumMismatch => StoreError::ChecksumMismatch {
                file: file.to_path_buf(),
                block,
            },
            DecodeError::Invalid(reason) => StoreError::Corrupted {
                file: file.to_path_buf(),
                reason: format!("block {}: {}", block, reason).into(),
            },
        }
    }

    pub(crate) fn in_table(self, file: &Path) -> StoreError {
        match self {
            DecodeError::ChecksumMismatch => StoreError::Corrupted {
                file: file.to_path_buf(),
                reason: "block meta checksum mismatch".into(),
            },
            DecodeError::Invalid(reason) => StoreError::Corrupted {
                file: file.to_path_buf(),
                reason,
            },
        }
    }
}
