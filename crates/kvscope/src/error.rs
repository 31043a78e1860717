use std::path::PathBuf;

use kvscope_store::StoreError;
use thiserror::Error;

/// A cursor failure during a scan. Wraps the backend's error type.
#[derive(Error, Debug)]
#[error("Scan failed")]
pub struct ScanError {
    #[source]
    source: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl ScanError {
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            source: Box::new(error),
        }
    }

    /// The backend error that stopped the scan.
    pub fn backend(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        &*self.source
    }

    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.source.downcast_ref()
    }
}

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("Cannot open store at {}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: StoreError,
    },
    #[error("Error while scanning for top prefixes")]
    TopPrefixes(#[source] ScanError),
    #[error("Error analyzing prefix '{prefix}'")]
    Prefix {
        prefix: String,
        #[source]
        source: ScanError,
    },
    #[error("Cannot write the report")]
    Output(#[from] std::io::Error),
}

pub type AnalyzeResult<T> = Result<T, AnalyzeError>;
