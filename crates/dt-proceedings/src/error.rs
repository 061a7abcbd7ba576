//! Error type for `dt-proceedings`.

use std::path::PathBuf;

use thiserror::Error;

use crate::MaterialType;

#[derive(Debug, Error)]
pub enum Error {
  #[error("io error at {path}: {source}")]
  Io {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("zip error: {0}")]
  Zip(#[from] zip::result::ZipError),

  #[error("invalid upload filename: {0:?}")]
  InvalidFilename(String),

  #[error("zip entry escapes the upload directory: {0:?}")]
  UnsafeEntry(String),

  #[error("unknown material type: {0}")]
  UnknownMaterial(String),

  #[error("{0} is not uploaded per session")]
  NotSessionMaterial(MaterialType),

  #[error("no such material: {0}")]
  NoSuchMaterial(String),

  #[error("no numbers left after {0:?}")]
  NumberingExhausted(String),

  #[error("slide manifest {path}: {source}")]
  Manifest {
    path:   PathBuf,
    #[source]
    source: serde_json::Error,
  },
}

impl Error {
  pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
    let path = path.into();
    move |source| Self::Io { path, source }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
