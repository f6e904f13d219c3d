use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
  #[error("a stage needs a running tokio runtime")]
  NoRuntime,

  #[error("could not read {}: {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("malformed project: {0}")]
  Json(#[from] serde_json::Error),
}
