//! Error types surfaced by a publish run.

use std::path::PathBuf;

use thiserror::Error;

/// Failures that abort a publish run.
#[derive(Error, Debug)]
pub enum PublishError {
  /// The build configuration cannot produce a usable chunk map.
  #[error("configuration error: {0}")]
  Configuration(String),
  /// The publisher rejected a batch or returned an incomplete mapping.
  #[error("upload failed: {0}")]
  Upload(String),
  /// Reading or writing a file failed.
  #[error("failed to access {}: {source}", path.display())]
  Io {
    /// Path that caused the error.
    path: PathBuf,
    /// Source I/O error.
    source: std::io::Error,
  },
  /// The build manifest could not be parsed.
  #[error("failed to parse build manifest {}: {source}", path.display())]
  Manifest {
    /// Manifest path.
    path: PathBuf,
    /// Source parse error.
    source: serde_json::Error,
  },
  /// The publish configuration file could not be parsed.
  #[error("failed to parse config {}: {message}", path.display())]
  Config {
    /// Config path.
    path: PathBuf,
    /// Parser message.
    message: String,
  },
  /// A search pattern built from a path failed to compile.
  #[error("invalid search pattern: {0}")]
  Pattern(#[from] regex::Error),
  /// The `wait_for` hook failed before the run started.
  #[error("wait hook failed: {0}")]
  Hook(String),
}

impl PublishError {
  /// Create a new configuration error.
  pub fn configuration(msg: impl Into<String>) -> Self {
    Self::Configuration(msg.into())
  }

  /// Create a new upload error.
  pub fn upload(msg: impl Into<String>) -> Self {
    Self::Upload(msg.into())
  }

  /// Wrap an I/O error with the path it concerns.
  pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    Self::Io {
      path: path.into(),
      source,
    }
  }
}

/// Result alias used across the crate.
pub type PublishResult<T> = Result<T, PublishError>;
