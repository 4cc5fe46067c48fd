//! Handlers for the commands the host can send.
//!
//! Each handler validates its request, calls into the engine and returns the
//! response map. Anything that goes wrong is a `CommandError`, which the
//! router turns into an `{"error": ...}` response.

pub mod build;
pub mod error;
pub mod transform;

use std::io;
use std::path::PathBuf;

use crate::bridge::FieldError;
use crate::filter::FilterError;
use crate::options::OptionsError;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Either provide \"outfile\" or set \"write\" to false")]
    MissingOutputTarget,

    #[error(transparent)]
    Field(#[from] FieldError),

    #[error(transparent)]
    Options(#[from] OptionsError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("{}: input is not valid UTF-8", path.display())]
    InvalidUtf8 { path: PathBuf },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CommandError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
