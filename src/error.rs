use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for every stage of the PLoM pipeline.
///
/// Every variant names the stage that failed so it can be reported to a user
/// without a backtrace, per the error taxonomy (Config/Io/Numerical/Shape/State).
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PlomError {
    #[error("config error ({stage}): unknown key `{key}`")]
    UnknownKey { stage: &'static str, key: String },

    #[error("config error ({stage}): could not parse value `{value}` for key `{key}`")]
    BadValue {
        stage: &'static str,
        key: String,
        value: String,
    },

    #[error("config error ({stage}): {message}")]
    IncompatibleOptions { stage: &'static str, message: String },

    #[error("io error ({stage}): could not read `{path}`: {source}")]
    Io {
        stage: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("io error ({stage}): `{path}` has shape {found:?}, expected {expected}")]
    BadShape {
        stage: &'static str,
        path: PathBuf,
        found: (usize, usize),
        expected: String,
    },

    #[error("numerical error ({stage}): {message}")]
    Numerical { stage: &'static str, message: String },

    #[error(
        "shape error ({stage}): requested {requested} rows but only {available} are available"
    )]
    InsufficientRows {
        stage: &'static str,
        requested: usize,
        available: usize,
    },

    #[error("state error ({stage}): {message}")]
    State { stage: &'static str, message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] Box<bincode::ErrorKind>),
}

impl PlomError {
    pub(crate) fn numerical(stage: &'static str, message: impl Into<String>) -> Self {
        Self::Numerical {
            stage,
            message: message.into(),
        }
    }

    pub(crate) fn state(stage: &'static str, message: impl Into<String>) -> Self {
        Self::State {
            stage,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PlomError>;
