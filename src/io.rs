//! C9 (I/O half): whitespace-delimited text and binary `.npy` array
//! persistence, the state-bundle (bincode) round-trip, and plain-text
//! output writing. The `training` key's text-then-binary fallback is the
//! one piece of format-sniffing logic the original relied on.

use std::fs;
use std::path::Path;

use ndarray::Array2;
use ndarray_npy::{ReadNpyExt, WriteNpyExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::PlomError;

const STAGE: &str = "io";

/// Load an N×n array, first as whitespace-delimited text, falling back to
/// the binary `.npy` format if the text parse fails for any reason.
pub fn load_training(path: &Path) -> Result<Array2<f64>, PlomError> {
    match load_text(path) {
        Ok(array) => Ok(array),
        Err(text_err) => {
            warn!(path = %path.display(), error = %text_err, "training file is not whitespace-delimited text, trying binary .npy");
            load_npy(path)
        }
    }
}

fn load_text(path: &Path) -> Result<Array2<f64>, PlomError> {
    let contents = fs::read_to_string(path).map_err(|source| PlomError::Io {
        stage: STAGE,
        path: path.to_path_buf(),
        source,
    })?;
    let mut rows = Vec::new();
    let mut n_cols = None;
    for line in contents.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let tokens: Result<Vec<f64>, _> = trimmed.split_whitespace().map(|t| t.parse::<f64>()).collect();
        let tokens = tokens.map_err(|_| PlomError::BadShape {
            stage: STAGE,
            path: path.to_path_buf(),
            found: (0, 0),
            expected: "whitespace-delimited numeric rows".to_string(),
        })?;
        match n_cols {
            None => n_cols = Some(tokens.len()),
            Some(n) if n != tokens.len() => {
                return Err(PlomError::BadShape {
                    stage: STAGE,
                    path: path.to_path_buf(),
                    found: (rows.len(), tokens.len()),
                    expected: format!("{n} columns"),
                })
            }
            _ => {}
        }
        rows.push(tokens);
    }
    let n_rows = rows.len();
    let n_cols = n_cols.unwrap_or(0);
    if n_rows == 0 || n_cols == 0 {
        return Err(PlomError::BadShape {
            stage: STAGE,
            path: path.to_path_buf(),
            found: (n_rows, n_cols),
            expected: "non-empty N x n matrix".to_string(),
        });
    }
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((n_rows, n_cols), flat).map_err(|_| PlomError::BadShape {
        stage: STAGE,
        path: path.to_path_buf(),
        found: (n_rows, n_cols),
        expected: "rectangular N x n matrix".to_string(),
    })
}

fn load_npy(path: &Path) -> Result<Array2<f64>, PlomError> {
    let file = fs::File::open(path).map_err(|source| PlomError::Io {
        stage: STAGE,
        path: path.to_path_buf(),
        source,
    })?;
    Array2::<f64>::read_npy(file).map_err(|e| PlomError::BadShape {
        stage: STAGE,
        path: path.to_path_buf(),
        found: (0, 0),
        expected: format!("valid .npy array ({e})"),
    })
}

pub fn save_text(path: &Path, array: &Array2<f64>) -> Result<(), PlomError> {
    let mut out = String::with_capacity(array.len() * 8);
    for row in array.rows() {
        let line = row.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" ");
        out.push_str(&line);
        out.push('\n');
    }
    fs::write(path, out).map_err(|source| PlomError::Io {
        stage: STAGE,
        path: path.to_path_buf(),
        source,
    })
}

pub fn save_npy(path: &Path, array: &Array2<f64>) -> Result<(), PlomError> {
    let file = fs::File::create(path).map_err(|source| PlomError::Io {
        stage: STAGE,
        path: path.to_path_buf(),
        source,
    })?;
    array.write_npy(file).map_err(|e| PlomError::Io {
        stage: STAGE,
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
    })
}

pub fn write_text_file(path: &Path, contents: &str) -> Result<(), PlomError> {
    fs::write(path, contents).map_err(|source| PlomError::Io {
        stage: STAGE,
        path: path.to_path_buf(),
        source,
    })
}

/// Serialize any state-bundle value to a binary blob, suitable for later
/// re-sampling without re-running the upstream pipeline stages.
pub fn save_state<T: Serialize>(path: &Path, value: &T) -> Result<(), PlomError> {
    let bytes = bincode::serialize(value)?;
    debug!(path = %path.display(), bytes = bytes.len(), "writing state bundle");
    fs::write(path, bytes).map_err(|source| PlomError::Io {
        stage: STAGE,
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_state<T: DeserializeOwned>(path: &Path) -> Result<T, PlomError> {
    let bytes = fs::read(path).map_err(|source| PlomError::Io {
        stage: STAGE,
        path: path.to_path_buf(),
        source,
    })?;
    Ok(bincode::deserialize(&bytes)?)
}
