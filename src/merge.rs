// Copyright (c) 2024-2025 Federico G. Schwindt <fgsch@lodoss.net>
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

use std::path::Path;
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt as _};

use crate::section::Section;

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Failed to create {path}: {source}")]
    Create {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to read {path} for section {section}: {source}")]
    Read {
        section: usize,
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to append section {section} to {path}: {source}")]
    Write {
        section: usize,
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to flush {path}: {source}")]
    Flush {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to remove {path} for section {section}: {source}")]
    Remove {
        section: usize,
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Concatenates the segments of `sections` into `destination`.
///
/// `sections` must be in ascending ID order, as returned by
/// [`plan`](crate::section::plan). The destination is truncated first and each
/// segment is deleted once it has been appended. Returns the number of bytes
/// written.
pub async fn merge_sections(
    sections: &[Section],
    work_dir: &Path,
    destination: &Path,
) -> Result<u64, MergeError> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(destination)
        .await
        .map_err(|source| MergeError::Create {
            path: destination.display().to_string(),
            source,
        })?;

    let mut total = 0;
    for section in sections {
        let temp_path = section.temp_path(work_dir);
        let data = fs::read(&temp_path)
            .await
            .map_err(|source| MergeError::Read {
                section: section.id,
                path: temp_path.display().to_string(),
                source,
            })?;
        file.write_all(&data)
            .await
            .map_err(|source| MergeError::Write {
                section: section.id,
                path: destination.display().to_string(),
                source,
            })?;
        fs::remove_file(&temp_path)
            .await
            .map_err(|source| MergeError::Remove {
                section: section.id,
                path: temp_path.display().to_string(),
                source,
            })?;
        total += data.len() as u64;
        tracing::debug!("merged {} bytes for section {section}", data.len());
    }

    file.flush().await.map_err(|source| MergeError::Flush {
        path: destination.display().to_string(),
        source,
    })?;

    Ok(total)
}

/// Removes whatever segments of `sections` are left in `work_dir`.
pub async fn discard_sections(sections: &[Section], work_dir: &Path) {
    for section in sections {
        let temp_path = section.temp_path(work_dir);
        match fs::remove_file(&temp_path).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => tracing::warn!("Failed to remove {}: {err}", temp_path.display()),
        }
    }
}
