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

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::{
    fs,
    io::{AsyncRead, AsyncWriteExt as _},
};

use crate::section::Section;

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("create on {path} failed: {source}")]
    Create {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("rename from {path} to {target} failed: {source}")]
    Rename {
        path: String,
        target: String,
        #[source]
        source: std::io::Error,
    },
    #[error("read/write on {path} failed: {source}")]
    ReadWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

struct TempFileGuard<'a> {
    path: &'a Path,
    delete_on_drop: bool,
}

impl Drop for TempFileGuard<'_> {
    fn drop(&mut self) {
        if self.delete_on_drop {
            let _ = std::fs::remove_file(self.path);
        }
    }
}

/// Persists the bytes of one section.
#[async_trait]
pub trait SectionWriter: Send + Sync {
    /// Consumes `body` and stores it as the segment for `section`.
    ///
    /// Returns the number of bytes written.
    async fn write_section(
        &self,
        section: &Section,
        body: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, WriteError>;
}

/// Writes each section to `section-<id>.tmp` inside a working directory.
#[derive(Clone, Debug)]
pub struct SectionFileWriter {
    work_dir: PathBuf,
}

impl SectionFileWriter {
    pub fn new(work_dir: PathBuf) -> Self {
        Self { work_dir }
    }
}

#[async_trait]
impl SectionWriter for SectionFileWriter {
    async fn write_section(
        &self,
        section: &Section,
        body: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, WriteError> {
        let final_path = section.temp_path(&self.work_dir);
        let part_path = section.part_path(&self.work_dir);

        let mut guard = TempFileGuard {
            path: part_path.as_path(),
            delete_on_drop: true,
        };

        // Use blocking creation to ensure the file is created _before_ dropping the
        // TempFileGuard should we cancel the future.
        let file = std::fs::File::create(&part_path).map_err(|source| WriteError::Create {
            path: part_path.display().to_string(),
            source,
        })?;
        let mut file = fs::File::from_std(file);

        let written = tokio::io::copy(body, &mut file)
            .await
            .map_err(|source| WriteError::ReadWrite {
                path: part_path.display().to_string(),
                source,
            })?;
        file.shutdown()
            .await
            .map_err(|source| WriteError::ReadWrite {
                path: part_path.display().to_string(),
                source,
            })?;

        fs::rename(&part_path, &final_path)
            .await
            .map_err(|source| WriteError::Rename {
                path: part_path.display().to_string(),
                target: final_path.display().to_string(),
                source,
            })?;
        guard.delete_on_drop = false;

        Ok(written)
    }
}
