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

use std::{
    fmt,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PlanError {
    #[error("Section count must be greater than 0")]
    NoSections,
    #[error("Cannot split {size} bytes into {sections} sections")]
    TooManySections { size: u64, sections: usize },
}

/// An inclusive byte range `[start, end]` of the remote object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Section {
    pub id: usize,
    pub start: u64,
    pub end: u64,
}

impl Section {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for the `Range` request header.
    pub fn range_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }

    /// Path of the completed segment inside `work_dir`.
    pub fn temp_path(&self, work_dir: &Path) -> PathBuf {
        work_dir.join(format!("section-{}.tmp", self.id))
    }

    /// Path the segment is streamed into before it is complete.
    pub fn part_path(&self, work_dir: &Path) -> PathBuf {
        self.temp_path(work_dir).with_extension("part")
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} [{}-{}]", self.id, self.start, self.end)
    }
}

/// Splits `size` bytes into `sections` contiguous ranges.
///
/// Every section but the last spans `size / sections + 1` bytes and the last
/// one takes whatever is left. Non-last sections are capped so each following
/// section keeps at least one byte, which only matters when `sections` gets
/// close to `size`.
pub fn plan(size: u64, sections: usize) -> Result<Vec<Section>, PlanError> {
    if sections == 0 {
        return Err(PlanError::NoSections);
    }
    let count = sections as u64;
    if count > size {
        return Err(PlanError::TooManySections { size, sections });
    }

    let base = size / count;
    let mut list: Vec<Section> = Vec::with_capacity(sections);
    for id in 0..sections {
        let start = list.last().map_or(0, |prev| prev.end + 1);
        let end = if id == sections - 1 {
            size - 1
        } else {
            (start + base).min(size - count + id as u64)
        };
        list.push(Section { id, start, end });
    }

    Ok(list)
}
