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

use futures::{StreamExt as _, TryStreamExt as _};
use reqwest::{Client, StatusCode, header};
use std::{error::Error as _, fmt};
use thiserror::Error;
use tokio::io::AsyncReadExt as _;
use tokio_util::io::StreamReader;
use tracing::Span;
use tracing_indicatif::span_ext::IndicatifSpanExt as _;

use crate::{
    section::Section,
    writer::{SectionWriter, WriteError},
};

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error {error} for section {section}")]
    Network { section: usize, error: String },
    #[error("HTTP error {status_code} for section {section}")]
    Http {
        section: usize,
        status_code: StatusCode,
    },
    #[error("Server ignored the range request for section {section} ({status_code})")]
    RangeIgnored {
        section: usize,
        status_code: StatusCode,
    },
    #[error("Section {section} expected {expected} bytes but received {received}")]
    Length {
        section: usize,
        expected: u64,
        received: u64,
    },
    #[error("Failed to store section {section}: {source}")]
    Write {
        section: usize,
        #[source]
        source: WriteError,
    },
    #[error("Section {section} was cancelled")]
    Cancelled { section: usize },
}

impl FetchError {
    pub fn section(&self) -> usize {
        match self {
            FetchError::Network { section, .. }
            | FetchError::Http { section, .. }
            | FetchError::RangeIgnored { section, .. }
            | FetchError::Length { section, .. }
            | FetchError::Write { section, .. }
            | FetchError::Cancelled { section } => *section,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled { .. })
    }
}

/// Every section that failed during one fetch phase, ordered by section ID.
#[derive(Debug)]
pub struct FetchFailures(Vec<FetchError>);

impl FetchFailures {
    pub fn new(mut errors: Vec<FetchError>) -> Self {
        errors.sort_by_key(FetchError::section);
        Self(errors)
    }

    pub fn errors(&self) -> &[FetchError] {
        &self.0
    }

    pub fn sections(&self) -> Vec<usize> {
        self.0.iter().map(FetchError::section).collect()
    }
}

impl fmt::Display for FetchFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors() {
            [err] => write!(f, "{err}"),
            errors => {
                write!(f, "{} sections failed: ", errors.len())?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    write!(f, "{err}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for FetchFailures {}

/// Downloads the bytes of `section` from `url` and hands them to `writer`.
///
/// Progress is reported on `span` as chunks arrive.
pub async fn fetch_section(
    client: &Client,
    url: &str,
    section: &Section,
    writer: &dyn SectionWriter,
    span: &Span,
) -> Result<u64, FetchError> {
    let response = client
        .get(url)
        .header(header::RANGE, section.range_header())
        .send()
        .await
        .map_err(|err| FetchError::Network {
            section: section.id,
            error: err
                .source()
                .map(|e| e.to_string())
                .unwrap_or_else(|| err.to_string()),
        })?;

    let status_code = response.status();
    if !status_code.is_success() {
        return Err(FetchError::Http {
            section: section.id,
            status_code,
        });
    }
    tracing::debug!("section {section} returned {status_code}");

    // A plain 200 is only the requested range when that range is the whole object.
    if status_code != StatusCode::PARTIAL_CONTENT
        && response.content_length() != Some(section.len())
    {
        return Err(FetchError::RangeIgnored {
            section: section.id,
            status_code,
        });
    }

    let stream = response
        .bytes_stream()
        .inspect_ok(|chunk| span.pb_inc(chunk.len() as u64))
        .map_err(std::io::Error::other)
        .boxed();
    // One extra byte is enough to tell an oversized body apart.
    let mut reader = StreamReader::new(stream).take(section.len() + 1);

    let received = writer
        .write_section(section, &mut reader)
        .await
        .map_err(|source| FetchError::Write {
            section: section.id,
            source,
        })?;

    if received != section.len() {
        return Err(FetchError::Length {
            section: section.id,
            expected: section.len(),
            received,
        });
    }

    Ok(received)
}
