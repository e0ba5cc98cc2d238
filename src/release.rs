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

use regex::Regex;
use reqwest::{Client, StatusCode};
use std::sync::LazyLock;
use thiserror::Error;

static FILENAME_SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<span[^>]*class="filename"[^>]*>([^<]*)</span>"#).unwrap()
});
static VERSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+\.\d+\.\d+").unwrap());

#[derive(Error, Debug)]
pub enum ReleaseError {
    #[error("Failed to fetch release page {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Release page {url} returned {status_code}")]
    Http {
        url: String,
        status_code: StatusCode,
    },
}

/// Returns the first `x.y.z` version named by a download link on `page`.
pub fn find_latest_version(page: &str) -> Option<String> {
    FILENAME_SPAN
        .captures_iter(page)
        .filter_map(|captures| VERSION.find(captures.get(1)?.as_str()))
        .map(|m| m.as_str().to_string())
        .next()
}

/// Looks up the newest release listed on the download page at `base_url`.
pub async fn latest_version(
    client: &Client,
    base_url: &str,
) -> Result<Option<String>, ReleaseError> {
    let network = |source| ReleaseError::Network {
        url: base_url.to_string(),
        source,
    };
    let response = client.get(base_url).send().await.map_err(network)?;
    let status_code = response.status();
    if !status_code.is_success() {
        return Err(ReleaseError::Http {
            url: base_url.to_string(),
            status_code,
        });
    }
    let page = response.text().await.map_err(network)?;
    Ok(find_latest_version(&page))
}
