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

use reqwest::{
    Client, StatusCode,
    header::{self, HeaderMap},
};
use std::error::Error as _;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Network error probing {url}: {error}")]
    Network { url: String, error: String },
    #[error("HEAD request for {url} returned {status_code}")]
    Status {
        url: String,
        status_code: StatusCode,
    },
    #[error("Response is missing the Content-Length header")]
    MissingLength,
    #[error("Invalid Content-Length header `{0}`")]
    InvalidLength(String),
}

/// Reads the object size from a HEAD response's headers.
pub fn parse_content_length(headers: &HeaderMap) -> Result<u64, ProbeError> {
    let value = headers
        .get(header::CONTENT_LENGTH)
        .ok_or(ProbeError::MissingLength)?;
    let value = value.to_str().map_err(|_| {
        ProbeError::InvalidLength(String::from_utf8_lossy(value.as_bytes()).into_owned())
    })?;
    value
        .trim()
        .parse()
        .map_err(|_| ProbeError::InvalidLength(value.to_string()))
}

/// Issues a HEAD request for `url` and returns the size of the object in bytes.
pub async fn probe_size(client: &Client, url: &str) -> Result<u64, ProbeError> {
    let response = client
        .head(url)
        .send()
        .await
        .map_err(|err| ProbeError::Network {
            url: url.to_string(),
            error: err
                .source()
                .map(|e| e.to_string())
                .unwrap_or_else(|| err.to_string()),
        })?;

    let status_code = response.status();
    tracing::debug!("HEAD {url} returned {status_code}");
    if status_code.as_u16() >= 300 {
        return Err(ProbeError::Status {
            url: url.to_string(),
            status_code,
        });
    }

    parse_content_length(response.headers())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use reqwest::header::HeaderValue;

    fn headers_with_length(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn parse_content_length_valid() {
        assert_eq!(parse_content_length(&headers_with_length("0")).unwrap(), 0);
        assert_eq!(
            parse_content_length(&headers_with_length("1000")).unwrap(),
            1000
        );
        assert_eq!(
            parse_content_length(&headers_with_length("68719476736")).unwrap(),
            1u64 << 36
        );
    }

    #[test]
    fn parse_content_length_missing() {
        let result = parse_content_length(&HeaderMap::new());
        assert!(matches!(result, Err(ProbeError::MissingLength)));
    }

    #[test]
    fn parse_content_length_invalid() {
        for value in ["abc", "-1", "", "10 bytes"] {
            let result = parse_content_length(&headers_with_length(value));
            assert!(
                matches!(result, Err(ProbeError::InvalidLength(ref v)) if v == value),
                "{value}"
            );
        }
    }

    #[tokio::test]
    async fn probe_size_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("HEAD", "/go1.21.0.linux-amd64.tar.gz")
            .match_header("user-agent", "test-agent/1.0")
            .with_status(200)
            .with_header("content-length", "1000")
            .create_async()
            .await;

        let client = Client::builder().user_agent("test-agent/1.0").build().unwrap();
        let url = format!("{}/go1.21.0.linux-amd64.tar.gz", server.url());
        let size = probe_size(&client, &url).await.unwrap();

        mock.assert_async().await;
        assert_eq!(size, 1000);
    }

    #[tokio::test]
    async fn probe_size_not_found() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("HEAD", "/missing.tar.gz")
            .with_status(404)
            .create_async()
            .await;

        let url = format!("{}/missing.tar.gz", server.url());
        let result = probe_size(&Client::new(), &url).await;

        mock.assert_async().await;
        match result {
            Err(ProbeError::Status { status_code, .. }) => {
                assert_eq!(status_code, StatusCode::NOT_FOUND)
            }
            other => panic!("Expected Status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn probe_size_redirect_is_an_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("HEAD", "/moved.tar.gz")
            .with_status(304)
            .create_async()
            .await;

        let url = format!("{}/moved.tar.gz", server.url());
        let result = probe_size(&Client::new(), &url).await;

        assert!(matches!(result, Err(ProbeError::Status { .. })));
    }

    #[tokio::test]
    async fn probe_size_network_error() {
        let result = probe_size(&Client::new(), "http://127.0.0.1:1/file.tar.gz").await;
        assert!(matches!(result, Err(ProbeError::Network { .. })));
    }
}
