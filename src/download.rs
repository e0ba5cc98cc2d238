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

use futures::StreamExt as _;
use reqwest::Client;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing_indicatif::span_ext::IndicatifSpanExt as _;

use crate::{
    fetch::{FetchError, FetchFailures, fetch_section},
    merge::{MergeError, discard_sections, merge_sections},
    probe::{ProbeError, probe_size},
    section::{PlanError, Section, plan},
    writer::SectionFileWriter,
};

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Failed to prepare {path}: {source}")]
    FileOperation {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Fetch(#[from] FetchFailures),
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error("Download cancelled")]
    Cancelled,
}

/// A single object to fetch in sections.
#[derive(Clone, Debug)]
pub struct DownloadRequest {
    pub url: String,
    /// File name of the result inside the working directory.
    pub target: String,
    pub sections: usize,
}

pub struct Downloader {
    client: Client,
    work_dir: PathBuf,
    show_progress: bool,
}

impl Downloader {
    pub fn new(client: Client, work_dir: PathBuf, show_progress: bool) -> Self {
        Self {
            client,
            work_dir,
            show_progress,
        }
    }

    /// Fetches `request` and returns the path of the merged file.
    ///
    /// Cancelling `token` stops any in-flight transfer and discards the
    /// sections downloaded so far.
    pub async fn download(
        &self,
        request: &DownloadRequest,
        token: &CancellationToken,
    ) -> Result<PathBuf, DownloadError> {
        let size = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(DownloadError::Cancelled),
            size = probe_size(&self.client, &request.url) => size?,
        };
        tracing::info!("{} is {size} bytes", request.url);

        fs::create_dir_all(&self.work_dir)
            .await
            .map_err(|source| DownloadError::FileOperation {
                path: self.work_dir.display().to_string(),
                source,
            })?;
        let destination = self.work_dir.join(&request.target);

        if size == 0 {
            fs::write(&destination, b"")
                .await
                .map_err(|source| DownloadError::FileOperation {
                    path: destination.display().to_string(),
                    source,
                })?;
            return Ok(destination);
        }

        let count = usize::try_from(size)
            .map_or(request.sections, |size| request.sections.min(size));
        if count < request.sections {
            tracing::warn!(
                "Using {count} sections instead of {} for a {size} byte object",
                request.sections
            );
        }
        let sections = plan(size, count)?;
        tracing::debug!("planned sections: {sections:?}");

        self.fetch_sections(request, size, &sections, token).await?;

        match merge_sections(&sections, &self.work_dir, &destination).await {
            Ok(merged) => {
                tracing::info!("merged {merged} bytes into {}", destination.display());
                Ok(destination)
            }
            Err(err) => {
                discard_sections(&sections, &self.work_dir).await;
                remove_partial(&destination).await;
                Err(err.into())
            }
        }
    }

    async fn fetch_sections(
        &self,
        request: &DownloadRequest,
        size: u64,
        sections: &[Section],
        token: &CancellationToken,
    ) -> Result<(), DownloadError> {
        let writer = SectionFileWriter::new(self.work_dir.clone());
        let span = tracing::info_span!("fetch");
        span.pb_set_length(size);
        if self.show_progress {
            span.pb_start();
        }

        // Siblings observe this token so one failure stops the rest.
        let abort = token.child_token();
        let client = &self.client;
        let url = request.url.as_str();
        let results: Vec<Result<u64, FetchError>> = futures::stream::iter(sections)
            .map(|section| {
                let abort = &abort;
                let writer = &writer;
                let span = &span;
                async move {
                    let result = tokio::select! {
                        biased;
                        _ = abort.cancelled() => Err(FetchError::Cancelled { section: section.id }),
                        result = fetch_section(client, url, section, writer, span) => result,
                    };
                    if let Err(err) = &result {
                        if !err.is_cancelled() {
                            tracing::debug!("{err}, cancelling remaining sections");
                            abort.cancel();
                        }
                    }
                    result
                }
            })
            .buffer_unordered(sections.len())
            .collect()
            .await;

        let mut cancelled = false;
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(_) => {}
                Err(err) if err.is_cancelled() => cancelled = true,
                Err(err) => failures.push(err),
            }
        }

        if failures.is_empty() && !cancelled {
            return Ok(());
        }
        discard_sections(sections, &self.work_dir).await;
        if failures.is_empty() {
            return Err(DownloadError::Cancelled);
        }
        let failures = FetchFailures::new(failures);
        tracing::debug!("failed sections: {:?}", failures.sections());
        Err(failures.into())
    }
}

async fn remove_partial(destination: &Path) {
    match fs::remove_file(destination).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!("Failed to remove {}: {err}", destination.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Mock, Server, ServerGuard};
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    const TARGET: &str = "go1.21.0.linux-amd64.tar.gz";

    fn sample_data(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 256) as u8).collect()
    }

    fn create_test_request(server: &ServerGuard, sections: usize) -> DownloadRequest {
        DownloadRequest {
            url: format!("{}/{TARGET}", server.url()),
            target: TARGET.to_string(),
            sections,
        }
    }

    async fn mock_head(server: &mut ServerGuard, size: usize) -> Mock {
        server
            .mock("HEAD", format!("/{TARGET}").as_str())
            .with_status(200)
            .with_header("content-length", &size.to_string())
            .create_async()
            .await
    }

    /// Serves every planned section of `data` as a 206 response.
    async fn mock_ranges(server: &mut ServerGuard, data: &[u8], sections: usize) -> Vec<Mock> {
        let mut mocks = Vec::new();
        for section in plan(data.len() as u64, sections).unwrap() {
            let body = data[section.start as usize..=section.end as usize].to_vec();
            let mock = server
                .mock("GET", format!("/{TARGET}").as_str())
                .match_header("range", section.range_header().as_str())
                .with_status(206)
                .with_body(body)
                .create_async()
                .await;
            mocks.push(mock);
        }
        mocks
    }

    fn segment_files(work_dir: &Path) -> Vec<String> {
        std::fs::read_dir(work_dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .filter(|name| name.starts_with("section-"))
            .collect()
    }

    async fn assert_round_trip(size: usize, sections: usize) {
        let mut server = Server::new_async().await;
        let temp_dir = TempDir::new().unwrap();
        let data = sample_data(size);

        let head = mock_head(&mut server, size).await;
        let ranges = mock_ranges(&mut server, &data, sections).await;

        let downloader = Downloader::new(Client::new(), temp_dir.path().to_path_buf(), false);
        let request = create_test_request(&server, sections);
        let destination = downloader
            .download(&request, &CancellationToken::new())
            .await
            .unwrap();

        head.assert_async().await;
        for mock in ranges {
            mock.assert_async().await;
        }
        assert_eq!(destination, temp_dir.path().join(TARGET));
        assert_eq!(std::fs::read(&destination).unwrap(), data);
        assert!(segment_files(temp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn download_single_section() {
        assert_round_trip(1000, 1).await;
    }

    #[tokio::test]
    async fn download_two_sections() {
        assert_round_trip(1000, 2).await;
    }

    #[tokio::test]
    async fn download_ten_sections() {
        assert_round_trip(1000, 10).await;
    }

    #[tokio::test]
    async fn download_sections_close_to_size() {
        assert_round_trip(64, 63).await;
    }

    #[tokio::test]
    async fn download_clamps_sections_to_size() {
        let mut server = Server::new_async().await;
        let temp_dir = TempDir::new().unwrap();
        let data = sample_data(4);

        let _head = mock_head(&mut server, 4).await;
        let _ranges = mock_ranges(&mut server, &data, 4).await;

        let downloader = Downloader::new(Client::new(), temp_dir.path().to_path_buf(), false);
        let destination = downloader
            .download(&create_test_request(&server, 10), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(std::fs::read(destination).unwrap(), data);
    }

    #[tokio::test]
    async fn download_empty_object() {
        let mut server = Server::new_async().await;
        let temp_dir = TempDir::new().unwrap();
        let _head = mock_head(&mut server, 0).await;
        let get = server
            .mock("GET", format!("/{TARGET}").as_str())
            .expect(0)
            .create_async()
            .await;

        let downloader = Downloader::new(Client::new(), temp_dir.path().to_path_buf(), false);
        let destination = downloader
            .download(&create_test_request(&server, 10), &CancellationToken::new())
            .await
            .unwrap();

        get.assert_async().await;
        assert!(std::fs::read(destination).unwrap().is_empty());
    }

    #[tokio::test]
    async fn download_probe_failure_skips_fetch() {
        let mut server = Server::new_async().await;
        let temp_dir = TempDir::new().unwrap();
        let _head = server
            .mock("HEAD", format!("/{TARGET}").as_str())
            .with_status(404)
            .create_async()
            .await;
        let get = server
            .mock("GET", format!("/{TARGET}").as_str())
            .expect(0)
            .create_async()
            .await;

        let downloader = Downloader::new(Client::new(), temp_dir.path().to_path_buf(), false);
        let result = downloader
            .download(&create_test_request(&server, 4), &CancellationToken::new())
            .await;

        get.assert_async().await;
        assert!(matches!(result, Err(DownloadError::Probe(ProbeError::Status { .. }))));
        assert!(!temp_dir.path().join(TARGET).exists());
    }

    #[tokio::test]
    async fn download_one_failed_section() {
        let mut server = Server::new_async().await;
        let temp_dir = TempDir::new().unwrap();
        let data = sample_data(300);
        let sections = plan(300, 3).unwrap();

        let _head = mock_head(&mut server, 300).await;
        let mut ranges = Vec::new();
        for section in &sections {
            let mock = server
                .mock("GET", format!("/{TARGET}").as_str())
                .match_header("range", section.range_header().as_str());
            let mock = if section.id == 1 {
                mock.with_status(500)
            } else {
                mock.with_status(206)
                    .with_body(&data[section.start as usize..=section.end as usize])
            };
            ranges.push(mock.create_async().await);
        }

        let downloader = Downloader::new(Client::new(), temp_dir.path().to_path_buf(), false);
        let result = downloader
            .download(&create_test_request(&server, 3), &CancellationToken::new())
            .await;

        match result {
            Err(DownloadError::Fetch(failures)) => {
                assert_eq!(failures.sections(), vec![1]);
                assert!(matches!(failures.errors()[0], FetchError::Http { .. }));
            }
            other => panic!("Expected Fetch error, got {other:?}"),
        }
        assert!(!temp_dir.path().join(TARGET).exists());
        assert!(segment_files(temp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn download_failure_stops_slow_sections() {
        let mut server = Server::new_async().await;
        let temp_dir = TempDir::new().unwrap();
        let sections = plan(300, 3).unwrap();

        let _head = mock_head(&mut server, 300).await;
        let mut ranges = Vec::new();
        for section in &sections {
            let mock = server
                .mock("GET", format!("/{TARGET}").as_str())
                .match_header("range", section.range_header().as_str());
            let mock = if section.id == 1 {
                mock.with_status(500)
            } else {
                let len = section.len() as usize;
                mock.with_status(206).with_chunked_body(move |w| {
                    std::thread::sleep(Duration::from_secs(5));
                    w.write_all(&vec![0u8; len])
                })
            };
            ranges.push(mock.create_async().await);
        }

        let downloader = Downloader::new(Client::new(), temp_dir.path().to_path_buf(), false);
        let start = Instant::now();
        let result = downloader
            .download(&create_test_request(&server, 3), &CancellationToken::new())
            .await;

        assert!(start.elapsed() < Duration::from_secs(3));
        match result {
            Err(DownloadError::Fetch(failures)) => assert_eq!(failures.sections(), vec![1]),
            other => panic!("Expected Fetch error, got {other:?}"),
        }
        assert!(!temp_dir.path().join(TARGET).exists());
        assert!(segment_files(temp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn download_cancelled_before_start() {
        let mut server = Server::new_async().await;
        let temp_dir = TempDir::new().unwrap();
        let head = server
            .mock("HEAD", format!("/{TARGET}").as_str())
            .expect(0)
            .create_async()
            .await;

        let token = CancellationToken::new();
        token.cancel();
        let downloader = Downloader::new(Client::new(), temp_dir.path().to_path_buf(), false);
        let result = downloader
            .download(&create_test_request(&server, 4), &token)
            .await;

        head.assert_async().await;
        assert!(matches!(result, Err(DownloadError::Cancelled)));
    }

    #[tokio::test]
    async fn fetch_sections_cancelled() {
        let server = Server::new_async().await;
        let temp_dir = TempDir::new().unwrap();
        let sections = plan(100, 4).unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let downloader = Downloader::new(Client::new(), temp_dir.path().to_path_buf(), false);
        let result = downloader
            .fetch_sections(&create_test_request(&server, 4), 100, &sections, &token)
            .await;

        assert!(matches!(result, Err(DownloadError::Cancelled)));
        assert!(segment_files(temp_dir.path()).is_empty());
    }
}
