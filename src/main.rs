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

mod args;
mod download;
mod fetch;
mod install;
mod merge;
mod probe;
mod release;
mod section;
mod writer;

use anyhow::{Context as _, bail};
use indicatif::ProgressStyle;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{
    fmt::writer::MakeWriterExt as _, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

use args::parse_args;
use download::{DownloadRequest, Downloader};
use install::{archive_name, extract_archive, installed_version, is_installed};
use release::latest_version;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (args, client) = parse_args()?;

    let indicatif_layer = IndicatifLayer::new().with_progress_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{wide_bar}] {bytes:>10}/{total_bytes:10} ({percent:>3}%) ETA: {eta}",
        )
        .unwrap()
        .progress_chars("#>-"),
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(
                    indicatif_layer
                        .get_stderr_writer()
                        .with_max_level(Level::INFO),
                )
                .with_target(false),
        )
        .with(indicatif_layer)
        .init();

    let latest = match latest_version(&client, &args.base_url).await {
        Ok(Some(version)) => {
            tracing::info!("{version} is the latest version");
            Some(version)
        }
        Ok(None) => {
            tracing::warn!("No release found on {}", args.base_url);
            None
        }
        Err(err) => {
            tracing::error!("Can't determine the latest version: {err}");
            None
        }
    };
    if args.check_version_only {
        return Ok(());
    }

    let Some(version) = args.go_version.clone().or(latest) else {
        bail!("No version to install, pass --go-version");
    };

    let before = installed_version(&args.directory).await?;
    match &before {
        Some(installed) => tracing::info!("Version before install: {installed}"),
        None => tracing::info!("Go is not installed in {}", args.directory.display()),
    }
    if is_installed(before.as_deref(), &version) {
        tracing::info!("{version} is already installed");
        return Ok(());
    }

    let filename = archive_name(&version);
    let archive = args.download_directory.join(&filename);

    if args.skip_download {
        tracing::info!("Skipping download of {filename}");
    } else {
        // Handle ctrl-c
        let token = CancellationToken::new();
        tokio::task::spawn({
            let token = token.clone();
            async move {
                _ = tokio::signal::ctrl_c().await;
                token.cancel();
            }
        });

        let request = DownloadRequest {
            url: format!("{}{filename}", args.base_url),
            target: filename.clone(),
            sections: args.sections,
        };
        let downloader = Downloader::new(client, args.download_directory.clone(), !args.quiet);
        let start = Instant::now();
        downloader
            .download(&request, &token)
            .await
            .with_context(|| format!("Failed to download {}", request.url))?;
        tracing::info!("Download completed in {:.2?}", start.elapsed());
    }

    extract_archive(&archive, &args.directory)
        .await
        .with_context(|| format!("Failed to install {filename}"))?;

    if let Some(after) = installed_version(&args.directory).await? {
        tracing::info!("Version after install: {after}");
    }

    Ok(())
}
