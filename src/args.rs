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

use clap::{
    Parser,
    error::{Error, ErrorKind},
};
use reqwest::Client;
use std::{path::PathBuf, time::Duration};
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://go.dev/dl/";

#[derive(Error, Debug)]
pub enum ArgsError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[from] reqwest::Error),
}

#[derive(Parser, Debug, Clone)]
#[command(
    version,
    about,
    long_about = "Download and install a Go toolchain using concurrent range requests"
)]
pub struct Args {
    /// Base URL of the release download page
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Only look up the latest released version and exit
    #[arg(long, default_value_t = false)]
    pub check_version_only: bool,

    /// Connection timeout in seconds
    #[arg(long, default_value = "30", value_parser = parse_duration_seconds)]
    pub connect_timeout: Duration,

    /// Installation directory
    #[arg(long, short, default_value = "/usr/local")]
    pub directory: PathBuf,

    /// Directory for the downloaded archive and its temporary sections
    #[arg(long, default_value = "download")]
    pub download_directory: PathBuf,

    /// Go version to install (defaults to the latest release)
    #[arg(long, short = 'g')]
    pub go_version: Option<String>,

    /// Disable progress bar output
    #[arg(long, short, default_value_t = false)]
    pub quiet: bool,

    /// Number of sections to download concurrently
    #[arg(long, short, default_value_t = 10, value_parser = parse_greater_than_zero)]
    pub sections: usize,

    /// Install an archive downloaded by a previous run
    #[arg(long, default_value_t = false)]
    pub skip_download: bool,

    /// User-Agent string for HTTP requests
    #[arg(long, short, default_value_t = concat!("gofetch/", env!("CARGO_PKG_VERSION")).to_string())]
    pub user_agent: String,
}

fn parse_greater_than_zero(s: &str) -> Result<usize, Error> {
    let v = s.parse().map_err(|_| {
        Error::raw(
            ErrorKind::InvalidValue,
            format!("`{s}` isn't a valid integer"),
        )
    })?;
    if v == 0 {
        Err(Error::raw(
            ErrorKind::InvalidValue,
            "Value must be greater than 0",
        ))
    } else {
        Ok(v)
    }
}

fn parse_duration_seconds(s: &str) -> Result<Duration, Error> {
    let seconds = parse_greater_than_zero(s)?;
    Ok(Duration::from_secs(seconds as u64))
}

pub fn build_client(args: &Args) -> Result<Client, ArgsError> {
    Ok(Client::builder()
        .connect_timeout(args.connect_timeout)
        .user_agent(&args.user_agent)
        .build()?)
}

pub fn parse_args() -> Result<(Args, Client), ArgsError> {
    let args = Args::parse();
    let client = build_client(&args)?;
    Ok((args, client))
}
