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
    io::ErrorKind,
    path::{Path, PathBuf},
    process::ExitStatus,
};
use thiserror::Error;
use tokio::{fs, process::Command};

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Failed to read {path}: {source}")]
    Marker {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to run tar: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("Extracting {archive} failed: tar exited with {status}")]
    Extract { archive: String, status: ExitStatus },
}

/// Name of the release archive for the platform this binary was built for.
pub fn archive_name(version: &str) -> String {
    let os = match std::env::consts::OS {
        "macos" => "darwin",
        os => os,
    };
    let arch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        arch => arch,
    };
    format!("go{version}.{os}-{arch}.tar.gz")
}

pub fn version_marker(directory: &Path) -> PathBuf {
    directory.join("go").join("VERSION")
}

/// Reads the first line of the installed toolchain's VERSION file, if any.
pub async fn installed_version(directory: &Path) -> Result<Option<String>, InstallError> {
    let path = version_marker(directory);
    match fs::read_to_string(&path).await {
        Ok(content) => Ok(content.lines().next().map(|line| line.trim().to_string())),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(InstallError::Marker {
            path: path.display().to_string(),
            source,
        }),
    }
}

/// Whether the VERSION marker `installed` names release `wanted`.
pub fn is_installed(installed: Option<&str>, wanted: &str) -> bool {
    installed.and_then(|v| v.strip_prefix("go")) == Some(wanted)
}

/// Unpacks `archive` into `directory` with the system tar.
pub async fn extract_archive(archive: &Path, directory: &Path) -> Result<(), InstallError> {
    let status = Command::new("tar")
        .arg("-C")
        .arg(directory)
        .arg("-xzf")
        .arg(archive)
        .status()
        .await
        .map_err(InstallError::Spawn)?;

    if !status.success() {
        return Err(InstallError::Extract {
            archive: archive.display().to_string(),
            status,
        });
    }
    Ok(())
}
