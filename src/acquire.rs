//! Source acquisition: resolve an input selector into a [`SourceFile`].
//!
//! Three origins are supported: direct upload bytes, a cloud-drive share
//! link, and a local filesystem path. Drive downloads go through a transient
//! temp file that is removed as soon as its bytes are read.

use std::fs;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use crate::config::AppConfig;
use crate::error::{ForgeError, ForgeResult};
use crate::model::{SourceFile, SourceSelector};

/// Direct-download endpoint for drive file IDs.
const DRIVE_DOWNLOAD_BASE: &str = "https://drive.google.com/uc";

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Resolve a selector into a `SourceFile` or a structured failure.
pub fn resolve(selector: SourceSelector, cfg: &AppConfig) -> ForgeResult<SourceFile> {
    match selector {
        SourceSelector::Upload { bytes, name } => {
            if bytes.is_empty() {
                return Err(ForgeError::EmptyUpload { name });
            }
            guard_size(bytes.len() as u64, &name, cfg)?;
            Ok(SourceFile {
                bytes,
                name,
                origin_dir: None,
            })
        }
        SourceSelector::DriveUrl(url) => {
            let id = drive_file_id(&url)?;
            let download_url = format!("{DRIVE_DOWNLOAD_BASE}?id={id}");
            let (bytes, remote_name) = fetch_drive_bytes(&download_url, &url)?;
            if bytes.is_empty() {
                return Err(ForgeError::DownloadFailed {
                    url,
                    detail: "drive returned an empty file".to_owned(),
                });
            }
            let name = remote_name.unwrap_or_else(|| format!("drive_{id}"));
            guard_size(bytes.len() as u64, &name, cfg)?;
            tracing::info!(file = %name, bytes = bytes.len(), "drive download complete");
            // Origin is remote; final output lands next to the render session.
            Ok(SourceFile {
                bytes,
                name,
                origin_dir: None,
            })
        }
        SourceSelector::LocalPath(path) => {
            if !path.exists() {
                return Err(ForgeError::FileNotFound(path));
            }
            let bytes = fs::read(&path)?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    ForgeError::InvalidRequest(format!(
                        "path has no file name: {}",
                        path.display()
                    ))
                })?;
            guard_size(bytes.len() as u64, &name, cfg)?;
            let origin_dir = path.parent().map(Path::to_path_buf);
            Ok(SourceFile {
                bytes,
                name,
                origin_dir,
            })
        }
    }
}

/// Extract the document identifier from one of the two recognized drive URL
/// shapes: `...?id=<ID>&...` or `.../file/d/<ID>/...`.
pub fn drive_file_id(url: &str) -> ForgeResult<String> {
    if let Some((_, rest)) = url.split_once("id=") {
        let id = rest.split('&').next().unwrap_or(rest);
        if !id.is_empty() {
            return Ok(id.to_owned());
        }
    } else if let Some((_, rest)) = url.split_once("/file/d/") {
        let id = rest.split('/').next().unwrap_or(rest);
        if !id.is_empty() {
            return Ok(id.to_owned());
        }
    }
    Err(ForgeError::InvalidLinkFormat {
        url: url.to_owned(),
    })
}

/// Download `download_url` into a transient temp file, read its bytes back,
/// and delete it. Returns the bytes plus the remote-reported filename, if
/// the server sent one.
pub(crate) fn fetch_drive_bytes(
    download_url: &str,
    original_url: &str,
) -> ForgeResult<(Vec<u8>, Option<String>)> {
    let failed = |detail: String| ForgeError::DownloadFailed {
        url: original_url.to_owned(),
        detail,
    };

    let client = reqwest::blocking::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let mut response = client
        .get(download_url)
        .send()
        .map_err(|e| failed(e.to_string()))?;

    if !response.status().is_success() {
        return Err(failed(format!("status {}", response.status().as_u16())));
    }

    let remote_name = response
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(filename_from_disposition);

    let mut tmp = tempfile::NamedTempFile::new()?;
    response
        .copy_to(&mut tmp)
        .map_err(|e| failed(e.to_string()))?;

    let mut bytes = Vec::new();
    let mut handle = tmp.reopen()?;
    handle.read_to_end(&mut bytes)?;
    // NamedTempFile drop removes the transient download.

    Ok((bytes, remote_name))
}

fn filename_from_disposition(value: &str) -> Option<String> {
    let (_, rest) = value.split_once("filename=")?;
    let trimmed = rest.trim().trim_matches('"');
    let name = trimmed.split(';').next().unwrap_or(trimmed).trim();
    if name.is_empty() {
        None
    } else {
        Some(name.trim_matches('"').to_owned())
    }
}

fn guard_size(len: u64, name: &str, cfg: &AppConfig) -> ForgeResult<()> {
    if len > cfg.max_file_bytes() {
        return Err(ForgeError::InvalidRequest(format!(
            "file `{name}` exceeds the {} MB limit",
            cfg.max_file_mb
        )));
    }
    Ok(())
}
