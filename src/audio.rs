//! Canonical waveform production via the external media tool.
//!
//! Every internal stage exchanges audio in one canonical format: mono,
//! 48 kHz, 16-bit linear PCM. Each transformation writes a new file into the
//! working directory; nothing is mutated in place.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;

use crate::config::AppConfig;
use crate::error::{ForgeError, ForgeResult};
use crate::process::run_command_with_timeout;

/// Wall-clock bound for any single media-tool invocation.
pub const MEDIA_TOOL_TIMEOUT: Duration = Duration::from_secs(600);

/// Duration reported when the probe output cannot be parsed.
pub const FALLBACK_DURATION_SECONDS: f64 = 10.0;

/// Extract and downmix `input` into a fresh canonical waveform in the
/// working directory.
///
/// The output name is timestamped (plus the input stem) so repeated runs
/// never collide; old outputs accumulate, cleanup is an operational concern.
pub fn extract_canonical_wav(input: &Path, cfg: &AppConfig) -> ForgeResult<PathBuf> {
    fs::create_dir_all(&cfg.work_dir)?;
    let output = work_file(cfg, "extracted", input);

    let args = vec![
        "-y".to_owned(),
        "-i".to_owned(),
        input.display().to_string(),
        "-ac".to_owned(),
        "1".to_owned(),
        "-ar".to_owned(),
        "48000".to_owned(),
        "-acodec".to_owned(),
        "pcm_s16le".to_owned(),
        "-sample_fmt".to_owned(),
        "s16".to_owned(),
        output.display().to_string(),
    ];

    run_command_with_timeout(&cfg.ffmpeg_program, &args, None, Some(MEDIA_TOOL_TIMEOUT))
        .map_err(as_extraction_failure)?;
    tracing::info!(output = %output.display(), "extracted canonical waveform");
    Ok(output)
}

/// Re-encode an isolation-service response into the canonical format with
/// all metadata stripped (the workstation rejects tagged WAVs).
pub fn reencode_metadata_free(input: &Path, cfg: &AppConfig) -> ForgeResult<PathBuf> {
    fs::create_dir_all(&cfg.work_dir)?;
    let output = work_file(cfg, "isolated", input);

    let args = vec![
        "-y".to_owned(),
        "-i".to_owned(),
        input.display().to_string(),
        "-ar".to_owned(),
        "48000".to_owned(),
        "-ac".to_owned(),
        "1".to_owned(),
        "-acodec".to_owned(),
        "pcm_s16le".to_owned(),
        "-sample_fmt".to_owned(),
        "s16".to_owned(),
        "-fflags".to_owned(),
        "+bitexact".to_owned(),
        "-flags:v".to_owned(),
        "+bitexact".to_owned(),
        "-flags:a".to_owned(),
        "+bitexact".to_owned(),
        output.display().to_string(),
    ];

    run_command_with_timeout(&cfg.ffmpeg_program, &args, None, Some(MEDIA_TOOL_TIMEOUT))
        .map_err(as_extraction_failure)?;
    Ok(output)
}

/// Probe a media file's duration in seconds via the duration-probe tool.
///
/// Falls back to [`FALLBACK_DURATION_SECONDS`] when the tool is unavailable
/// or its output does not parse; the probe is advisory, never fatal.
#[must_use]
pub fn probe_duration_seconds(input: &Path, cfg: &AppConfig) -> f64 {
    let args = vec![
        "-v".to_owned(),
        "error".to_owned(),
        "-show_entries".to_owned(),
        "format=duration".to_owned(),
        "-of".to_owned(),
        "default=noprint_wrappers=1:nokey=1".to_owned(),
        input.display().to_string(),
    ];

    match run_command_with_timeout(&cfg.ffprobe_program, &args, None, Some(MEDIA_TOOL_TIMEOUT)) {
        Ok(output) => String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse::<f64>()
            .unwrap_or_else(|_| {
                tracing::warn!(input = %input.display(), "unparseable probe output, using fallback duration");
                FALLBACK_DURATION_SECONDS
            }),
        Err(err) => {
            tracing::warn!(input = %input.display(), error = %err, "duration probe failed, using fallback");
            FALLBACK_DURATION_SECONDS
        }
    }
}

fn work_file(cfg: &AppConfig, prefix: &str, input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_owned());
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    cfg.work_dir.join(format!("{prefix}_{stem}_{timestamp}.wav"))
}

/// Map a media-tool failure into the extraction taxonomy, preserving the
/// tool's diagnostic text. Missing-binary errors pass through unchanged.
fn as_extraction_failure(err: ForgeError) -> ForgeError {
    match err {
        ForgeError::CommandFailed { .. } | ForgeError::CommandTimedOut { .. } => {
            ForgeError::ExtractionFailed {
                detail: err.to_string(),
            }
        }
        other => other,
    }
}
