//! Final output assembly.
//!
//! Video inputs get their original video stream muxed against the rendered
//! audio; audio-only inputs are delivered as a renamed copy of the rendered
//! waveform. The video/audio decision is by extension membership, not
//! content inspection.

use std::fs;
use std::path::{Path, PathBuf};

use crate::audio::MEDIA_TOOL_TIMEOUT;
use crate::config::AppConfig;
use crate::error::{ForgeError, ForgeResult};
use crate::model::{file_stem_of, is_audio_only, PROCESSED_SUFFIX};
use crate::process::run_command_with_timeout;

/// Produce the final deliverable in `dest_dir`.
///
/// `original_input` is the item's original container on disk, `rendered` the
/// workstation's output waveform, `original_name` the user-facing filename
/// that determines the deliverable's base name and extension.
pub fn assemble_output(
    original_input: &Path,
    original_name: &str,
    rendered: &Path,
    dest_dir: &Path,
    cfg: &AppConfig,
) -> ForgeResult<PathBuf> {
    fs::create_dir_all(dest_dir)?;
    let base = file_stem_of(original_name);

    if is_audio_only(original_name) {
        let ext = crate::model::extension_of(original_name);
        let output = dest_dir.join(format!("{base}{PROCESSED_SUFFIX}{ext}"));
        fs::copy(rendered, &output)?;
        tracing::info!(output = %output.display(), "copied rendered audio to destination");
        return Ok(output);
    }

    let output = dest_dir.join(format!("{base}{PROCESSED_SUFFIX}.mp4"));
    let args = vec![
        "-y".to_owned(),
        "-i".to_owned(),
        original_input.display().to_string(),
        "-i".to_owned(),
        rendered.display().to_string(),
        "-c:v".to_owned(),
        "copy".to_owned(),
        "-c:a".to_owned(),
        "aac".to_owned(),
        "-b:a".to_owned(),
        "256k".to_owned(),
        "-ar".to_owned(),
        "48000".to_owned(),
        "-map".to_owned(),
        "0:v:0".to_owned(),
        "-map".to_owned(),
        "1:a:0".to_owned(),
        "-shortest".to_owned(),
        output.display().to_string(),
    ];

    run_command_with_timeout(&cfg.ffmpeg_program, &args, None, Some(MEDIA_TOOL_TIMEOUT))
        .map_err(as_mux_failure)?;
    tracing::info!(output = %output.display(), "muxed rendered audio with original video");
    Ok(output)
}

fn as_mux_failure(err: ForgeError) -> ForgeError {
    match err {
        ForgeError::CommandFailed { .. } | ForgeError::CommandTimedOut { .. } => {
            ForgeError::MuxFailed {
                detail: err.to_string(),
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;
    use crate::config::AppConfig;

    fn write_mock_ffmpeg(dir: &Path, body: &str) -> String {
        let path = dir.join("ffmpeg");
        fs::write(&path, format!("#!/usr/bin/env bash\n{body}\n")).expect("write script");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
        path.display().to_string()
    }

    #[test]
    fn audio_only_input_yields_byte_identical_renamed_copy() {
        let dir = tempfile::tempdir().expect("tempdir");
        let rendered = dir.path().join("render.wav");
        fs::write(&rendered, b"rendered pcm bytes").expect("write");
        let dest = dir.path().join("procesados");

        let output = assemble_output(
            &dir.path().join("talk.wav"),
            "talk.wav",
            &rendered,
            &dest,
            &AppConfig::default(),
        )
        .expect("assemble");

        assert_eq!(output, dest.join("talk_procesado.wav"));
        assert_eq!(fs::read(&output).unwrap(), fs::read(&rendered).unwrap());
    }

    #[test]
    fn audio_only_copy_preserves_original_extension() {
        let dir = tempfile::tempdir().expect("tempdir");
        let rendered = dir.path().join("render.wav");
        fs::write(&rendered, b"pcm").expect("write");

        let output = assemble_output(
            &dir.path().join("mix.flac"),
            "mix.flac",
            &rendered,
            dir.path(),
            &AppConfig::default(),
        )
        .expect("assemble");
        assert!(output.ends_with("mix_procesado.flac"));
    }

    #[test]
    fn video_input_invokes_mux_and_names_mp4_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        // Mock mux: write a marker to the last argument.
        let ffmpeg = write_mock_ffmpeg(dir.path(), r#"out="${@: -1}"; echo muxed > "$out""#);
        let cfg = AppConfig {
            ffmpeg_program: ffmpeg,
            ..AppConfig::default()
        };

        let original = dir.path().join("clase.mp4");
        let rendered = dir.path().join("render.wav");
        fs::write(&original, b"video").expect("write");
        fs::write(&rendered, b"audio").expect("write");

        let output = assemble_output(&original, "clase.mp4", &rendered, dir.path(), &cfg)
            .expect("assemble");
        assert!(output.ends_with("clase_procesado.mp4"));
        assert!(output.exists());
    }

    #[test]
    fn mux_failure_maps_to_mux_failed_with_diagnostics() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ffmpeg = write_mock_ffmpeg(dir.path(), "echo 'no video stream' >&2; exit 1");
        let cfg = AppConfig {
            ffmpeg_program: ffmpeg,
            ..AppConfig::default()
        };

        let original = dir.path().join("clase.mkv");
        let rendered = dir.path().join("render.wav");
        fs::write(&original, b"video").expect("write");
        fs::write(&rendered, b"audio").expect("write");

        let err = assemble_output(&original, "clase.mkv", &rendered, dir.path(), &cfg)
            .expect_err("should fail");
        assert!(matches!(err, ForgeError::MuxFailed { .. }));
        assert!(err.to_string().contains("no video stream"));
    }
}
