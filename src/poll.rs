//! Render completion polling.
//!
//! The render happens in a detached workstation process with no synchronous
//! completion signal, so the only observable is the expected artifact
//! appearing on disk. The settle delay guards against reading a partially
//! flushed file.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{ForgeError, ForgeResult};

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    /// How often to check for the artifact.
    pub check_interval: Duration,
    /// Total wall-clock budget before giving up.
    pub timeout: Duration,
    /// Delay after first sighting before returning the path.
    pub settle: Duration,
    /// Coarse progress-log cadence.
    pub progress_every: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(600),
            settle: Duration::from_secs(2),
            progress_every: Duration::from_secs(30),
        }
    }
}

/// Block until `expected` exists, up to the configured timeout.
///
/// Returns the path after the settle delay once the file appears, or
/// `RenderTimeout` when the budget elapses without it.
pub fn await_artifact(expected: &Path, settings: &PollSettings) -> ForgeResult<PathBuf> {
    let started = Instant::now();
    let mut last_progress = Instant::now();

    loop {
        if expected.exists() {
            thread::sleep(settings.settle);
            if !expected.exists() {
                // Sighted but gone after the settle window, e.g. swept by an
                // external cleanup. Waiting further cannot recover it.
                return Err(ForgeError::MissingArtifact(expected.to_path_buf()));
            }
            tracing::info!(
                artifact = %expected.display(),
                waited_ms = started.elapsed().as_millis() as u64,
                "render artifact appeared"
            );
            return Ok(expected.to_path_buf());
        }

        if started.elapsed() >= settings.timeout {
            return Err(ForgeError::RenderTimeout {
                expected: expected.to_path_buf(),
                timeout_ms: settings.timeout.as_millis().try_into().unwrap_or(u64::MAX),
            });
        }

        if last_progress.elapsed() >= settings.progress_every {
            tracing::info!(
                artifact = %expected.display(),
                waited_ms = started.elapsed().as_millis() as u64,
                "still waiting for render artifact"
            );
            last_progress = Instant::now();
        }

        thread::sleep(settings.check_interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tight_settings() -> PollSettings {
        PollSettings {
            check_interval: Duration::from_millis(25),
            timeout: Duration::from_millis(1000),
            settle: Duration::from_millis(10),
            progress_every: Duration::from_millis(200),
        }
    }

    #[test]
    fn preexisting_file_returns_after_settle_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let artifact = dir.path().join("render.wav");
        std::fs::write(&artifact, b"wav").expect("write");

        let started = Instant::now();
        let found = await_artifact(&artifact, &tight_settings()).expect("found");
        assert_eq!(found, artifact);
        assert!(
            started.elapsed() < Duration::from_millis(200),
            "preexisting artifact should return quickly"
        );
    }

    #[test]
    fn file_appearing_mid_poll_is_picked_up() {
        let dir = tempfile::tempdir().expect("tempdir");
        let artifact = dir.path().join("render.wav");
        let settings = tight_settings();

        let writer_path = artifact.clone();
        let writer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(120));
            std::fs::write(&writer_path, b"wav").expect("write");
        });

        let started = Instant::now();
        let found = await_artifact(&artifact, &settings).expect("found");
        writer.join().expect("writer");

        assert_eq!(found, artifact);
        let elapsed = started.elapsed();
        // Appearance delay + settle, plus at most one check interval of slack.
        assert!(elapsed >= Duration::from_millis(120));
        assert!(
            elapsed < Duration::from_millis(120 + 10 + 3 * 25 + 100),
            "took too long: {elapsed:?}"
        );
    }

    #[test]
    fn absent_file_times_out_within_one_interval_of_budget() {
        let dir = tempfile::tempdir().expect("tempdir");
        let artifact = dir.path().join("never.wav");
        let settings = PollSettings {
            timeout: Duration::from_millis(200),
            ..tight_settings()
        };

        let started = Instant::now();
        let err = await_artifact(&artifact, &settings).expect_err("should time out");
        let elapsed = started.elapsed();

        assert!(matches!(err, ForgeError::RenderTimeout { .. }));
        assert!(elapsed >= settings.timeout, "timed out early: {elapsed:?}");
        assert!(
            elapsed < settings.timeout + settings.check_interval + Duration::from_millis(100),
            "timed out late: {elapsed:?}"
        );
    }

    #[test]
    fn artifact_vanishing_during_settle_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let artifact = dir.path().join("render.wav");
        std::fs::write(&artifact, b"wav").expect("write");
        let settings = PollSettings {
            settle: Duration::from_millis(150),
            ..tight_settings()
        };

        let victim = artifact.clone();
        let sweeper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            std::fs::remove_file(&victim).expect("remove");
        });

        let err = await_artifact(&artifact, &settings).expect_err("artifact was swept");
        sweeper.join().expect("sweeper");
        assert!(matches!(err, ForgeError::MissingArtifact(_)));
        assert!(err.to_string().contains("render.wav"));
    }

    #[test]
    fn timeout_error_names_the_expected_path() {
        let settings = PollSettings {
            timeout: Duration::from_millis(1),
            check_interval: Duration::from_millis(1),
            ..tight_settings()
        };
        let err = await_artifact(Path::new("/nope/render.wav"), &settings).expect_err("timeout");
        assert!(err.to_string().contains("render.wav"));
    }
}
