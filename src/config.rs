//! Process-wide configuration and request-scoped session state.
//!
//! `AppConfig` is resolved once at startup (CLI flags with environment
//! fallbacks, see [`crate::cli`]) and passed by reference everywhere.
//! Runtime toggles that used to live in ambient session state are carried in
//! [`SessionState`], threaded explicitly through the orchestrator.

use std::path::PathBuf;

/// Default isolation service base URL. The audio-isolation endpoint is
/// appended at request time.
pub const DEFAULT_ISOLATION_BASE_URL: &str = "https://api.elevenlabs.io";

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// API key for the speech-isolation service. `None` means isolation is
    /// unconfigured and the stage degrades to a pass-through.
    pub isolation_api_key: Option<String>,
    /// Base URL of the speech-isolation service.
    pub isolation_base_url: String,
    /// Path to the Reaper executable.
    pub reaper_exe: PathBuf,
    /// Static `.rpp` session template. Must contain the render-target token
    /// (see [`crate::reaper::RENDER_TARGET_TOKEN`]).
    pub template_path: PathBuf,
    /// Directory under which per-item session directories are created.
    pub sessions_dir: PathBuf,
    /// Working directory for intermediate canonical waveforms. Outputs
    /// accumulate here; cleanup is an operational concern.
    pub work_dir: PathBuf,
    /// Externally supplied Reaper automation script chained from the driver
    /// script (the `ExternalAutomation` render trigger).
    pub automation_script: PathBuf,
    /// Media tool program names, overridable so tests can substitute mocks.
    pub ffmpeg_program: String,
    pub ffprobe_program: String,
    /// Maximum accepted input size in megabytes.
    pub max_file_mb: u64,
    /// Worker pool width for batch processing. `1` processes items
    /// sequentially in submission order.
    pub max_workers: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            isolation_api_key: None,
            isolation_base_url: DEFAULT_ISOLATION_BASE_URL.to_owned(),
            reaper_exe: PathBuf::from("reaper"),
            template_path: PathBuf::from("templates/voces.rpp"),
            sessions_dir: PathBuf::from("sessions"),
            work_dir: PathBuf::from(".audioforge/work"),
            automation_script: PathBuf::from("templates/render_master.lua"),
            ffmpeg_program: "ffmpeg".to_owned(),
            ffprobe_program: "ffprobe".to_owned(),
            max_file_mb: 800,
            max_workers: 2,
        }
    }
}

impl AppConfig {
    /// Maximum accepted input size in bytes.
    #[must_use]
    pub const fn max_file_bytes(&self) -> u64 {
        self.max_file_mb * 1024 * 1024
    }

    /// Whether the isolation service has credentials configured.
    #[must_use]
    pub fn isolation_configured(&self) -> bool {
        self.isolation_api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }
}

/// Per-batch runtime state, passed explicitly instead of living in ambient
/// globals. An operator can disable isolation for the remainder of a batch
/// without touching configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionState {
    pub isolation_disabled: bool,
}
