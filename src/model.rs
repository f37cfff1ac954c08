//! Core data model for the pipeline.
//!
//! Everything here is created once and threaded forward; no type in this
//! module is mutated after construction. One `PipelineItem` owns exactly one
//! render session for its lifetime, named uniquely by a timestamp suffix.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;

/// Canonical waveform parameters: the interchange format between all
/// internal stages.
pub const CANONICAL_SAMPLE_RATE: u32 = 48_000;
pub const CANONICAL_CHANNELS: u32 = 1;
pub const CANONICAL_CODEC: &str = "pcm_s16le";

/// Suffix appended to the original base name for the final deliverable.
pub const PROCESSED_SUFFIX: &str = "_procesado";

/// Extensions treated as audio-only containers. Anything else is assumed to
/// carry a video stream; membership is by extension, not content inspection.
pub const AUDIO_ONLY_EXTENSIONS: [&str; 6] = ["mp3", "wav", "flac", "m4a", "aac", "ogg"];

/// Returns `true` when the filename's extension is in the audio-only set.
#[must_use]
pub fn is_audio_only(name: &str) -> bool {
    Path::new(&name.to_lowercase())
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| AUDIO_ONLY_EXTENSIONS.contains(&ext))
}

/// Base name of a file name (everything before the final dot).
#[must_use]
pub fn file_stem_of(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

/// Extension of a file name including the leading dot, or empty.
#[must_use]
pub fn extension_of(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[idx..],
        _ => "",
    }
}

/// Where an input file's bytes come from.
#[derive(Debug, Clone)]
pub enum SourceSelector {
    /// Bytes handed over directly (front-end upload).
    Upload { bytes: Vec<u8>, name: String },
    /// A cloud-drive share link to download.
    DriveUrl(String),
    /// A file on the local filesystem or a mounted NAS.
    LocalPath(PathBuf),
}

impl SourceSelector {
    /// Human-readable label for progress and failure reporting.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Upload { name, .. } => name.clone(),
            Self::DriveUrl(url) => url.clone(),
            Self::LocalPath(path) => path.display().to_string(),
        }
    }
}

/// A resolved input: bytes plus naming metadata.
///
/// `origin_dir` is present only for local-path sources and governs where the
/// final output is written back (`{origin_dir}/procesados`).
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub bytes: Vec<u8>,
    pub name: String,
    pub origin_dir: Option<PathBuf>,
}

impl SourceFile {
    #[must_use]
    pub fn base_name(&self) -> &str {
        file_stem_of(&self.name)
    }

    #[must_use]
    pub fn extension(&self) -> &str {
        extension_of(&self.name)
    }
}

/// A `SourceFile` bound to its unique, timestamped session name.
///
/// Created at batch submission time; the session name is immutable for the
/// item's lifetime and uniquely names its workstation session and artifacts.
#[derive(Debug, Clone)]
pub struct PipelineItem {
    pub source: SourceFile,
    pub session_name: String,
}

impl PipelineItem {
    #[must_use]
    pub fn new(source: SourceFile, created_at: DateTime<Local>) -> Self {
        let session_name = format!(
            "{}_{}",
            file_stem_of(&source.name),
            created_at.format("%Y%m%d_%H%M%S")
        );
        Self {
            source,
            session_name,
        }
    }
}

/// Outcome of one successful pipeline run. Never mutated after creation.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub original_name: String,
    pub output_path: PathBuf,
    pub reaper_session: PathBuf,
    pub is_video: bool,
    /// Distinguishes terminal presentation: an on-disk path notice for local
    /// sources versus a download handoff for remote ones.
    pub is_local: bool,
}

/// A per-item failure recorded against the item's name.
#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub name: String,
    pub error: String,
    pub error_code: String,
}

/// Aggregate outcome of a batch run.
#[derive(Debug, Clone, Serialize, Default)]
pub struct BatchReport {
    pub submitted: usize,
    pub results: Vec<PipelineResult>,
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    #[must_use]
    pub fn completed(&self) -> usize {
        self.results.len()
    }
}

/// Discrete pipeline stages, used for progress events and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Acquire,
    Extract,
    Isolate,
    Session,
    Render,
    AwaitArtifact,
    Assemble,
}

impl PipelineStage {
    /// The stage label used in events and logging.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Acquire => "acquire",
            Self::Extract => "extract",
            Self::Isolate => "isolate",
            Self::Session => "session",
            Self::Render => "render",
            Self::AwaitArtifact => "await_artifact",
            Self::Assemble => "assemble",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A structured progress event streamed from the orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct StageEvent {
    pub item: String,
    pub index: usize,
    pub total: usize,
    pub stage: PipelineStage,
    pub message: String,
}
