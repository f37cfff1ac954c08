//! Command-line surface.
//!
//! Configuration knobs resolve from flags first, then environment variables,
//! then documented defaults.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::{AppConfig, DEFAULT_ISOLATION_BASE_URL};
use crate::reaper::RenderTrigger;

#[derive(Debug, Parser)]
#[command(name = "audioforge")]
#[command(about = "Batch audio mastering pipeline: ffmpeg extraction, optional voice isolation, Reaper render orchestration")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Process a batch of media files through the full pipeline.
    Process(ProcessArgs),
    /// Check that the external collaborators this pipeline depends on are
    /// reachable: media tools, workstation, template, automation script.
    Doctor(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct ProcessArgs {
    /// Local media files to process (repeatable).
    #[arg(long = "input", value_name = "PATH")]
    pub inputs: Vec<PathBuf>,

    /// Drive share links to download and process (repeatable).
    #[arg(long = "drive-url", value_name = "URL")]
    pub drive_urls: Vec<String>,

    /// Render submission strategy.
    #[arg(long, value_enum, default_value_t = TriggerArg::ExternalAutomation)]
    pub trigger: TriggerArg,

    /// Skip the isolation service for this batch without touching
    /// configuration.
    #[arg(long)]
    pub no_isolation: bool,

    /// Emit the batch report as JSON on stdout.
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TriggerArg {
    TemplateSplice,
    ExternalAutomation,
}

impl From<TriggerArg> for RenderTrigger {
    fn from(value: TriggerArg) -> Self {
        match value {
            TriggerArg::TemplateSplice => Self::TemplateSplice,
            TriggerArg::ExternalAutomation => Self::ExternalAutomation,
        }
    }
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Speech-isolation service API key.
    #[arg(long, env = "AUDIOFORGE_ISOLATION_API_KEY")]
    pub api_key: Option<String>,

    /// Speech-isolation service base URL.
    #[arg(long, env = "AUDIOFORGE_ISOLATION_BASE_URL", default_value = DEFAULT_ISOLATION_BASE_URL)]
    pub base_url: String,

    /// Reaper executable.
    #[arg(long, env = "AUDIOFORGE_REAPER_EXE", default_value = "reaper")]
    pub reaper_exe: PathBuf,

    /// Session template (.rpp) carrying the render-target token.
    #[arg(long, env = "AUDIOFORGE_TEMPLATE", default_value = "templates/voces.rpp")]
    pub template: PathBuf,

    /// Directory for per-item render sessions.
    #[arg(long, env = "AUDIOFORGE_SESSIONS_DIR", default_value = "sessions")]
    pub sessions_dir: PathBuf,

    /// Working directory for intermediate waveforms.
    #[arg(long, env = "AUDIOFORGE_WORK_DIR", default_value = ".audioforge/work")]
    pub work_dir: PathBuf,

    /// Externally supplied Reaper automation script.
    #[arg(
        long,
        env = "AUDIOFORGE_AUTOMATION_SCRIPT",
        default_value = "templates/render_master.lua"
    )]
    pub automation_script: PathBuf,

    /// Media transcoding tool.
    #[arg(long, env = "AUDIOFORGE_FFMPEG", default_value = "ffmpeg")]
    pub ffmpeg: String,

    /// Duration probe tool.
    #[arg(long, env = "AUDIOFORGE_FFPROBE", default_value = "ffprobe")]
    pub ffprobe: String,

    /// Maximum accepted input size in megabytes.
    #[arg(long, env = "MAX_FILE_MB", default_value_t = 800)]
    pub max_file_mb: u64,

    /// Batch worker pool width (1 = sequential).
    #[arg(long, env = "MAX_WORKERS", default_value_t = 2)]
    pub max_workers: usize,
}

impl ConfigArgs {
    #[must_use]
    pub fn to_config(&self) -> AppConfig {
        AppConfig {
            isolation_api_key: self.api_key.clone(),
            isolation_base_url: self.base_url.clone(),
            reaper_exe: self.reaper_exe.clone(),
            template_path: self.template.clone(),
            sessions_dir: self.sessions_dir.clone(),
            work_dir: self.work_dir.clone(),
            automation_script: self.automation_script.clone(),
            ffmpeg_program: self.ffmpeg.clone(),
            ffprobe_program: self.ffprobe.clone(),
            max_file_mb: self.max_file_mb,
            max_workers: self.max_workers,
        }
    }
}
