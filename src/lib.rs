#![forbid(unsafe_code)]

pub mod acquire;
pub mod assemble;
pub mod audio;
pub mod cli;
pub mod config;
pub mod error;
pub mod isolation;
pub mod logging;
pub mod model;
pub mod orchestrator;
pub mod poll;
pub mod process;
pub mod reaper;

pub use config::{AppConfig, SessionState};
pub use error::{ForgeError, ForgeResult};
pub use model::{BatchReport, PipelineItem, PipelineResult, SourceFile, SourceSelector};
pub use orchestrator::Pipeline;
