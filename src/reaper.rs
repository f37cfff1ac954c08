//! Reaper session materialization and render submission.
//!
//! A session is materialized from a static `.rpp` template into a fresh,
//! timestamp-named directory. The template must carry the render-target
//! token at the position where the render destination belongs; this token
//! contract replaces any dependence on an exact historical path inside the
//! template asset.
//!
//! Render submission is fire-and-forget: the workstation process is spawned
//! detached and completion is observed separately by polling for the
//! expected artifact (see [`crate::poll`]). The two-phase split keeps the
//! waiting strategy swappable without touching submission.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::audio;
use crate::config::AppConfig;
use crate::error::{ForgeError, ForgeResult};
use crate::process::spawn_detached;

/// Token the session template must contain where the render destination
/// path belongs, e.g. `RENDER_FILE "$AUDIOFORGE_RENDER_TARGET$"`.
pub const RENDER_TARGET_TOKEN: &str = "$AUDIOFORGE_RENDER_TARGET$";

/// External-state namespace the driver script publishes under.
pub const EXT_STATE_SECTION: &str = "audioforge";

/// A materialized on-disk session, bound to exactly one pipeline item.
#[derive(Debug, Clone)]
pub struct RenderSession {
    pub name: String,
    pub dir: PathBuf,
    pub rpp_path: PathBuf,
    pub audio_path: PathBuf,
}

/// The deterministic path the render is expected to produce, derived from
/// the original base filename (not the session name).
#[must_use]
pub fn expected_render_output(session: &RenderSession, original_base: &str) -> PathBuf {
    session.dir.join(format!("{original_base}.wav"))
}

/// Create a fresh session directory and write the templated `.rpp` with the
/// render destination pointed inside it.
///
/// The render destination is `{dir}/{original_base}`, matching
/// [`expected_render_output`]: a workstation that honors the session's own
/// render setting produces exactly the artifact the poller waits for.
pub fn materialize_session(
    cfg: &AppConfig,
    session_name: &str,
    original_base: &str,
    audio_path: &Path,
) -> ForgeResult<RenderSession> {
    if !cfg.template_path.exists() {
        return Err(ForgeError::FileNotFound(cfg.template_path.clone()));
    }

    let dir = cfg.sessions_dir.join(session_name);
    fs::create_dir_all(&dir)?;

    let template = fs::read_to_string(&cfg.template_path)?;
    if !template.contains(RENDER_TARGET_TOKEN) {
        return Err(ForgeError::InvalidRequest(format!(
            "session template `{}` does not contain the render-target token {RENDER_TARGET_TOKEN}",
            cfg.template_path.display()
        )));
    }

    let render_target = dir.join(original_base);
    let content = template.replace(RENDER_TARGET_TOKEN, &render_target.display().to_string());

    let rpp_path = dir.join(format!("{session_name}.rpp"));
    fs::write(&rpp_path, content)?;
    tracing::info!(session = %rpp_path.display(), "materialized render session");

    Ok(RenderSession {
        name: session_name.to_owned(),
        dir,
        rpp_path,
        audio_path: audio_path.to_path_buf(),
    })
}

/// How a materialized session is handed to the workstation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderTrigger {
    /// Splice the audio item directly into the session text, then launch
    /// the workstation against the session file.
    TemplateSplice,
    /// Write a Lua driver that publishes item state and chains into the
    /// externally supplied automation script, then launch the workstation
    /// against the driver. The workstation is intentionally left running.
    #[default]
    ExternalAutomation,
}

impl RenderTrigger {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::TemplateSplice => "template_splice",
            Self::ExternalAutomation => "external_automation",
        }
    }

    /// Submit the render and return immediately. One detached workstation
    /// process per item; completion is never observed via process exit.
    pub fn submit(
        self,
        cfg: &AppConfig,
        session: &RenderSession,
        original_base: &str,
    ) -> ForgeResult<()> {
        match self {
            Self::TemplateSplice => {
                splice_audio_item(session, cfg)?;
                let args = vec![
                    "-renderproject".to_owned(),
                    session.rpp_path.display().to_string(),
                    "-nosplash".to_owned(),
                ];
                spawn_detached(&cfg.reaper_exe, &args, Some(&session.dir))?;
            }
            Self::ExternalAutomation => {
                let driver = write_driver_script(cfg, session, original_base)?;
                let args = vec!["-nosplash".to_owned(), driver.display().to_string()];
                spawn_detached(&cfg.reaper_exe, &args, Some(&session.dir))?;
            }
        }
        tracing::info!(
            trigger = self.label(),
            session = %session.rpp_path.display(),
            "render submitted"
        );
        Ok(())
    }
}

impl fmt::Display for RenderTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Insert an `<ITEM ...>` block for the session's waveform right after the
/// first track opening in the `.rpp` text.
fn splice_audio_item(session: &RenderSession, cfg: &AppConfig) -> ForgeResult<()> {
    let content = fs::read_to_string(&session.rpp_path)?;
    let mut lines: Vec<String> = content.lines().map(str::to_owned).collect();

    let mut track_found = false;
    let mut insert_index = None;
    for (i, line) in lines.iter().enumerate() {
        if line.contains("<TRACK") {
            track_found = true;
        }
        if track_found && line.contains('>') && !line.contains('<') {
            insert_index = Some(i + 1);
            break;
        }
    }
    let Some(insert_index) = insert_index else {
        return Err(ForgeError::InvalidRequest(format!(
            "no track section found in session `{}`",
            session.rpp_path.display()
        )));
    };

    let duration = audio::probe_duration_seconds(&session.audio_path, cfg);
    let item = audio_item_block(&session.audio_path, duration);
    lines.insert(insert_index, item);

    fs::write(&session.rpp_path, lines.join("\n") + "\n")?;
    Ok(())
}

fn audio_item_block(audio_path: &Path, duration: f64) -> String {
    let item_guid = Uuid::new_v4();
    let take_guid = Uuid::new_v4();
    let name = audio_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!(
        r#"    <ITEM
      POSITION 0
      SNAPOFFS 0
      LENGTH {duration}
      LOOP 0
      ALLTAKES 0
      FADEIN 1 0 0 1 0 0 0
      FADEOUT 1 0 0 1 0 0 0
      MUTE 0 0
      SEL 0
      IGUID {{{item_guid}}}
      IID 1
      NAME "{name}"
      VOLPAN 1 0 1 -1
      SOFFS 0
      PLAYRATE 1 1 0 -1 0 0.0025
      CHANMODE 0
      GUID {{{take_guid}}}
      <SOURCE WAVE
        FILE "{file}"
      >
    >"#,
        file = audio_path.display()
    )
}

/// Write the Lua driver that publishes the item's external state and chains
/// into the automation script.
fn write_driver_script(
    cfg: &AppConfig,
    session: &RenderSession,
    original_base: &str,
) -> ForgeResult<PathBuf> {
    if !cfg.automation_script.exists() {
        return Err(ForgeError::MissingAutomationAsset(
            cfg.automation_script.clone(),
        ));
    }

    let driver = session.dir.join(format!("{}_driver.lua", session.name));
    let content = format!(
        r#"-- generated per-item render driver
reaper.SetExtState("{section}", "audio_file", [[{audio}]], false)
reaper.SetExtState("{section}", "session_file", [[{rpp}]], false)
reaper.SetExtState("{section}", "template_file", [[{template}]], false)
reaper.SetExtState("{section}", "original_base", [[{base}]], false)
dofile([[{automation}]])
"#,
        section = EXT_STATE_SECTION,
        audio = session.audio_path.display(),
        rpp = session.rpp_path.display(),
        template = cfg.template_path.display(),
        base = original_base,
        automation = cfg.automation_script.display(),
    );
    fs::write(&driver, content)?;
    Ok(driver)
}
