//! Batch orchestration of the processing pipeline.
//!
//! Data flow per item is strictly linear: extract → isolate (optional) →
//! session/render → await artifact → assemble. The batch fans the pipeline
//! out over independent items with per-item failure containment: one item's
//! failure is recorded and never aborts the rest.
//!
//! `max_workers == 1` reproduces sequential submission-order processing;
//! wider settings run a bounded worker pool. Workers share nothing mutable
//! except the append-only outcome collection.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Mutex;
use std::thread;

use crate::assemble::assemble_output;
use crate::audio::extract_canonical_wav;
use crate::config::{AppConfig, SessionState};
use crate::error::ForgeResult;
use crate::isolation::{IsolationClient, IsolationOutcome};
use crate::model::{
    is_audio_only, BatchFailure, BatchReport, PipelineItem, PipelineResult, PipelineStage,
    StageEvent,
};
use crate::poll::{await_artifact, PollSettings};
use crate::reaper::{expected_render_output, materialize_session, RenderTrigger};

pub struct Pipeline {
    cfg: AppConfig,
    isolation: IsolationClient,
    trigger: RenderTrigger,
    poll: PollSettings,
}

impl Pipeline {
    pub fn new(cfg: AppConfig) -> ForgeResult<Self> {
        let isolation = IsolationClient::from_config(&cfg)?;
        Ok(Self {
            cfg,
            isolation,
            trigger: RenderTrigger::default(),
            poll: PollSettings::default(),
        })
    }

    #[must_use]
    pub fn with_trigger(mut self, trigger: RenderTrigger) -> Self {
        self.trigger = trigger;
        self
    }

    #[must_use]
    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    #[must_use]
    pub fn with_isolation_client(mut self, isolation: IsolationClient) -> Self {
        self.isolation = isolation;
        self
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.cfg
    }

    /// Run the pipeline over every item, isolating failures per item.
    pub fn run_batch(
        &self,
        items: &[PipelineItem],
        state: &SessionState,
        events: Option<&Sender<StageEvent>>,
    ) -> BatchReport {
        let total = items.len();
        let workers = worker_count(self.cfg.max_workers, total);
        tracing::info!(submitted = total, workers, "starting batch");

        let mut outcomes: Vec<(usize, ForgeResult<PipelineResult>)> = if workers <= 1 {
            items
                .iter()
                .enumerate()
                .map(|(index, item)| (index, self.run_item(index, total, item, state, events)))
                .collect()
        } else {
            let next = AtomicUsize::new(0);
            let collected: Mutex<Vec<(usize, ForgeResult<PipelineResult>)>> =
                Mutex::new(Vec::with_capacity(total));

            thread::scope(|scope| {
                for _ in 0..workers {
                    let events = events.cloned();
                    let next = &next;
                    let collected = &collected;
                    scope.spawn(move || loop {
                        let index = next.fetch_add(1, Ordering::SeqCst);
                        if index >= total {
                            break;
                        }
                        let outcome =
                            self.run_item(index, total, &items[index], state, events.as_ref());
                        if let Ok(mut guard) = collected.lock() {
                            guard.push((index, outcome));
                        }
                    });
                }
            });

            collected.into_inner().unwrap_or_default()
        };
        outcomes.sort_by_key(|(index, _)| *index);

        let mut report = BatchReport {
            submitted: total,
            ..BatchReport::default()
        };
        for (index, outcome) in outcomes {
            match outcome {
                Ok(result) => report.results.push(result),
                Err(error) => {
                    tracing::error!(
                        item = %items[index].source.name,
                        error = %error,
                        code = error.error_code(),
                        "item failed"
                    );
                    report.failures.push(BatchFailure {
                        name: items[index].source.name.clone(),
                        error: error.to_string(),
                        error_code: error.error_code().to_owned(),
                    });
                }
            }
        }

        tracing::info!(
            completed = report.completed(),
            submitted = report.submitted,
            "batch finished"
        );
        report
    }

    fn run_item(
        &self,
        index: usize,
        total: usize,
        item: &PipelineItem,
        state: &SessionState,
        events: Option<&Sender<StageEvent>>,
    ) -> ForgeResult<PipelineResult> {
        let emit = |stage: PipelineStage, message: String| {
            tracing::info!(item = %item.source.name, stage = %stage, index = index + 1, total, "{message}");
            if let Some(sender) = events {
                let _ = sender.send(StageEvent {
                    item: item.source.name.clone(),
                    index: index + 1,
                    total,
                    stage,
                    message,
                });
            }
        };

        emit(
            PipelineStage::Acquire,
            format!("processing {}", item.source.name),
        );

        // Persist the source bytes so the external tools have a real file.
        fs::create_dir_all(&self.cfg.work_dir)?;
        let input_path = self.cfg.work_dir.join(format!(
            "input_{}{}",
            item.session_name,
            item.source.extension()
        ));
        fs::write(&input_path, &item.source.bytes)?;

        let run = || -> ForgeResult<PipelineResult> {
            emit(
                PipelineStage::Extract,
                "extracting canonical waveform".to_owned(),
            );
            let extracted = extract_canonical_wav(&input_path, &self.cfg)?;

            emit(PipelineStage::Isolate, "applying noise isolation".to_owned());
            let outcome = self.isolation.isolate(&extracted, state, &self.cfg)?;
            if let IsolationOutcome::Skipped(reason) = &outcome {
                emit(PipelineStage::Isolate, format!("skipped: {reason}"));
            }
            let current = outcome.current_path(&extracted);

            emit(
                PipelineStage::Session,
                format!("materializing session {}", item.session_name),
            );
            let session = materialize_session(
                &self.cfg,
                &item.session_name,
                item.source.base_name(),
                &current,
            )?;

            emit(
                PipelineStage::Render,
                format!("submitting render ({})", self.trigger),
            );
            self.trigger
                .submit(&self.cfg, &session, item.source.base_name())?;

            let expected = expected_render_output(&session, item.source.base_name());
            emit(
                PipelineStage::AwaitArtifact,
                format!("waiting for {}", expected.display()),
            );
            let rendered = await_artifact(&expected, &self.poll)?;

            let dest_dir = destination_dir(item, &session.dir);
            emit(
                PipelineStage::Assemble,
                format!("assembling output into {}", dest_dir.display()),
            );
            let output_path = assemble_output(
                &input_path,
                &item.source.name,
                &rendered,
                &dest_dir,
                &self.cfg,
            )?;

            // Superseded intermediates are never referenced again.
            remove_quietly(&extracted);
            if current != extracted {
                remove_quietly(&current);
            }

            Ok(PipelineResult {
                original_name: item.source.name.clone(),
                output_path,
                reaper_session: session.rpp_path,
                is_video: !is_audio_only(&item.source.name),
                is_local: item.source.origin_dir.is_some(),
            })
        };

        let result = run();
        remove_quietly(&input_path);
        result
    }
}

/// Local-path sources write back next to their origin under `procesados`;
/// remote sources deliver into the render-session directory.
fn destination_dir(item: &PipelineItem, session_dir: &std::path::Path) -> PathBuf {
    match &item.source.origin_dir {
        Some(origin) => origin.join("procesados"),
        None => session_dir.to_path_buf(),
    }
}

fn worker_count(max_workers: usize, total: usize) -> usize {
    max_workers.max(1).min(total.max(1))
}

fn remove_quietly(path: &std::path::Path) {
    if let Err(err) = fs::remove_file(path) {
        tracing::debug!(path = %path.display(), error = %err, "intermediate cleanup skipped");
    }
}
