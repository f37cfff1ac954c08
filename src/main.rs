use std::sync::mpsc;
use std::thread;

use audioforge::cli::{Cli, Command, ConfigArgs, ProcessArgs};
use audioforge::config::SessionState;
use audioforge::model::{PipelineItem, SourceSelector, StageEvent};
use audioforge::process::command_exists;
use audioforge::{acquire, ForgeError, ForgeResult, Pipeline};
use chrono::Local;
use clap::Parser;

fn main() {
    audioforge::logging::init();

    if let Err(error) = run() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run() -> ForgeResult<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Process(args) => run_process(args),
        Command::Doctor(args) => run_doctor(&args),
    }
}

fn run_process(args: ProcessArgs) -> ForgeResult<()> {
    let cfg = args.config.to_config();
    let state = SessionState {
        isolation_disabled: args.no_isolation,
    };

    let selectors: Vec<SourceSelector> = args
        .inputs
        .iter()
        .cloned()
        .map(SourceSelector::LocalPath)
        .chain(args.drive_urls.iter().cloned().map(SourceSelector::DriveUrl))
        .collect();
    if selectors.is_empty() {
        return Err(ForgeError::InvalidRequest(
            "nothing to process; pass --input and/or --drive-url".to_owned(),
        ));
    }

    // Acquisition failures are contained per item, like pipeline failures.
    let mut acquisition_failures: Vec<(String, ForgeError)> = Vec::new();
    let mut items: Vec<PipelineItem> = Vec::new();
    for selector in selectors {
        let label = selector.describe();
        match acquire::resolve(selector, &cfg) {
            Ok(source) => items.push(PipelineItem::new(source, Local::now())),
            Err(error) => {
                tracing::error!(item = %label, error = %error, "acquisition failed");
                acquisition_failures.push((label, error));
            }
        }
    }

    let submitted = items.len() + acquisition_failures.len();
    let pipeline = Pipeline::new(cfg)?.with_trigger(args.trigger.into());

    let (event_tx, event_rx) = mpsc::channel::<StageEvent>();
    let printer = thread::spawn(move || {
        for event in event_rx {
            eprintln!(
                "[{}/{}] {} · {}: {}",
                event.index, event.total, event.item, event.stage, event.message
            );
        }
    });

    let mut report = pipeline.run_batch(&items, &state, Some(&event_tx));
    drop(event_tx);
    let _ = printer.join();

    report.submitted = submitted;
    for (name, error) in acquisition_failures {
        report.failures.push(audioforge::model::BatchFailure {
            error_code: error.error_code().to_owned(),
            error: error.to_string(),
            name,
        });
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "completed {}/{} item(s)",
            report.completed(),
            report.submitted
        );
        for result in &report.results {
            let location = if result.is_local {
                "written to"
            } else {
                "available at"
            };
            println!(
                "  ✔ {} → {location} {} (session {})",
                result.original_name,
                result.output_path.display(),
                result.reaper_session.display()
            );
        }
        for failure in &report.failures {
            println!(
                "  ✘ {} → {} [{}]",
                failure.name, failure.error, failure.error_code
            );
        }
    }

    if report.completed() == 0 && report.submitted > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn run_doctor(args: &ConfigArgs) -> ForgeResult<()> {
    let cfg = args.to_config();
    let mut healthy = true;

    let mut check = |label: &str, ok: bool, detail: String| {
        println!("{} {label}: {detail}", if ok { "✔" } else { "✘" });
        healthy &= ok;
    };

    check(
        "ffmpeg",
        command_exists(&cfg.ffmpeg_program),
        cfg.ffmpeg_program.clone(),
    );
    check(
        "ffprobe",
        command_exists(&cfg.ffprobe_program),
        cfg.ffprobe_program.clone(),
    );
    check(
        "reaper",
        cfg.reaper_exe.exists() || command_exists(&cfg.reaper_exe.display().to_string()),
        cfg.reaper_exe.display().to_string(),
    );
    check(
        "template",
        cfg.template_path.exists(),
        cfg.template_path.display().to_string(),
    );
    check(
        "automation script",
        cfg.automation_script.exists(),
        cfg.automation_script.display().to_string(),
    );
    check(
        "isolation",
        true,
        if cfg.isolation_configured() {
            format!("configured ({})", cfg.isolation_base_url)
        } else {
            "not configured; isolation will be skipped".to_owned()
        },
    );

    if !healthy {
        std::process::exit(1);
    }
    Ok(())
}
