use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::EngineConfig;
use crate::document::ScriptDocument;
use crate::frame::RenderFrame;
use crate::invoker::TickOutcome;
use crate::run_report::RunReport;
use crate::script_diagnostics::Diagnostic;
use crate::script_state::{MessageKey, ScriptState};
use crate::source::{digest_text, ScriptSource};
use crate::state_machine::ScriptStateMachine;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a script and check its Main entry point
    Check {
        /// Rhai script file
        script: PathBuf,

        /// Engine config JSON file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Compile a script and run it as a post effect over a simulated batch render
    Run {
        /// Rhai script file
        script: PathBuf,

        /// Number of frames to tick
        #[arg(long, default_value_t = 100)]
        frames: u64,

        /// Frames per second
        #[arg(long, default_value_t = 25.0)]
        fps: f32,

        /// Frame width
        #[arg(long, default_value_t = 1920)]
        width: u32,

        /// Frame height
        #[arg(long, default_value_t = 1080)]
        height: u32,

        /// Engine config JSON file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write a JSON run report to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

/// What `check` prints.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckOutput<'a> {
    state: &'a ScriptState,
    message_key: MessageKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    diagnostic: Option<&'a Diagnostic>,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { script, config } => {
            let ok = check(&script, load_config(config.as_deref())?)?;
            if !ok {
                std::process::exit(1);
            }
        }
        Commands::Run { script, frames, fps, width, height, config, report } => {
            let config = load_config(config.as_deref())?;
            let ok = run_batch(&script, config, frames, fps, width, height, report.as_deref())?;
            if !ok {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => Ok(EngineConfig::from_file(path)?),
        None => Ok(EngineConfig::default()),
    }
}

fn load_script(path: &Path) -> Result<ScriptSource> {
    ScriptSource::load(path).with_context(|| format!("Failed to read script {:?}", path))
}

fn check(script: &Path, config: EngineConfig) -> Result<bool> {
    let mut machine = ScriptStateMachine::with_config(config);
    machine.set_source(load_script(script)?);
    let state = machine.compile_now();

    let output = CheckOutput {
        state,
        message_key: state.message_key(),
        diagnostic: state.diagnostic(),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(state.can_run())
}

fn run_batch(
    script: &Path,
    config: EngineConfig,
    frames: u64,
    fps: f32,
    width: u32,
    height: u32,
    report_path: Option<&Path>,
) -> Result<bool> {
    let source = load_script(script)?;
    let mut report = RunReport::new(script, digest_text(source.text()), frames);

    let doc = ScriptDocument::new(config);
    doc.set_source(source);
    doc.request_compile().wait();

    let ok = match doc.request_run() {
        Ok(()) => {
            println!("Running {} frames at {} fps...", frames, fps);
            for i in 0..frames {
                let frame = RenderFrame::new(i, fps, width, height);
                match doc.tick(&frame) {
                    TickOutcome::Faulted(diag) => {
                        eprintln!("Frame {}: {}", i, diag);
                        break;
                    }
                    TickOutcome::Idle => break,
                    TickOutcome::Busy | TickOutcome::Completed(_) => {}
                }

                if i % 25 == 0 {
                    print!(".");
                    use std::io::Write;
                    std::io::stdout().flush()?;
                }
            }
            println!();
            !matches!(doc.current_state(), ScriptState::RuntimeError(_))
        }
        Err(err) => {
            let state = doc.current_state();
            eprintln!("Script not runnable ({}): {}", state.message_key().as_str(), err);
            if let Some(diag) = state.diagnostic() {
                eprintln!("{}", diag);
            }
            false
        }
    };

    let stats = doc.stats();
    report.frames_invoked = stats.invocations;
    report.faults = stats.faults;
    if let Some(unit_diags) = doc.with_machine(|m| m.compiled_unit().map(|u| u.diagnostics().to_vec())) {
        report.diagnostics = unit_diags;
    }
    report.finish(doc.current_state());
    println!(
        "Done: {} of {} frames invoked, state {} ({:.2}s)",
        report.frames_invoked,
        frames,
        report.final_state.name(),
        report.duration_secs()
    );

    if let Some(path) = report_path {
        report.save(path).map_err(anyhow::Error::msg)?;
    }
    Ok(ok)
}
