// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// idgate — replay camera frames through a document validation session.
//
// Entry point. Initialises logging, builds the reference template and frame
// analyzer, starts the orchestrator, feeds it the given frames at camera pace
// and reports the final outcome in plain language.

mod frames;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use idgate_bridge::{FixedTextExtractor, TextExtractor, default_result_sink, default_text_extractor};
use idgate_core::error::{IdGateError, Result};
use idgate_core::human_messages::{HumanMessage, Severity, humanize_error, humanize_outcome};
use idgate_core::{GateConfig, PixelRect, Rotation, SessionOutcome};
use idgate_session::{Orchestrator, OrchestratorHandle};
use idgate_vision::FrameAnalyzer;
use tracing::{info, warn};

/// Validate identity document frames against a reference template
#[derive(Parser, Debug)]
#[command(name = "idgate", version)]
#[command(about = "Detects, rectifies and verifies an identity card in camera frames")]
struct Args {
    /// Reference image of the document type
    #[arg(long, required_unless_present = "write_default_config")]
    template: Option<PathBuf>,

    /// JSON configuration file (defaults are used when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sensor rotation in degrees clockwise (0, 90, 180 or 270)
    #[arg(long, default_value_t = 0)]
    rotation: u32,

    /// Pause between frames, in milliseconds
    #[arg(long, default_value_t = 33)]
    frame_interval_ms: u64,

    /// Restrict detection to x,y,w,h in upright frame coordinates
    #[arg(long, value_parser = frames::parse_roi)]
    roi: Option<PixelRect>,

    /// Write the default configuration to this path and exit
    #[arg(long)]
    write_default_config: Option<PathBuf>,

    /// Use a local extractor that accepts every document
    #[arg(long)]
    accept_extraction: bool,

    /// Frame images, in capture order
    frames: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(code) => code,
        Err(err) => {
            let message = humanize_error(&err);
            print_message(&message);
            if message.severity == Severity::Fatal {
                tracing::error!(error = %err, "idgate failed");
                ExitCode::FAILURE
            } else {
                warn!(error = %err, "idgate stopped early");
                ExitCode::from(2)
            }
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    if let Some(path) = &args.write_default_config {
        GateConfig::default().save(path)?;
        println!("Default configuration written to {}", path.display());
        return Ok(ExitCode::SUCCESS);
    }

    let config = match &args.config {
        Some(path) => GateConfig::load(path)?,
        None => GateConfig::default(),
    };
    let template = args
        .template
        .as_ref()
        .ok_or_else(|| IdGateError::Config("--template is required".into()))?;
    let rotation = Rotation::try_from(args.rotation)?;

    info!(template = %template.display(), frames = args.frames.len(), "idgate starting");
    let analyzer = FrameAnalyzer::open(&config, template)?;

    let extractor: Arc<dyn TextExtractor> = if args.accept_extraction {
        Arc::new(FixedTextExtractor::accepting())
    } else {
        default_text_extractor()
    };
    let mut handle = Orchestrator::new(config.session, extractor, default_result_sink()).spawn();
    handle.start_worker(analyzer)?;
    handle.update_region_of_interest(args.roi);

    let outcome = replay(&handle, &args, rotation, &config).await;
    handle.shutdown().await?;

    match outcome? {
        Some(outcome) => {
            info!(session = %outcome.session(), "Session finished");
            print_message(&humanize_outcome(&outcome));
            Ok(match outcome {
                SessionOutcome::Validated { .. } => ExitCode::SUCCESS,
                SessionOutcome::RetriesExhausted { .. } => ExitCode::from(2),
            })
        }
        None => {
            println!("No document was validated in the given frames.");
            Ok(ExitCode::from(2))
        }
    }
}

/// Feed every frame, then give an attempt still in flight time to finish.
async fn replay(
    handle: &OrchestratorHandle,
    args: &Args,
    rotation: Rotation,
    config: &GateConfig,
) -> Result<Option<SessionOutcome>> {
    let interval = Duration::from_millis(args.frame_interval_ms);
    let outcomes = handle.outcomes();

    for (index, path) in args.frames.iter().enumerate() {
        if outcomes.borrow().is_some() {
            break;
        }
        let frame = match frames::load_frame(path, rotation, interval * index as u32) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Skipping unreadable frame");
                continue;
            }
        };
        if index == 0 {
            if let Some(roi) = args.roi {
                if !frames::roi_overlaps(roi, &frame) {
                    warn!(?roi, "Region of interest lies outside the frame; nothing will be detected");
                }
            }
        }
        handle.submit_frame(frame)?;
        tokio::time::sleep(interval).await;
    }

    // The worker may still hold the last frame.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let settle = Duration::from_millis(
        config.session.identity_timeout_ms + config.session.extraction_timeout_ms,
    );
    let mut state = handle.subscribe();
    let _ = tokio::time::timeout(settle, state.wait_for(|s| !s.stage.is_processing())).await;

    Ok(outcomes.borrow().clone())
}

fn print_message(message: &HumanMessage) {
    println!("{}", message.message);
    println!("  {}", message.suggestion);
}
