// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The frame analysis worker.
//
// A dedicated OS thread that waits on the latest-frame slot, analyses each
// frame it picks up while analysis is enabled, reports every result to the
// sink, and posts verified documents to the orchestrator. Frames that arrive
// while one is being analysed overwrite each other in the slot; only the
// newest is analysed next.

use std::sync::Arc;
use std::thread::JoinHandle;

use idgate_bridge::ResultSink;
use idgate_core::error::{IdGateError, Result};
use idgate_core::{Frame, PixelRect};
use idgate_vision::FrameAnalyzer;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use crate::runtime::Command;
use crate::state::Event;

pub(crate) struct WorkerChannels {
    pub(crate) frames: watch::Receiver<Option<Arc<Frame>>>,
    pub(crate) analysis_enabled: watch::Receiver<bool>,
    pub(crate) roi: watch::Receiver<Option<PixelRect>>,
    pub(crate) events: mpsc::UnboundedSender<Command>,
}

pub(crate) fn spawn_worker(
    runtime: Handle,
    mut analyzer: FrameAnalyzer,
    channels: WorkerChannels,
    sink: Arc<dyn ResultSink>,
) -> Result<JoinHandle<()>> {
    let WorkerChannels {
        mut frames,
        analysis_enabled,
        roi,
        events,
    } = channels;

    std::thread::Builder::new()
        .name("idgate-analysis".into())
        .spawn(move || {
            info!("Analysis worker started");
            // Ends when the frame slot's sender is dropped.
            while runtime.block_on(frames.changed()).is_ok() {
                let Some(frame) = frames.borrow_and_update().clone() else {
                    continue;
                };
                if !*analysis_enabled.borrow() {
                    trace!("Analysis disabled; frame skipped");
                    continue;
                }

                analyzer.set_region_of_interest(*roi.borrow());
                let analysis = match analyzer.analyze(&frame) {
                    Ok(analysis) => analysis,
                    Err(err) => {
                        warn!(error = %err, "Frame analysis failed");
                        continue;
                    }
                };
                sink.on_validation_result(&analysis.result);

                if let Some(document) = analysis.rectified {
                    debug!("Posting verified document to orchestrator");
                    let event = Event::FrameValidated {
                        document: Arc::new(document),
                    };
                    if events.send(Command::Event(event)).is_err() {
                        break;
                    }
                }
            }
            info!("Analysis worker stopped");
        })
        .map_err(|err| IdGateError::Worker(format!("failed to spawn analysis thread: {err}")))
}
