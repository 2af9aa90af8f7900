// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Cancellable attempt deadlines.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::runtime::Command;
use crate::state::{Event, TimerKind};

/// Sleep tasks that post `TimerExpired` back to the orchestrator.
#[derive(Debug, Default)]
pub(crate) struct TimerSet {
    handles: Vec<JoinHandle<()>>,
}

impl TimerSet {
    /// Arm `timer` for `attempt`, firing after `after`.
    pub(crate) fn arm(
        &mut self,
        attempt: u64,
        timer: TimerKind,
        after: Duration,
        events: UnboundedSender<Command>,
    ) {
        self.handles.retain(|h| !h.is_finished());
        debug!(attempt, ?timer, after_ms = after.as_millis() as u64, "Timer armed");
        self.handles.push(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = events.send(Command::Event(Event::TimerExpired { attempt, timer }));
        }));
    }

    /// Abort every pending timer. An aborted timer never posts its event.
    pub(crate) fn cancel_all(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }

    pub(crate) fn pending(&self) -> usize {
        self.handles.iter().filter(|h| !h.is_finished()).count()
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
