//! Per-candidate history tracking
//!
//! One tracker follows one cache-from image through the build, instruction
//! by instruction. Matching is monotonic: a layer's identity depends on
//! its entire ancestry, not the local diff alone, so once a build diverges
//! from the candidate's history the tracker closes and stays closed — no
//! retry after divergence is meaningful.

use crate::history::HistoryStep;
use crate::image::DiffId;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};

/// A confirmed match for one instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerHit {
    /// Layer the build can reuse instead of executing the instruction
    pub resulting: DiffId,

    /// When the candidate originally committed that layer
    pub created_at: DateTime<Utc>,
}

/// Sequential matcher over one candidate's derived history steps
#[derive(Debug)]
pub struct TrackerCore {
    steps: Vec<HistoryStep>,
    cursor: usize,
    emitted: Vec<DiffId>,
    closed: bool,
}

impl TrackerCore {
    pub fn new(steps: Vec<HistoryStep>) -> Self {
        Self {
            steps,
            cursor: 0,
            emitted: Vec::new(),
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Match one instruction against the candidate's next step.
    ///
    /// A match requires the command text to equal the step's, and the
    /// build's accumulated layer chain to equal everything this tracker
    /// has emitted so far — the prefix accumulates across steps, it is not
    /// the step's own source layer. Any mismatch, or running out of
    /// steps, closes the tracker for the remainder of the build.
    pub fn ask(&mut self, command: &str, preceding: &[DiffId]) -> Option<TrackerHit> {
        if self.closed {
            return None;
        }

        let Some(step) = self.steps.get(self.cursor).cloned() else {
            self.closed = true;
            return None;
        };

        if step.command != command || self.emitted.as_slice() != preceding {
            self.closed = true;
            return None;
        }

        self.cursor += 1;
        // an instruction that adds no layer does not grow the chain; an
        // empty chain's tail is the empty-layer digest
        let tail = self.emitted.last().unwrap_or(DiffId::empty_layer());
        if *tail != step.resulting {
            self.emitted.push(step.resulting.clone());
        }

        Some(TrackerHit {
            resulting: step.resulting,
            created_at: step.created_at,
        })
    }
}

/// One ask in flight to a tracker task
struct AskRequest {
    command: String,
    preceding: Vec<DiffId>,
    reply: oneshot::Sender<Option<TrackerHit>>,
}

/// Handle to a spawned tracker task
///
/// The task exclusively owns its [`TrackerCore`]; many trackers answer
/// concurrently without cross-tracker coordination. Dropping the handle
/// drops the request channel and stops the task.
pub(crate) struct TrackerHandle {
    /// Cache-from reference as the user declared it
    pub(crate) source: String,
    tx: mpsc::Sender<AskRequest>,
    closed: bool,
}

impl TrackerHandle {
    /// Spawn a task owning `core`, answering asks over a private channel
    pub(crate) fn spawn(source: String, mut core: TrackerCore) -> Self {
        let (tx, mut rx) = mpsc::channel::<AskRequest>(1);
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let answer = core.ask(&request.command, &request.preceding);
                let _ = request.reply.send(answer);
                if core.is_closed() {
                    break;
                }
            }
        });

        Self {
            source,
            tx,
            closed: false,
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        !self.closed
    }

    /// Mark the tracker as permanently out of the running
    pub(crate) fn close(&mut self) {
        self.closed = true;
    }

    /// Send one ask and return the receiver its answer will arrive on.
    /// `None` when the task is already gone.
    pub(crate) async fn ask(
        &mut self,
        command: &str,
        preceding: &[DiffId],
    ) -> Option<oneshot::Receiver<Option<TrackerHit>>> {
        let (reply, rx) = oneshot::channel();
        let request = AskRequest {
            command: command.to_string(),
            preceding: preceding.to_vec(),
            reply,
        };

        if self.tx.send(request).await.is_err() {
            self.closed = true;
            return None;
        }
        Some(rx)
    }
}
