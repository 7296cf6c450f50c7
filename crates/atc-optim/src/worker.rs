//! Run an algorithm off the async runtime.
//!
//! The fleet moves into a blocking task together with the algorithm and
//! comes back through a single-slot completion queue, so nothing else can
//! touch it while the search runs.

use crate::algorithm::{Algorithm, AlgorithmHandle, Solution};
use crate::error::{OptimError, Result};
use atc_core::ConflictManager;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

/// What the worker hands back: the fleet, always, and the run's result.
pub struct RunOutcome {
    pub fleet: ConflictManager,
    pub result: Result<Solution>,
    pub process_time: Duration,
}

/// A running algorithm.
pub struct AlgorithmWorker {
    handle: AlgorithmHandle,
    receiver: mpsc::Receiver<RunOutcome>,
}

impl AlgorithmWorker {
    /// Start `algorithm` on `fleet` in a blocking task. Must be called
    /// from within a tokio runtime.
    pub fn spawn(mut algorithm: Box<dyn Algorithm>, mut fleet: ConflictManager) -> Self {
        let handle = algorithm.handle();
        let (sender, receiver) = mpsc::channel(1);
        let name = algorithm.name();

        tokio::task::spawn_blocking(move || {
            let result = algorithm.start(&mut fleet);
            let outcome = RunOutcome {
                fleet,
                result,
                process_time: algorithm.process_time(),
            };
            if sender.blocking_send(outcome).is_err() {
                tracing::warn!(algorithm = name, "run finished after its worker was dropped");
            }
        });

        Self { handle, receiver }
    }

    pub fn handle(&self) -> &AlgorithmHandle {
        &self.handle
    }

    /// Ask the run to stop; it still reports through `wait`.
    pub fn stop(&self) {
        self.handle.stop();
    }

    pub fn progress(&self) -> u8 {
        self.handle.progress()
    }

    /// Non-blocking check for completion.
    pub fn poll(&mut self) -> Result<Option<RunOutcome>> {
        match self.receiver.try_recv() {
            Ok(outcome) => Ok(Some(outcome)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(OptimError::WorkerDisconnected),
        }
    }

    /// Wait for the run to end.
    pub async fn wait(mut self) -> Result<RunOutcome> {
        self.receiver
            .recv()
            .await
            .ok_or(OptimError::WorkerDisconnected)
    }
}
