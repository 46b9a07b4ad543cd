//! Serial task runner for session lifecycle operations.
//!
//! UI callbacks are synchronous and must not block. They submit a
//! [`SessionTask`] here; one worker runs tasks in submission order against the
//! shared [`SessionManager`].

use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::SessionManager;
use crate::error::{Error, Result};

/// A lifecycle operation to run on the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionTask {
    /// `SessionManager::connect`
    Connect {
        /// Device address
        address: IpAddr,
        /// Probe strictly and wait for availability
        wait_for_ready: bool,
    },
    /// `SessionManager::auto_connect`
    AutoConnect,
    /// `SessionManager::disconnect`
    Disconnect,
    /// `SessionManager::start_pairing`
    StartPairing,
    /// `SessionManager::finish_pairing`
    FinishPairing(String),
    /// `SessionManager::reset_pairing`
    ResetPairing,
}

struct Job {
    task: SessionTask,
    done: Option<oneshot::Sender<Result<bool>>>,
}

/// Runs [`SessionTask`]s one at a time.
#[derive(Debug)]
pub struct SessionScheduler {
    sender: mpsc::UnboundedSender<Job>,
    worker: JoinHandle<()>,
}

impl SessionScheduler {
    /// Start the worker. Must be called inside a tokio runtime.
    #[must_use]
    pub fn spawn(manager: Arc<SessionManager>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();

        let worker = tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                tracing::debug!("Running {:?}", job.task);
                let result = run(&manager, job.task).await;
                if let Some(done) = job.done {
                    let _ = done.send(result);
                } else if let Err(e) = result {
                    tracing::debug!("Background task failed: {}", e);
                }
            }
            tracing::debug!("Session scheduler stopped");
        });

        Self { sender, worker }
    }

    /// Queue `task` and return immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker has stopped.
    pub fn submit(&self, task: SessionTask) -> Result<()> {
        self.send(task, None)
    }

    /// Queue `task` and get a receiver for its outcome.
    ///
    /// Connect tasks complete with whether the session connected; the others
    /// complete with `true`.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker has stopped.
    pub fn submit_with_completion(
        &self,
        task: SessionTask,
    ) -> Result<oneshot::Receiver<Result<bool>>> {
        let (done, receiver) = oneshot::channel();
        self.send(task, Some(done))?;
        Ok(receiver)
    }

    /// Queue `task` and wait for it.
    ///
    /// # Errors
    ///
    /// Returns the task's error, or an error if the worker has stopped.
    pub async fn run(&self, task: SessionTask) -> Result<bool> {
        self.submit_with_completion(task)?
            .await
            .map_err(|_| Error::Internal("session worker dropped task".to_string()))?
    }

    /// Stop accepting tasks and wait for queued ones to finish.
    pub async fn shutdown(self) {
        drop(self.sender);
        if let Err(e) = self.worker.await {
            tracing::warn!("Session worker ended abnormally: {}", e);
        }
    }

    fn send(&self, task: SessionTask, done: Option<oneshot::Sender<Result<bool>>>) -> Result<()> {
        self.sender
            .send(Job { task, done })
            .map_err(|_| Error::Internal("session worker stopped".to_string()))
    }
}

async fn run(manager: &SessionManager, task: SessionTask) -> Result<bool> {
    match task {
        SessionTask::Connect {
            address,
            wait_for_ready,
        } => Ok(manager.connect(address, wait_for_ready).await),
        SessionTask::AutoConnect => Ok(manager.auto_connect().await),
        SessionTask::Disconnect => {
            manager.disconnect().await;
            Ok(true)
        }
        SessionTask::StartPairing => manager.start_pairing().await.map(|()| true),
        SessionTask::FinishPairing(code) => manager.finish_pairing(&code).await.map(|()| true),
        SessionTask::ResetPairing => manager.reset_pairing().await.map(|()| true),
    }
}
