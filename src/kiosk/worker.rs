//! Background execution of station actions.
//!
//! A station never blocks its UI on storage: each action runs on a tokio
//! task and the UI keeps a [`Task`] handle to await, poll or cancel it.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{Intent, ScanOutcome, Station};
use crate::error::ServerError;

/// Message shown for faults the user cannot act on.
pub const SYSTEM_ERROR: &str = "system error";

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("action cancelled")]
    Cancelled,
    #[error(transparent)]
    Failed(#[from] ServerError),
    #[error("system error")]
    Panicked,
}

impl TaskError {
    /// Text for the station screen. Server faults are not detailed.
    pub fn user_message(&self) -> String {
        match self {
            Self::Failed(err) if err.status().is_server_error() => SYSTEM_ERROR.to_owned(),
            Self::Panicked => SYSTEM_ERROR.to_owned(),
            err => err.to_string(),
        }
    }
}

/// Handle on a running action. Dropping it cancels the action.
#[derive(Debug)]
pub struct Task<T> {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<Result<T, TaskError>>,
}

impl<T> Task<T> {
    /// Ask the action to stop at its next await point.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the action to end.
    pub async fn join(mut self) -> Result<T, TaskError> {
        match (&mut self.handle).await {
            Ok(result) => result,
            Err(err) if err.is_panic() => {
                tracing::error!(error = %err, "kiosk action panicked");
                Err(TaskError::Panicked)
            },
            Err(_) => Err(TaskError::Cancelled),
        }
    }
}

/// Runs station actions off the caller's task.
#[derive(Clone)]
pub struct Worker {
    station: Arc<Station>,
}

impl Worker {
    pub fn new(station: Arc<Station>) -> Self {
        Self { station }
    }

    pub fn station(&self) -> &Arc<Station> {
        &self.station
    }

    /// Run `action` on a new task.
    pub fn spawn<T, F>(action: F) -> Task<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, ServerError>> + Send + 'static,
    {
        let (cancel, mut cancelled) = watch::channel(false);

        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancelled.wait_for(|cancelled| *cancelled) => {
                    tracing::debug!("kiosk action cancelled");
                    Err(TaskError::Cancelled)
                },
                result = action => result.map_err(|err| {
                    if err.status().is_server_error() {
                        tracing::error!(error = %err, "kiosk action failed");
                    } else {
                        tracing::info!(error = %err, "kiosk action rejected");
                    }
                    TaskError::Failed(err)
                }),
            }
        });

        Task { cancel, handle }
    }

    /// Scan `payload` on the station in the background.
    pub fn scan(&self, payload: impl Into<String>, intent: Option<Intent>) -> Task<ScanOutcome> {
        let station = Arc::clone(&self.station);
        let payload = payload.into();
        Self::spawn(async move { station.scan(&payload, intent).await })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::{DomainError, Role, Standing};
    use crate::domain::qr::ScanTarget;
    use crate::{seed_user, test_state};

    #[tokio::test]
    async fn test_join_success() {
        let task = Worker::spawn(async { Ok(7) });
        assert_eq!(task.join().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_cancel_pending_action() {
        let task = Worker::spawn(std::future::pending::<Result<(), ServerError>>());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!task.is_finished());

        task.cancel();
        assert!(matches!(task.join().await, Err(TaskError::Cancelled)));
    }

    #[tokio::test]
    async fn test_failures_are_typed() {
        let task = Worker::spawn(async {
            Err::<(), _>(ServerError::from(DomainError::NoActiveSession))
        });
        let err = task.join().await.unwrap_err();
        assert_eq!(err.user_message(), "no user is logged in at this station");

        let task = Worker::spawn(async {
            Err::<(), _>(ServerError::Internal {
                details: "connection reset".into(),
                source: None,
            })
        });
        assert_eq!(task.join().await.unwrap_err().user_message(), SYSTEM_ERROR);
    }

    #[tokio::test]
    async fn test_panic_is_system_error() {
        let task = Worker::spawn(async {
            if true {
                panic!("boom");
            }
            Ok(())
        });
        let err = task.join().await.unwrap_err();
        assert!(matches!(err, TaskError::Panicked));
        assert_eq!(err.user_message(), SYSTEM_ERROR);
    }

    #[tokio::test]
    async fn test_scan_in_background() {
        let (state, _) = test_state();
        let alice = seed_user(&state, "alice", Role::Normal, Standing::default()).await;
        let worker = Worker::new(Arc::new(Station::new(&state)));

        let outcome = worker
            .scan(ScanTarget::User(alice.clone()).to_string(), None)
            .join()
            .await
            .unwrap();
        assert!(matches!(outcome, ScanOutcome::LoggedIn(actor) if actor.id == alice));
        assert_eq!(worker.station().current().map(|actor| actor.id), Some(alice));
    }
}
