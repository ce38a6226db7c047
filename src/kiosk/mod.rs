//! Kiosk station: QR scan dispatch over the disposal services.
//!
//! Scanning a user card starts a session. Scanning a bag then acts as the
//! logged in user: normal users dispose of it, managers check it.

mod worker;

use std::sync::Arc;

use axum::extract::FromRef;
use chrono::Duration;
use parking_lot::Mutex;

pub use worker::{SYSTEM_ERROR, Task, TaskError, Worker};

use crate::AppState;
use crate::domain::qr::ScanTarget;
use crate::domain::session::{KioskSession, MAX_IDLE_TIMEOUT_SECS};
use crate::domain::user::{CheckOutcome, ThrowOutcome};
use crate::domain::{Actor, Category, DomainError, Role};
use crate::error::Result;
use crate::repository::Clock;
use crate::service::{AccountService, DisposalService};

/// What the person at the station means to do with the next bag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Sorted into this category by a normal user.
    Dispose(Category),
    /// Verdict of a manager.
    Check(bool),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    LoggedIn(Actor),
    Disposed(ThrowOutcome),
    Checked(CheckOutcome),
}

/// One physical station.
pub struct Station {
    accounts: AccountService,
    disposal: DisposalService,
    clock: Arc<dyn Clock>,
    location: String,
    session: Mutex<KioskSession>,
}

impl Station {
    /// Station configured by the `kiosk` entry of `config.yaml`.
    pub fn new(state: &AppState) -> Self {
        let kiosk = &state.config.kiosk;
        Self {
            accounts: AccountService::from_ref(state),
            disposal: DisposalService::from_ref(state),
            clock: Arc::clone(&state.clock),
            location: kiosk.location.clone(),
            session: Mutex::new(KioskSession::new(Duration::seconds(
                kiosk.idle_timeout.clamp(1, MAX_IDLE_TIMEOUT_SECS),
            ))),
        }
    }

    /// Logged in actor, if the session has not expired.
    pub fn current(&self) -> Option<Actor> {
        self.session.lock().current(self.clock.now()).cloned()
    }

    pub fn logout(&self) -> Option<Actor> {
        let actor = self.session.lock().logout();
        if let Some(actor) = &actor {
            tracing::info!(user_id = %actor.id, location = %self.location, "kiosk logout");
        }
        actor
    }

    /// Handle one scanned payload.
    pub async fn scan(&self, payload: &str, intent: Option<Intent>) -> Result<ScanOutcome> {
        match ScanTarget::parse(payload)? {
            ScanTarget::User(id) => {
                let actor = self.accounts.find(&id).await?.actor();
                self.session.lock().login(actor.clone(), self.clock.now());
                tracing::info!(user_id = %actor.id, role = %actor.role, location = %self.location, "kiosk login");
                Ok(ScanOutcome::LoggedIn(actor))
            },
            ScanTarget::Bag(bag) => {
                let actor = self.session.lock().require(self.clock.now())?;

                let outcome = match (actor.role, intent) {
                    (Role::Normal, Some(Intent::Dispose(category))) => ScanOutcome::Disposed(
                        self.disposal
                            .throw(&actor.id, bag, category, &self.location)
                            .await?,
                    ),
                    (Role::Manager, Some(Intent::Check(is_correct))) => ScanOutcome::Checked(
                        self.disposal.check(&actor.id, bag, is_correct).await?,
                    ),
                    (Role::Normal, _) => return Err(DomainError::MissingIntent("category").into()),
                    (Role::Manager, _) => return Err(DomainError::MissingIntent("verdict").into()),
                };

                self.session.lock().touch(self.clock.now());
                Ok(outcome)
            },
        }
    }
}
