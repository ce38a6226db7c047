//! Kiosk session: who is logged in at a station.

use chrono::{DateTime, Duration, Utc};

use crate::domain::error::{DomainError, Result};
use crate::domain::user::{Actor, Role};

pub const DEFAULT_IDLE_TIMEOUT_SECS: i64 = 20;
pub const MAX_IDLE_TIMEOUT_SECS: i64 = 86_400;

/// Transient, per-station login state.
///
/// Normal users expire after `idle_timeout` without activity. Managers stay
/// logged in until the next user scan or an explicit logout.
#[derive(Debug, Clone)]
pub struct KioskSession {
    idle_timeout: Duration,
    current: Option<(Actor, DateTime<Utc>)>,
}

impl Default for KioskSession {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_IDLE_TIMEOUT_SECS))
    }
}

impl KioskSession {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            idle_timeout,
            current: None,
        }
    }

    /// Replace whoever is logged in.
    pub fn login(&mut self, actor: Actor, now: DateTime<Utc>) {
        self.current = Some((actor, now));
    }

    pub fn logout(&mut self) -> Option<Actor> {
        self.current.take().map(|(actor, _)| actor)
    }

    fn is_expired(&self, role: Role, last_seen: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        role == Role::Normal && now - last_seen > self.idle_timeout
    }

    /// Current actor, dropping an idle normal user.
    pub fn current(&mut self, now: DateTime<Utc>) -> Option<&Actor> {
        if let Some((actor, last_seen)) = &self.current {
            if self.is_expired(actor.role, *last_seen, now) {
                tracing::debug!(user_id = %actor.id, "kiosk session expired");
                self.current = None;
            }
        }
        self.current.as_ref().map(|(actor, _)| actor)
    }

    /// Current actor, failing when nobody is logged in.
    pub fn require(&mut self, now: DateTime<Utc>) -> Result<Actor> {
        self.current(now).cloned().ok_or(DomainError::NoActiveSession)
    }

    /// Record activity of the current actor.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if let Some((_, last_seen)) = &mut self.current {
            *last_seen = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::id::UserId;

    fn actor(role: Role) -> Actor {
        Actor {
            id: UserId::parse("d".repeat(64)).unwrap(),
            name: "dana".into(),
            role,
        }
    }

    #[test]
    fn test_normal_user_idles_out() {
        let start = Utc::now();
        let mut session = KioskSession::default();
        assert_eq!(session.require(start), Err(DomainError::NoActiveSession));

        session.login(actor(Role::Normal), start);
        assert!(session.current(start + Duration::seconds(20)).is_some());
        assert!(session.current(start + Duration::seconds(21)).is_none());
        // Expiry is sticky.
        assert!(session.current(start).is_none());
    }

    #[test]
    fn test_touch_extends() {
        let start = Utc::now();
        let mut session = KioskSession::default();
        session.login(actor(Role::Normal), start);
        session.touch(start + Duration::seconds(15));
        assert!(session.current(start + Duration::seconds(30)).is_some());
    }

    #[test]
    fn test_manager_never_idles_out() {
        let start = Utc::now();
        let mut session = KioskSession::default();
        session.login(actor(Role::Manager), start);
        assert!(session.current(start + Duration::hours(5)).is_some());
        assert_eq!(session.logout().map(|a| a.role), Some(Role::Manager));
        assert!(session.current(start).is_none());
    }
}
