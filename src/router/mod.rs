//! HTTP routes.

pub mod garbage;
pub mod login;
pub mod status;
pub mod store;
pub mod users;

use axum::extract::{FromRef, FromRequest, Request, State};
use axum::http::header;
use axum::response::Response;
use axum::{Json, middleware};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::AppState;
use crate::domain::{Actor, DomainError, Role, UserId};
use crate::error::{Result, ServerError};
use crate::service::AccountService;
use crate::token::Purpose;

const BEARER: &str = "Bearer ";
/// Highest `limit` accepted on listing routes.
pub const MAX_LIMIT: u32 = 200;

/// JSON body checked with [`validator`] before reaching the handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct Valid<T>(pub T);

impl<T, S> FromRequest<S> for Valid<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Valid(value))
    }
}

/// Custom middleware for authentification.
///
/// Inserts the calling [`Actor`] as a request extension.
pub async fn auth(
    State(state): State<AppState>,
    mut req: Request,
    next: middleware::Next,
) -> Result<Response> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix(BEARER))
        .ok_or(ServerError::Unauthorized)?;

    let claims = state.token.decode(token, Purpose::Access)?;
    let id = UserId::parse(&claims.sub).map_err(|_| ServerError::Unauthorized)?;

    // Removed users lose access at once.
    let user = match AccountService::from_ref(&state).find(&id).await {
        Ok(user) => user,
        Err(ServerError::NotFound(_)) => return Err(ServerError::Unauthorized),
        Err(err) => return Err(err),
    };

    req.extensions_mut().insert::<Actor>(user.actor());
    Ok(next.run(req).await)
}

/// Refuse `action` to anyone but managers.
pub fn require_manager(actor: &Actor, action: &'static str) -> Result<()> {
    if actor.role == Role::Manager {
        Ok(())
    } else {
        Err(DomainError::RoleNotSupported {
            role: actor.role,
            action,
        }
        .into())
    }
}

/// Listing size from an optional `limit` query parameter.
pub fn limit(requested: Option<u32>) -> u32 {
    requested
        .unwrap_or(crate::service::DEFAULT_LIMIT)
        .clamp(1, MAX_LIMIT)
}

#[cfg(test)]
pub(crate) mod tests {
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;

    use super::*;
    use crate::domain::Standing;
    use crate::repository::Clock;
    use crate::{app, make_request, seed_user, test_state};

    /// Access token for `id`.
    pub fn bearer(state: &AppState, id: &UserId, role: Role) -> String {
        state
            .token
            .create(id, role, state.clock.now())
            .expect("cannot sign token")
    }

    /// Collect a JSON response body.
    pub async fn json_body(response: axum::http::Response<axum::body::Body>) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_auth_rejects_bad_tokens() {
        let (state, _) = test_state();
        let app = app(state.clone());

        let response =
            make_request(None, app.clone(), Method::GET, "/users/@me", String::new()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = make_request(
            Some("not.a.token"),
            app.clone(),
            Method::GET,
            "/users/@me",
            String::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // Signed, but for a user that does not exist.
        let ghost = UserId::parse("e".repeat(64)).unwrap();
        let token = bearer(&state, &ghost, Role::Normal);
        let response =
            make_request(Some(&token), app, Method::GET, "/users/@me", String::new()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_order_token_is_not_an_access_token() {
        let (state, clock) = test_state();
        let alice = seed_user(&state, "alice", Role::Normal, Standing::default()).await;
        let token = state.token.create_order(&alice, 1, clock.now()).unwrap();

        let response = make_request(
            Some(&token),
            app(state),
            Method::GET,
            "/users/@me",
            String::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_limit() {
        assert_eq!(limit(None), crate::service::DEFAULT_LIMIT);
        assert_eq!(limit(Some(0)), 1);
        assert_eq!(limit(Some(10_000)), MAX_LIMIT);
    }
}
