use axum::Json;
use axum::extract::{FromRef, State};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::Result;
use crate::router::Valid;
use crate::service::AccountService;
use crate::service::account::Profile;

pub const TOKEN_TYPE: &str = "Bearer";

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(length(min = 1, max = 64, message = "Name must contain 1 to 64 characters."))]
    name: String,
    #[validate(length(min = 1, max = 255, message = "Secret is required."))]
    secret: String,
}

#[derive(Debug, Serialize)]
pub struct Response {
    pub token_type: String,
    pub token: String,
    pub expires_in: i64,
    pub user: Profile,
}

/// Handler of `POST /login`.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<Json<Response>> {
    let accounts = AccountService::from_ref(&state);
    let user = accounts.authenticate(&body.name, &body.secret).await?;
    let token = state
        .token
        .create(user.id(), user.role(), state.clock.now())?;

    tracing::info!(user_id = %user.id(), role = %user.role(), "user logged in");

    Ok(Json(Response {
        token_type: TOKEN_TYPE.to_owned(),
        token,
        expires_in: state.token.access_ttl().num_seconds(),
        user: Profile::from(&user),
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use super::*;
    use crate::domain::{Role, Standing};
    use crate::router::tests::json_body;
    use crate::token::Purpose;
    use crate::{app, make_request, seed_user, test_state};

    #[tokio::test]
    async fn test_login_handler() {
        let (state, _) = test_state();
        let alice = seed_user(&state, "alice", Role::Normal, Standing::default()).await;

        let response = make_request(
            None,
            app(state.clone()),
            Method::POST,
            "/login",
            json!({ "name": "alice", "secret": "alice" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["token_type"], TOKEN_TYPE);
        assert_eq!(body["user"]["id"], alice.to_string());
        assert_eq!(body["user"]["standing"]["reputation"], 300);

        let token = body["token"].as_str().unwrap();
        let claims = state.token.decode(token, Purpose::Access).unwrap();
        assert_eq!(claims.sub, alice.to_string());
    }

    #[tokio::test]
    async fn test_login_rejections() {
        let (state, _) = test_state();
        seed_user(&state, "alice", Role::Normal, Standing::default()).await;
        let app = app(state);

        let response = make_request(
            None,
            app.clone(),
            Method::POST,
            "/login",
            json!({ "name": "alice", "secret": "wrong" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = make_request(
            None,
            app,
            Method::POST,
            "/login",
            json!({ "name": "", "secret": "alice" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
