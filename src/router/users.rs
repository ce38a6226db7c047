//! Users-related HTTP API.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router, middleware};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::AppState;
use crate::crypto::Credentials;
use crate::domain::{Actor, Role, Standing, UserId};
use crate::error::Result;
use crate::repository::RankEntry;
use crate::router::{Valid, auth, limit, require_manager};
use crate::service::AccountService;
use crate::service::account::{CreatedUser, Profile};

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // `POST /users` goes to `create`. Managers only.
        .route("/", post(create))
        .route("/@me", get(me))
        // `GET /users/:ID` goes to `get`.
        .route("/{user_id}", get(get_user).delete(delete_user))
        .route_layer(middleware::from_fn_with_state(state, auth))
}

#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = "validate_credentials"))]
pub struct CreateBody {
    role: Role,
    #[validate(length(min = 1, max = 64, message = "Name must contain 1 to 64 characters."))]
    name: Option<String>,
    #[validate(length(min = 4, max = 255, message = "Secret must contain at least 4 characters."))]
    secret: Option<String>,
    #[validate(range(min = 0, message = "Score cannot be negative."))]
    score: Option<i64>,
    #[validate(range(min = 5, max = 1000, message = "Reputation must be between 5 and 1000."))]
    reputation: Option<i32>,
}

fn validate_credentials(body: &CreateBody) -> std::result::Result<(), ValidationError> {
    if body.name.is_some() != body.secret.is_some() {
        return Err(ValidationError::new("credentials")
            .with_message("Name and secret go together.".into()));
    }
    if body.role == Role::Manager && (body.score.is_some() || body.reputation.is_some()) {
        return Err(ValidationError::new("standing")
            .with_message("Managers have no score nor reputation.".into()));
    }
    Ok(())
}

async fn create(
    State(accounts): State<AccountService>,
    Extension(actor): Extension<Actor>,
    Valid(body): Valid<CreateBody>,
) -> Result<(StatusCode, Json<CreatedUser>)> {
    require_manager(&actor, "create users")?;

    let credentials = body
        .name
        .zip(body.secret)
        .map(|(name, secret)| Credentials { name, secret });
    let standing = (body.score.is_some() || body.reputation.is_some()).then(|| {
        let default = Standing::default();
        Standing {
            score: body.score.unwrap_or(default.score),
            reputation: body.reputation.unwrap_or(default.reputation),
            rolling_count: 0,
        }
    });

    let created = accounts.create(body.role, credentials, standing).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn me(
    State(accounts): State<AccountService>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Profile>> {
    let user = accounts.find(&actor.id).await?;
    Ok(Json(Profile::from(&user)))
}

async fn get_user(
    State(accounts): State<AccountService>,
    Path(user_id): Path<String>,
) -> Result<Json<Profile>> {
    let user = accounts.find(&UserId::parse(&user_id)?).await?;
    Ok(Json(Profile::from(&user)))
}

async fn delete_user(
    State(accounts): State<AccountService>,
    Extension(actor): Extension<Actor>,
    Path(user_id): Path<String>,
) -> Result<StatusCode> {
    require_manager(&actor, "delete users")?;

    accounts.delete(&UserId::parse(&user_id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct RankingQuery {
    limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct Ranking {
    users: Vec<RankEntry>,
    total: u64,
}

/// Public ranking of normal users by reputation, then score.
pub async fn ranking(
    State(accounts): State<AccountService>,
    query: std::result::Result<Query<RankingQuery>, QueryRejection>,
) -> Result<Json<Ranking>> {
    let Query(query) = query?;

    Ok(Json(Ranking {
        users: accounts.ranking(limit(query.limit)).await?,
        total: accounts.count(Role::Normal).await?,
    }))
}
