//! Garbage bags HTTP API: printing, disposal and verification.

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router, middleware};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::config::Configuration;
use crate::domain::user::{CheckOutcome, ThrowOutcome};
use crate::domain::{Actor, BagId, BagState, Category, GarbageBag};
use crate::error::Result;
use crate::repository::DeleteScope;
use crate::router::{Valid, auth, limit, require_manager};
use crate::service::admin::{MAX_BATCH, PrintedBag};
use crate::service::{AdminService, DisposalService};

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", post(create).delete(delete_all))
        .route("/pending", get(pending))
        .route("/{bag_id}", get(get_bag).delete(delete_bag))
        .route("/{bag_id}/throw", post(throw))
        .route("/{bag_id}/check", post(check))
        .route_layer(middleware::from_fn_with_state(state, auth))
}

/// Bag as exposed over HTTP.
#[derive(Debug, Serialize)]
pub struct Bag {
    id: BagId,
    #[serde(flatten)]
    state: BagState,
}

impl From<&GarbageBag> for Bag {
    fn from(bag: &GarbageBag) -> Self {
        Self {
            id: bag.id(),
            state: bag.state(),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBody {
    #[validate(range(min = 1, max = MAX_BATCH, message = "Count must be between 1 and 1000."))]
    count: u32,
}

async fn create(
    State(admin): State<AdminService>,
    Extension(actor): Extension<Actor>,
    Valid(body): Valid<CreateBody>,
) -> Result<(StatusCode, Json<Vec<PrintedBag>>)> {
    require_manager(&actor, "create garbage bags")?;

    let bags = admin.create_bags(body.count).await?;
    Ok((StatusCode::CREATED, Json(bags)))
}

#[derive(Debug, Deserialize)]
pub struct PendingQuery {
    limit: Option<u32>,
}

async fn pending(
    State(disposal): State<DisposalService>,
    Extension(actor): Extension<Actor>,
    query: std::result::Result<Query<PendingQuery>, QueryRejection>,
) -> Result<Json<Vec<Bag>>> {
    require_manager(&actor, "list bags awaiting a check")?;
    let Query(query) = query?;

    let bags = disposal.pending(limit(query.limit)).await?;
    Ok(Json(bags.iter().map(Bag::from).collect()))
}

async fn get_bag(
    State(disposal): State<DisposalService>,
    Path(bag_id): Path<i64>,
) -> Result<Json<Bag>> {
    let bag = disposal.bag(BagId(bag_id)).await?;
    Ok(Json(Bag::from(&bag)))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ThrowBody {
    category: Category,
    #[validate(length(min = 1, max = 128, message = "Location must contain 1 to 128 characters."))]
    location: Option<String>,
}

async fn throw(
    State(config): State<Arc<Configuration>>,
    State(disposal): State<DisposalService>,
    Extension(actor): Extension<Actor>,
    Path(bag_id): Path<i64>,
    Valid(body): Valid<ThrowBody>,
) -> Result<Json<ThrowOutcome>> {
    let location = body
        .location
        .unwrap_or_else(|| config.kiosk.location.clone());

    let outcome = disposal
        .throw(&actor.id, BagId(bag_id), body.category, &location)
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckBody {
    correct: bool,
}

async fn check(
    State(disposal): State<DisposalService>,
    Extension(actor): Extension<Actor>,
    Path(bag_id): Path<i64>,
    Valid(body): Valid<CheckBody>,
) -> Result<Json<CheckOutcome>> {
    let outcome = disposal
        .check(&actor.id, BagId(bag_id), body.correct)
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct ScopeQuery {
    #[serde(default)]
    scope: DeleteScope,
}

async fn delete_bag(
    State(admin): State<AdminService>,
    Extension(actor): Extension<Actor>,
    Path(bag_id): Path<i64>,
    query: std::result::Result<Query<ScopeQuery>, QueryRejection>,
) -> Result<StatusCode> {
    require_manager(&actor, "delete garbage bags")?;
    let Query(query) = query?;

    admin.delete_bag(BagId(bag_id), query.scope).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct Deleted {
    deleted: u64,
}

async fn delete_all(
    State(admin): State<AdminService>,
    Extension(actor): Extension<Actor>,
    query: std::result::Result<Query<ScopeQuery>, QueryRejection>,
) -> Result<Json<Deleted>> {
    require_manager(&actor, "delete garbage bags")?;
    let Query(query) = query?;

    let deleted = admin.delete_bags(query.scope).await?;
    Ok(Json(Deleted { deleted }))
}
