//! Reward store HTTP API.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router, middleware};
use serde::Deserialize;
use validator::Validate;

use crate::AppState;
use crate::domain::Actor;
use crate::domain::store::{Goods, MAX_STOCK, Order};
use crate::error::Result;
use crate::router::{Valid, auth, require_manager};
use crate::service::store::{Checkout, Receipt};
use crate::service::{AdminService, StoreService};

pub fn router(state: AppState) -> Router<AppState> {
    let auth = middleware::from_fn_with_state(state, auth);

    Router::new()
        .route("/purchase", post(purchase))
        .route("/checkout", post(checkout))
        // `POST /store/pickup` goes to `pickup`. Managers only.
        .route("/pickup", post(pickup))
        .route_layer(auth.clone())
        // Anyone may browse goods, stocking them requires a manager.
        .route("/goods", get(list_goods).merge(post(upsert_goods).route_layer(auth)))
}

async fn list_goods(State(store): State<StoreService>) -> Result<Json<Vec<Goods>>> {
    Ok(Json(store.goods().await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct GoodsBody {
    #[validate(length(min = 1, max = 64, message = "Name must contain 1 to 64 characters."))]
    name: String,
    #[validate(range(min = 0, message = "Score cannot be negative."))]
    score: i64,
    #[validate(range(min = 0, max = MAX_STOCK, message = "Quantity must be between 0 and 1000000."))]
    quantity: i32,
}

async fn upsert_goods(
    State(admin): State<AdminService>,
    Extension(actor): Extension<Actor>,
    Valid(body): Valid<GoodsBody>,
) -> Result<Json<Goods>> {
    require_manager(&actor, "stock goods")?;

    let goods = admin
        .upsert_goods(&body.name, body.score, body.quantity)
        .await?;
    Ok(Json(goods))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseBody {
    goods_id: i64,
    #[validate(range(min = 1, message = "Quantity must be positive."))]
    quantity: i32,
}

async fn purchase(
    State(store): State<StoreService>,
    Extension(actor): Extension<Actor>,
    Valid(body): Valid<PurchaseBody>,
) -> Result<(StatusCode, Json<Receipt>)> {
    let receipt = store
        .purchase(&actor.id, body.goods_id, body.quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn checkout(
    State(store): State<StoreService>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Checkout>> {
    Ok(Json(store.checkout(&actor.id).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct PickupBody {
    #[validate(length(min = 1))]
    token: String,
}

async fn pickup(
    State(store): State<StoreService>,
    Extension(actor): Extension<Actor>,
    Valid(body): Valid<PickupBody>,
) -> Result<Json<Order>> {
    require_manager(&actor, "hand out orders")?;
    Ok(Json(store.pickup(&actor.id, &body.token).await?))
}

#[cfg(test)]
mod tests {
    use axum::http::Method;
    use serde_json::json;

    use super::*;
    use crate::domain::{Role, Standing};
    use crate::router::tests::{bearer, json_body};
    use crate::{app, make_request, seed_user, test_state};

    #[tokio::test]
    async fn test_store_flow() {
        let (state, _) = test_state();
        let alice = seed_user(&state, "alice", Role::Normal, Standing {
            score: 100,
            ..Standing::default()
        })
        .await;
        let manager = seed_user(&state, "manager", Role::Manager, Standing::default()).await;
        let alice_token = bearer(&state, &alice, Role::Normal);
        let manager_token = bearer(&state, &manager, Role::Manager);
        let app = app(state);

        // Stocking requires a manager.
        let response = make_request(
            Some(&alice_token),
            app.clone(),
            Method::POST,
            "/store/goods",
            json!({ "name": "towel", "score": 30, "quantity": 2 }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = make_request(
            Some(&manager_token),
            app.clone(),
            Method::POST,
            "/store/goods",
            json!({ "name": "towel", "score": 30, "quantity": 2 }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let goods_id = json_body(response).await["id"].as_i64().unwrap();

        let response =
            make_request(None, app.clone(), Method::GET, "/store/goods", String::new()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await[0]["name"], "towel");

        let response = make_request(
            Some(&alice_token),
            app.clone(),
            Method::POST,
            "/store/purchase",
            json!({ "goodsId": goods_id, "quantity": 3 }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = make_request(
            Some(&alice_token),
            app.clone(),
            Method::POST,
            "/store/purchase",
            json!({ "goodsId": goods_id, "quantity": 2 }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(json_body(response).await["standing"]["score"], 40);

        let response = make_request(
            Some(&alice_token),
            app.clone(),
            Method::POST,
            "/store/checkout",
            String::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["order"]["status"], "awaiting_pickup");
        let order_token = body["token"].as_str().unwrap().to_owned();

        let response = make_request(
            Some(&manager_token),
            app.clone(),
            Method::POST,
            "/store/pickup",
            json!({ "token": order_token }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "completed");

        let response = make_request(
            Some(&manager_token),
            app,
            Method::POST,
            "/store/pickup",
            json!({ "token": order_token }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stock_is_bounded() {
        let (state, _) = test_state();
        let manager = seed_user(&state, "manager", Role::Manager, Standing::default()).await;
        let token = bearer(&state, &manager, Role::Manager);
        let app = app(state);

        for (quantity, expected) in [
            (i64::from(i32::MAX), StatusCode::BAD_REQUEST),
            (i64::from(MAX_STOCK), StatusCode::OK),
            // Restocking past the bound.
            (1, StatusCode::UNPROCESSABLE_ENTITY),
        ] {
            let response = make_request(
                Some(&token),
                app.clone(),
                Method::POST,
                "/store/goods",
                json!({ "name": "pen", "score": 1, "quantity": quantity }).to_string(),
            )
            .await;
            assert_eq!(response.status(), expected);
        }
    }

    #[tokio::test]
    async fn test_store_requires_login() {
        let (state, _) = test_state();
        let response = make_request(
            None,
            app(state),
            Method::POST,
            "/store/purchase",
            json!({ "goodsId": 1, "quantity": 1 }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
