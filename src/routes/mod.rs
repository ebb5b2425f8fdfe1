use axum::Router;

use crate::state::AppState;

pub mod admin;
pub mod auth;
pub mod doc;
pub mod health;
pub mod orders;
pub mod params;
pub mod payouts;
pub mod pickup;
pub mod refunds;
pub mod returns;
pub mod webhooks;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/orders", orders::router())
        .nest("/pickup", pickup::router())
        .nest("/returns", returns::router())
        .nest("/refunds", refunds::router())
        .nest("/payouts", payouts::router())
        .nest("/admin", admin::router())
        .nest("/webhooks", webhooks::router())
}
