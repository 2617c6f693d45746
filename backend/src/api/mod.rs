pub mod sends;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use sends::ApiState;

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Drafts
        .route("/api/sends", post(sends::create_send))
        .route("/api/sends/history", get(sends::get_history))
        .route("/api/sends/:id", get(sends::get_send).delete(sends::discard_send))

        // Edits
        .route("/api/sends/:id/recipient", put(sends::set_recipient))
        .route("/api/sends/:id/amount", put(sends::set_amount))
        .route("/api/sends/:id/asset", put(sends::set_asset))
        .route("/api/sends/:id/max", get(sends::get_max_amount))

        // Attempt and confirmation steps
        .route("/api/sends/:id/attempt", post(sends::attempt_send))
        .route("/api/sends/:id/confirm-amount", post(sends::confirm_amount))
        .route("/api/sends/:id/password", post(sends::submit_password))
        .route("/api/sends/:id/acknowledge-gas", post(sends::acknowledge_gas))
        .route("/api/sends/:id/cancel", post(sends::cancel_send))

        // Wallet
        .route("/api/balances/:ticker", put(sends::set_balance))

        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
