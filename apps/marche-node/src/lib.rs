//! Marché Node - HTTP access to the Marché messaging core
//!
//! | Method | Path | Handler |
//! |---|---|---|
//! | GET | /conversations | caller's inbox |
//! | POST | /conversations | start or resume a conversation |
//! | GET | /conversations/{id} | conversation and its messages |
//! | POST | /conversations/{id}/messages | send a message (JSON or multipart) |
//! | POST | /conversations/{id}/read | mark incoming messages read |
//! | POST | /presence | heartbeat |
//! | GET | /presence/{user_id} | presence of a user |
//! | GET | /healthz | liveness |

pub mod config;
pub mod http;
pub mod state;

pub use state::AppState;

use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(http::healthz))
        .route(
            "/conversations",
            get(http::conversations::list_conversations)
                .post(http::conversations::start_conversation),
        )
        .route(
            "/conversations/{id}",
            get(http::conversations::get_conversation),
        )
        .route(
            "/conversations/{id}/messages",
            post(http::conversations::send_message),
        )
        .route(
            "/conversations/{id}/read",
            post(http::conversations::mark_read),
        )
        .route("/presence", post(http::presence::heartbeat))
        .route("/presence/{user_id}", get(http::presence::status))
        .layer(from_fn_with_state(state.clone(), http::presence::touch_presence))
        .layer(DefaultBodyLimit::max(state.max_body_bytes))
        .with_state(state)
}
