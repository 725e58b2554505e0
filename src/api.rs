// src/api.rs
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::poller::{Poller, StatusSnapshot};

pub const STATUS_TEXT: &str = "News relay bot is running";
pub const STARTED_TEXT: &str = "Bot started in the background";
pub const ALREADY_RUNNING_TEXT: &str = "Bot is already running";

#[derive(Clone)]
pub struct AppState {
    poller: Poller,
}

impl AppState {
    pub fn new(poller: Poller) -> Self {
        Self { poller }
    }
}

#[derive(Debug, Serialize)]
pub struct Message {
    pub message: &'static str,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/start", post(start))
        .route("/status", get(status))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn root() -> Json<Message> {
    Json(Message {
        message: STATUS_TEXT,
    })
}

/// Starts the polling loop once; never waits for a cycle.
async fn start(State(state): State<AppState>) -> Json<Message> {
    if state.poller.start() {
        info!("polling loop started via /start");
        Json(Message {
            message: STARTED_TEXT,
        })
    } else {
        Json(Message {
            message: ALREADY_RUNNING_TEXT,
        })
    }
}

async fn status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.poller.status().snapshot())
}
