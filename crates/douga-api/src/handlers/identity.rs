//! Service identity handlers.

use axum::extract::State;
use axum::Json;
use douga_atproto::DidDocument;

use crate::state::AppState;

const BANNER: &str =
    "https://github.com/lun-4/douga -- a reimplementation of video.bsky.app for the bit";

/// Plain-text banner at `/`.
pub async fn root() -> &'static str {
    BANNER
}

/// `did:web` document at `/.well-known/did.json`.
pub async fn did_document(State(state): State<AppState>) -> Json<DidDocument> {
    Json(DidDocument::for_service(&state.config.hostname))
}
