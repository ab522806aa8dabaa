//! The HTTP front-end (spec §6). A thin translation layer: every handler
//! calls exactly one core operation and maps the `Result` onto a status
//! code + JSON body. The core's blocking API runs on the blocking thread
//! pool via `spawn_blocking` so a slow fsync on one channel cannot stall
//! requests against other channels.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::{ChannelMap, Config, Error};

#[derive(Clone)]
struct AppState {
    channel_map: Arc<ChannelMap>,
    config: Arc<Config>,
}

pub fn router(channel_map: Arc<ChannelMap>, config: Arc<Config>) -> Router {
    let state = AppState {
        channel_map,
        config,
    };
    Router::new()
        .route("/channels/:id", post(append_message).get(fetch_messages))
        .route("/channels/:id/commit", post(commit_channel))
        .route("/status", get(status))
        .with_state(state)
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Arg(_) => StatusCode::BAD_REQUEST,
            Error::AlreadyLocked => StatusCode::CONFLICT,
            Error::Corrupt(_) | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

async fn run_blocking<F, T>(f: F) -> crate::Result<T>
where
    F: FnOnce() -> crate::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|_| Error::Corrupt("blocking task panicked"))?
}

#[derive(Serialize)]
struct AppendResponse {
    offset: u64,
}

async fn append_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<AppendResponse>, Error> {
    let channel_map = Arc::clone(&state.channel_map);
    let offset = run_blocking(move || {
        let channel = channel_map.find_channel(&id, true)?;
        channel.append(&body)
    })
    .await?;
    Ok(Json(AppendResponse { offset }))
}

#[derive(Deserialize)]
struct FetchParams {
    offset: Option<u64>,
    batch: Option<u32>,
}

#[derive(Serialize)]
struct FetchedMessage {
    offset: u64,
    data: String,
}

#[derive(Serialize)]
struct FetchResponse {
    messages: Vec<FetchedMessage>,
}

async fn fetch_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<FetchParams>,
) -> Result<Json<FetchResponse>, Error> {
    let start_offset = params.offset.unwrap_or(0);
    let batch_size = params
        .batch
        .unwrap_or(state.config.default_batch_size)
        .min(state.config.default_batch_size);
    let channel_map = Arc::clone(&state.channel_map);
    let raw_messages = run_blocking(move || {
        let channel = channel_map.find_channel(&id, false)?;
        channel.fetch(start_offset, batch_size)
    })
    .await?;

    let messages = raw_messages
        .into_iter()
        .map(|(offset, data)| FetchedMessage {
            offset,
            data: base64::engine::general_purpose::STANDARD.encode(data),
        })
        .collect();
    Ok(Json(FetchResponse { messages }))
}

async fn commit_channel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, Error> {
    let channel_map = Arc::clone(&state.channel_map);
    run_blocking(move || {
        let channel = channel_map.find_channel(&id, false)?;
        channel.commit()
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
struct StatusResponse {
    server_id: String,
    channels: usize,
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        server_id: state.channel_map.get_uid().to_string(),
        channels: state.channel_map.channel_count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tempfile::tempdir;
    use tower::ServiceExt;

    fn test_router() -> (Router, tempfile::TempDir) {
        let dir = tempdir().expect("tempdir");
        let channel_map =
            Arc::new(ChannelMap::open_directory(dir.path()).expect("open directory"));
        let config = Arc::new(Config::new(dir.path().to_path_buf()));
        (router(channel_map, config), dir)
    }

    #[tokio::test]
    async fn append_then_fetch_round_trips() {
        let (app, _dir) = test_router();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/channels/orders")
                    .body(Body::from("hello"))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let commit_response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/channels/orders/commit")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(commit_response.status(), StatusCode::NO_CONTENT);

        let fetch_response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/channels/orders?offset=0&batch=10")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(fetch_response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(fetch_response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let parsed: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(parsed["messages"][0]["offset"], 0);
    }

    #[tokio::test]
    async fn fetch_on_unknown_channel_is_bad_request() {
        let (app, _dir) = test_router();
        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/channels/nope")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn status_reports_server_id_and_channel_count() {
        let (app, _dir) = test_router();
        app.clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/channels/a")
                    .body(Body::from("x"))
                    .expect("request"),
            )
            .await
            .expect("response");

        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/status")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let parsed: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(parsed["channels"], 1);
        assert_eq!(parsed["server_id"].as_str().unwrap().len(), 32);
    }
}
