//! HTTP content gateway served by the router.
//!
//! Exposes the content service to web front ends:
//!
//! - `GET /content/{video_id}/{filename}`: fetch a segment
//! - `PUT /content/{video_id}/{filename}`: store a segment (body = bytes)
//! - `DELETE /content/{video_id}/{filename}`: remove a segment
//! - `GET /admin/nodes`: registered storage nodes as a JSON array

use axum::Json;
use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{Response, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use tracing::{info, warn};
use vidshard_net::MAX_FRAME_SIZE;
use vidshard_router::{ContentRouter, RouterError};

/// Errors returned by gateway handlers.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct GatewayError(#[from] RouterError);

impl GatewayError {
    /// Map to an HTTP status code.
    fn status_code(&self) -> StatusCode {
        match &self.0 {
            RouterError::NotFound(_) => StatusCode::NOT_FOUND,
            RouterError::InvalidKey(_) => StatusCode::BAD_REQUEST,
            RouterError::NoNodes | RouterError::OwnerMoved(_) => StatusCode::SERVICE_UNAVAILABLE,
            RouterError::Net(_) => StatusCode::BAD_GATEWAY,
            RouterError::DuplicateNode(_) | RouterError::HashCollision { .. } => {
                StatusCode::CONFLICT
            }
            RouterError::UnknownNode(_) => StatusCode::NOT_FOUND,
            RouterError::LastNode(_) => StatusCode::PRECONDITION_FAILED,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status.is_server_error() {
            warn!(error = %self.0, %status, "content request failed");
        }
        (status, self.0.to_string()).into_response()
    }
}

/// HTTP server over a [`ContentRouter`].
pub struct Gateway {
    router: Router,
}

impl Gateway {
    /// Create a gateway forwarding to `content`.
    pub fn new(content: ContentRouter) -> Self {
        let router = Router::new()
            .route(
                "/content/{video_id}/{filename}",
                get(get_content).put(put_content).delete(delete_content),
            )
            .route("/admin/nodes", get(list_nodes))
            // A segment must fit in one RPC frame.
            .layer(DefaultBodyLimit::max(MAX_FRAME_SIZE - 1024))
            .with_state(content);
        Self { router }
    }

    /// Return the inner [`Router`] (useful for testing with `tower::ServiceExt`).
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Serve on `addr` until `shutdown` completes.
    pub async fn serve_with_shutdown(
        self,
        addr: &str,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), std::io::Error> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(addr, "content gateway listening");
        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}

async fn get_content(
    State(content): State<ContentRouter>,
    Path((video_id, filename)): Path<(String, String)>,
) -> Result<Response<Body>, GatewayError> {
    let data = content.read(&video_id, &filename).await?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], data).into_response())
}

async fn put_content(
    State(content): State<ContentRouter>,
    Path((video_id, filename)): Path<(String, String)>,
    body: Bytes,
) -> Result<StatusCode, GatewayError> {
    content.write(&video_id, &filename, body).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_content(
    State(content): State<ContentRouter>,
    Path((video_id, filename)): Path<(String, String)>,
) -> Result<StatusCode, GatewayError> {
    content.delete(&video_id, &filename).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_nodes(State(content): State<ContentRouter>) -> Json<Vec<String>> {
    Json(content.nodes().into_iter().map(|n| n.to_string()).collect())
}
