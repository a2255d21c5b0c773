use std::path::PathBuf;

use axum::extract::Query;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Router, routing::get};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use axum_stream_response::{Error, RangeRequest, StreamResponse};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
struct FileRequest {
    path: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .init();

    let _router: Router = Router::new()
        .route("/", get(|| async { "Hello, World!" }))
        .route("/file", get(get_file));

    #[cfg(feature = "run_server_in_example")]
    {
        let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
        tracing::info!("listening on {}", listener.local_addr().unwrap());
        axum::serve(listener, _router).await.unwrap();
    }
}

async fn get_file(request: RangeRequest, Query(q): Query<FileRequest>) -> Response {
    let path = PathBuf::from(&q.path);
    match StreamResponse::open(&path, request).await {
        Ok(response) => response.into_response(),
        Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            (StatusCode::NOT_FOUND, format!("File not found: {}", path.display())).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {e}")).into_response(),
    }
}
