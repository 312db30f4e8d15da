//! HTTP front-end: a search form at `/` and the retrieval endpoint at
//! `POST /faq`, which takes either JSON or a urlencoded form.

use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{FromRequest, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use faq_retrieval::{HybridPipeline, HybridResponse, RetrievalConfig};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

const HOME_PAGE: &str = r#"<h1>FAQ Retrieval System</h1>
<form action="/faq" method="POST">
    <label>Enter your query:</label><br>
    <input type="text" name="query" placeholder="e.g., How do I track my order?"><br>
    <input type="submit" value="Search">
</form>
"#;

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<HybridPipeline>,
    config: RetrievalConfig,
}

impl AppState {
    pub fn new(pipeline: HybridPipeline, config: RetrievalConfig) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            config,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FaqRequest {
    #[serde(default)]
    query: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/faq", post(faq))
        .with_state(state)
}

pub async fn serve(
    addr: SocketAddr,
    pipeline: HybridPipeline,
    config: RetrievalConfig,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Serving FAQ retrieval on http://{}", listener.local_addr()?);

    axum::serve(listener, router(AppState::new(pipeline, config)))
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "failed to listen for ctrl-c");
            }
        })
        .await?;
    Ok(())
}

async fn home() -> Html<&'static str> {
    Html(HOME_PAGE)
}

async fn faq(State(state): State<AppState>, request: Request) -> Response {
    let is_json = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("application/json"));

    let parsed = if is_json {
        Json::<FaqRequest>::from_request(request, &())
            .await
            .map(|Json(body)| body)
            .map_err(|rejection| rejection.body_text())
    } else {
        Form::<FaqRequest>::from_request(request, &())
            .await
            .map(|Form(body)| body)
            .map_err(|rejection| rejection.body_text())
    };

    let body = match parsed {
        Ok(body) => body,
        Err(reason) => {
            warn!(%reason, "rejected malformed FAQ request");
            return error_response(StatusCode::BAD_REQUEST, &reason);
        }
    };

    let query = match body.query {
        Some(q) if !q.trim().is_empty() => q,
        _ => return error_response(StatusCode::BAD_REQUEST, "Query is required"),
    };

    debug!(%query, json = is_json, "FAQ request");

    let pipeline = state.pipeline.clone();
    let config = state.config;
    let outcome =
        tokio::task::spawn_blocking(move || pipeline.retrieve(&query, &config)).await;

    match outcome {
        Ok(Ok(response)) if is_json => Json(response).into_response(),
        Ok(Ok(response)) => Html(render_results(&response)).into_response(),
        Ok(Err(err)) => {
            error!(error = %err, "retrieval failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
        }
        Err(err) => {
            error!(error = %err, "retrieval task panicked");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "retrieval task failed")
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn render_results(response: &HybridResponse) -> String {
    let mut html = String::from("<h1>Results</h1><ul>");
    for result in &response.results {
        let _ = write!(
            html,
            "<li><b>{}</b>: {}</li>",
            escape_html(&result.question),
            escape_html(&result.answer)
        );
    }
    let _ = write!(
        html,
        "</ul><p>Response Time: {:.4} seconds</p><a href=\"/\">Back</a>",
        response.response_time
    );
    html
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
