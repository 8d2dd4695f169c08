//! HTTP surface: `GET /`, `GET /sites` and `POST /scrape`.

use crate::model::{ScrapeRequest, ScrapeResponse, ScrapeStatus};
use crate::orchestrator::Orchestrator;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/sites", get(sites))
        .route("/scrape", post(scrape))
        .layer(CorsLayer::permissive())
        .with_state(orchestrator)
}

pub async fn serve(addr: SocketAddr, orchestrator: Arc<Orchestrator>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("🚀 Listening on http://{}", addr);
    axum::serve(listener, router(orchestrator)).await
}

async fn index() -> Json<Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "message": "web content extraction service",
    }))
}

async fn sites(State(orchestrator): State<Arc<Orchestrator>>) -> Json<Value> {
    Json(json!({ "sites": orchestrator.list_sites() }))
}

async fn scrape(
    State(orchestrator): State<Arc<Orchestrator>>,
    body: Result<Json<ScrapeRequest>, JsonRejection>,
) -> (StatusCode, Json<ScrapeResponse>) {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!("Rejected scrape body: {}", rejection.body_text());
            return (
                StatusCode::BAD_REQUEST,
                Json(ScrapeResponse::error(format!("InvalidRequest: {}", rejection.body_text()))),
            );
        }
    };

    match orchestrator.handle(request).await {
        Ok(response) if response.status == ScrapeStatus::Success => (StatusCode::OK, Json(response)),
        Ok(response) => (StatusCode::INTERNAL_SERVER_ERROR, Json(response)),
        Err(e) => {
            warn!("Rejected scrape request: {}", e);
            (
                StatusCode::BAD_REQUEST,
                Json(ScrapeResponse::error(format!("InvalidRequest: {}", e))),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::SessionManager;
    use crate::browser::fake::{FakeDriver, PageScript};
    use crate::config::{CapacityPolicy, parse_config};
    use crate::scraper::{GenericScraper, ScrapeSettings, ScraperRegistry};
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    const SITES: &str = r#"{"sites": [
        {"site_id": "accupass", "base_url": "https://www.accupass.com", "selectors": {"item": "div.event-card"}}
    ]}"#;

    fn app(script: PageScript) -> Router {
        let settings = ScrapeSettings::default();
        let registry = ScraperRegistry::from_sites(&parse_config(SITES).unwrap().sites, &settings);
        let driver = Arc::new(FakeDriver::new(script));
        let orchestrator = Orchestrator::new(
            Arc::new(registry),
            SessionManager::new(driver, 1, CapacityPolicy::Fail),
            GenericScraper::new(settings),
            Duration::from_secs(300),
        );
        router(Arc::new(orchestrator))
    }

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_scrape(body: &str) -> Request<Body> {
        Request::post("/scrape")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn index_reports_service() {
        let (status, body) = call(app(PageScript::default()), Request::get("/").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "pagegrab");
    }

    #[tokio::test]
    async fn lists_registered_sites() {
        let (status, body) = call(app(PageScript::default()), Request::get("/sites").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"sites": ["accupass"]}));
    }

    #[tokio::test(start_paused = true)]
    async fn url_scrape_returns_items() {
        let (status, body) = call(
            app(PageScript::signals(vec![500])),
            post_scrape(r#"{"mode": "url", "url": "https://example.com", "params": {"q": "test"}}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["data"][0]["url"], "https://example.com?q=test");
    }

    #[tokio::test]
    async fn unknown_site_is_an_error_response() {
        let (status, body) = call(
            app(PageScript::default()),
            post_scrape(r#"{"mode": "site", "site_id": "meetup"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "error");
        assert_eq!(body["data"], json!([]));
    }

    #[tokio::test]
    async fn bad_requests_get_400() {
        let (status, body) = call(
            app(PageScript::default()),
            post_scrape(r#"{"mode": "url", "site_id": "accupass", "url": "https://example.com"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().starts_with("InvalidRequest"));

        let (status, body) = call(app(PageScript::default()), post_scrape("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
    }
}
