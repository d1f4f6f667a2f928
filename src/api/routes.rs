use axum::{
    Router,
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use tower_http::cors::{Any, CorsLayer};

use crate::AppState;
use crate::api::models::{FetchRequest, ServiceIdentity};
use crate::error::ErrorResponse;
use crate::relay::{self, RelayOptions};

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route(
            "/fetch",
            post(proxy_handler)
                .get(identity_handler)
                .options(preflight_handler)
                .fallback(method_not_allowed),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(app_state)
}

async fn proxy_handler(
    State(state): State<AppState>,
    Json(request): Json<FetchRequest>,
) -> impl IntoResponse {
    tracing::info!("Proxying {} {}", request.method, request.url);

    let options = RelayOptions {
        block_loopback: state.config.block_loopback,
        ..RelayOptions::default()
    };

    let (status, envelope) = relay::forward(&request, &options).await;
    (status, Json(envelope))
}

/// Service identity for `GET /fetch`; no proxying involved.
async fn identity_handler() -> impl IntoResponse {
    Json(ServiceIdentity {
        status: "online".to_string(),
        service: "BidWatch API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoint: "POST /fetch".to_string(),
    })
}

/// Plain preflight answer; the CORS layer attaches the headers.
async fn preflight_handler() -> StatusCode {
    StatusCode::OK
}

async fn method_not_allowed() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(ErrorResponse {
            error: "Method not allowed. Use POST.".to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::{Method, Request, header};
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_router() -> Router {
        let config = Config {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            block_loopback: false,
            state_file: "test_state.json".into(),
            monitor: None,
        };
        create_router(AppState {
            config: Arc::new(config),
        })
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn post_with_bad_url_returns_400_envelope() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/fetch")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"url": "not-a-url"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "EINVAL");
    }

    #[tokio::test]
    async fn post_with_missing_url_returns_400_envelope() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/fetch")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["code"], "EINVAL");
    }

    #[tokio::test]
    async fn get_returns_service_identity() {
        let response = test_router()
            .oneshot(Request::builder().uri("/fetch").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "online");
        assert_eq!(body["service"], "BidWatch API");
        assert_eq!(body["endpoint"], "POST /fetch");
    }

    #[tokio::test]
    async fn options_returns_ok() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/fetch")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unrelated_method_returns_405() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri("/fetch")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Method not allowed. Use POST.");
    }

    #[tokio::test]
    async fn cors_headers_are_attached() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/fetch")
                    .header(header::ORIGIN, "https://example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .map(|v| v.to_str().unwrap()),
            Some("*")
        );
    }
}
