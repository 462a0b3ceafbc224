use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/ai/stream", post(super::handlers::ai::stream_command))
        .route("/api/ai/providers", get(super::handlers::ai::list_providers))
        .route("/health", get(super::handlers::health::health_check))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use codeassist_relay::{
        CommandKind, FixedWindowLimiter, GenerationParams, LlmProvider, MemorySessionStore,
        ProviderError, ProviderId, ProviderRegistry, ProviderReply, ProviderRequest,
        QuotaConfig, RateLimiter, Relay, RelayOptions, Session, StreamEvent, TemplateRegistry,
        Unlimited,
    };
    use http_body_util::BodyExt as _;
    use tower::ServiceExt as _;

    use crate::state::AppState;
    use crate::web::create_app;

    struct CannedProvider;

    #[async_trait::async_trait]
    impl LlmProvider for CannedProvider {
        fn id(&self) -> ProviderId {
            ProviderId::new("github")
        }

        fn default_model(&self) -> &str {
            "canned-1"
        }

        fn generation_params(&self) -> GenerationParams {
            GenerationParams::default()
        }

        async fn complete(&self, _req: ProviderRequest) -> Result<ProviderReply, ProviderError> {
            Ok(ProviderReply::Complete("Fixed.".into()))
        }
    }

    fn app_with(quota: Arc<dyn RateLimiter>, registry: ProviderRegistry) -> axum::Router {
        let sessions = MemorySessionStore::new();
        sessions.insert(
            "tok",
            Session::new("octocat", "gho_x", chrono::Utc::now() + chrono::Duration::hours(1)),
        );
        let relay = Relay::new(
            registry,
            TemplateRegistry::with_defaults().expect("templates"),
            RelayOptions::default(),
        );
        create_app(AppState::new(relay, Arc::new(sessions), quota))
    }

    fn app() -> axum::Router {
        let registry = ProviderRegistry::builder()
            .register_provider(Arc::new(CannedProvider))
            .build()
            .expect("registry");
        app_with(Arc::new(Unlimited), registry)
    }

    fn stream_request(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/ai/stream")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::COOKIE, "session=tok")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        String::from_utf8(bytes.to_vec()).expect("utf8")
    }

    #[tokio::test]
    async fn streams_sse_frames_for_a_command() {
        let response = app()
            .oneshot(stream_request(
                serde_json::json!({ "command": "fix", "input": "null ref bug" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );
        assert_eq!(response.headers()[header::CONNECTION], "keep-alive");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
        let expected: String = [
            StreamEvent::Start {
                command: CommandKind::Fix,
            },
            StreamEvent::data("Fixed."),
            StreamEvent::success(),
        ]
        .iter()
        .map(StreamEvent::to_sse_frame)
        .collect();
        assert_eq!(body_text(response).await, expected);
    }

    #[tokio::test]
    async fn missing_session_is_unauthorized() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/ai/stream")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"command":"explain","input":"x"}"#))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_text(response).await.contains("\"error\""));
    }

    #[tokio::test]
    async fn unknown_command_is_bad_request() {
        let response = app()
            .oneshot(stream_request(
                serde_json::json!({ "command": "summarize", "input": "x" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("unknown command"));
    }

    #[tokio::test]
    async fn unconfigured_providers_are_service_unavailable() {
        let app = app_with(
            Arc::new(Unlimited),
            ProviderRegistry::builder().build().unwrap(),
        );
        let response = app
            .oneshot(stream_request(
                serde_json::json!({ "command": "explain", "input": "x" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(body_text(response).await.contains("GEMINI_API_KEY"));
    }

    #[tokio::test]
    async fn quota_exhaustion_returns_retry_after() {
        let registry = ProviderRegistry::builder()
            .register_provider(Arc::new(CannedProvider))
            .build()
            .unwrap();
        let limiter = FixedWindowLimiter::new(QuotaConfig {
            max_requests: 1,
            window: Duration::from_secs(60),
        });
        let app = app_with(Arc::new(limiter), registry);
        let body = serde_json::json!({ "command": "explain", "input": "x" });

        let first = app.clone().oneshot(stream_request(body.clone())).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let second = app.oneshot(stream_request(body)).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().contains_key(header::RETRY_AFTER));
    }

    #[tokio::test]
    async fn rejected_requests_do_not_consume_quota() {
        let registry = ProviderRegistry::builder()
            .register_provider(Arc::new(CannedProvider))
            .build()
            .unwrap();
        let limiter = FixedWindowLimiter::new(QuotaConfig {
            max_requests: 1,
            window: Duration::from_secs(60),
        });
        let app = app_with(Arc::new(limiter), registry);

        for body in [
            serde_json::json!({ "command": "explain", "input": "x", "provider": "claude" }),
            serde_json::json!({ "command": "generate", "input": "   " }),
        ] {
            let rejected = app.clone().oneshot(stream_request(body)).await.unwrap();
            assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
        }
        let accepted = app
            .oneshot(stream_request(
                serde_json::json!({ "command": "explain", "input": "x" }),
            ))
            .await
            .unwrap();
        assert_eq!(accepted.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn providers_endpoint_describes_registry() {
        let request = Request::builder()
            .uri("/api/ai/providers")
            .header(header::AUTHORIZATION, "Bearer tok")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["default"], "github");
        assert_eq!(json["providers"][0]["model"], "canned-1");
    }

    #[tokio::test]
    async fn health_reports_service() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["service"], "codeassist-server");
    }
}
