#[cfg(all(test, feature = "server"))]
mod tests {
    use std::env;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use axum::Router;
    use http_body_util::BodyExt;
    use serial_test::serial;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tower::ServiceExt;

    use crate::server::{router, serve, FlagState, ServerConfig, PORT_ENV};
    use crate::store::{MemoryStore, Store, IS_SUBSCRIBED_KEY};
    use crate::widget::{SubscriptionState, SyncPolicy, Widget};
    use crate::{Client, SubscriptionError};

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_empty() -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/subscribe")
            .body(Body::empty())
            .unwrap()
    }

    fn post_with(content_type: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/subscribe")
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get() -> Request<Body> {
        Request::builder()
            .method(Method::GET)
            .uri("/subscribe")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_first_toggle_subscribes_second_unsubscribes() {
        let app = router(FlagState::new());

        assert_eq!(send(&app, post_empty()).await, (StatusCode::OK, serde_json::json!({ "isSubscribed": true })));
        assert_eq!(send(&app, post_empty()).await, (StatusCode::OK, serde_json::json!({ "isSubscribed": false })));
    }

    #[tokio::test]
    async fn test_toggles_alternate_from_false() {
        let state = FlagState::new();
        let app = router(state.clone());

        for n in 1..=7 {
            let (status, body) = send(&app, post_empty()).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["isSubscribed"], n % 2 == 1);
            assert_eq!(state.current().unwrap(), n % 2 == 1);
        }
    }

    #[tokio::test]
    async fn test_get_does_not_toggle() {
        let app = router(FlagState::with_value(true));

        for _ in 0..3 {
            assert_eq!(send(&app, get()).await, (StatusCode::OK, serde_json::json!({ "isSubscribed": true })));
        }
    }

    #[tokio::test]
    async fn test_explicit_intent_sets_value() {
        let state = FlagState::new();
        let app = router(state.clone());

        let (_, body) = send(&app, post_with("application/json", r#"{"subscribe": true}"#)).await;
        assert_eq!(body["isSubscribed"], true);

        // Setting is idempotent, unlike toggling.
        let (_, body) = send(&app, post_with("application/json", r#"{"subscribe": true}"#)).await;
        assert_eq!(body["isSubscribed"], true);

        let (_, body) = send(&app, post_with("application/x-www-form-urlencoded", "subscribe=false")).await;
        assert_eq!(body["isSubscribed"], false);
        assert!(!state.current().unwrap());
    }

    #[tokio::test]
    async fn test_bodies_without_intent_toggle() {
        let app = router(FlagState::new());

        let (_, body) = send(&app, post_with("application/json", "{}")).await;
        assert_eq!(body["isSubscribed"], true);

        let (_, body) = send(&app, post_with("application/json", "")).await;
        assert_eq!(body["isSubscribed"], false);

        let (_, body) = send(&app, post_with("application/x-www-form-urlencoded", "name=kim")).await;
        assert_eq!(body["isSubscribed"], true);

        let (_, body) = send(&app, post_with("text/plain", "hello")).await;
        assert_eq!(body["isSubscribed"], false);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_rejected_without_toggling() {
        let state = FlagState::new();
        let app = router(state.clone());

        let (status, body) = send(&app, post_with("application/json", r#"{"subscribe": "#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Malformed payload"));

        let (status, _) = send(&app, post_with("application/x-www-form-urlencoded", "subscribe=maybe")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert!(!state.current().unwrap());
    }

    #[tokio::test]
    async fn test_oversized_body_is_payload_too_large() {
        let state = FlagState::new();
        let app = router(state.clone());

        let oversized = format!(r#"{{"subscribe": true, "padding": "{}"}}"#, "x".repeat(100 * 1024));
        let (status, body) = send(&app, post_with("application/json", &oversized)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(body["error"].as_str().unwrap().starts_with("Payload too large"));
        assert!(!state.current().unwrap());

        // Just under the limit is still decoded.
        let fits = format!(r#"{{"subscribe": true, "padding": "{}"}}"#, "x".repeat(90 * 1024));
        let (status, body) = send(&app, post_with("application/json", &fits)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isSubscribed"], true);
    }

    #[tokio::test]
    async fn test_poisoned_state_returns_internal_error() {
        let state = FlagState::new();
        let poisoned = state.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoned.flag.lock().unwrap();
            panic!("writer died while holding the flag");
        })
        .join();

        let app = router(state);

        assert_eq!(
            send(&app, post_empty()).await,
            (StatusCode::INTERNAL_SERVER_ERROR, serde_json::json!({ "error": "서버 오류" }))
        );
        assert_eq!(send(&app, get()).await.0, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_states_are_independent() {
        let first = router(FlagState::new());
        let second = router(FlagState::new());

        send(&first, post_empty()).await;

        assert_eq!(send(&first, get()).await.1["isSubscribed"], true);
        assert_eq!(send(&second, get()).await.1["isSubscribed"], false);
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin() {
        let app = router(FlagState::new());

        let preflight = Request::builder()
            .method(Method::OPTIONS)
            .uri("/subscribe")
            .header(header::ORIGIN, "http://localhost:3000")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(preflight).await.unwrap();
        assert!(response.status().is_success());
        assert_eq!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");

        let request = Request::builder()
            .method(Method::POST)
            .uri("/subscribe")
            .header(header::ORIGIN, "https://somewhere.example")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        env::remove_var(PORT_ENV);
        assert_eq!(ServerConfig::from_env().unwrap(), ServerConfig::default());
        assert_eq!(ServerConfig::default().address(), "0.0.0.0:3001");

        env::set_var(PORT_ENV, "4100");
        assert_eq!(ServerConfig::from_env().unwrap().port, 4100);

        env::set_var(PORT_ENV, "not-a-port");
        assert!(matches!(ServerConfig::from_env(), Err(SubscriptionError::ConfigError(_))));

        env::remove_var(PORT_ENV);
    }

    #[tokio::test]
    async fn test_widget_against_running_service() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let state = FlagState::new();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(serve(listener, state.clone(), async move {
            let _ = shutdown_rx.await;
        }));

        let client = || Client::builder().with_base_url(&base_url).build().unwrap();

        // Server-authoritative: the store always ends equal to the server.
        let store = Arc::new(MemoryStore::new());
        let mut widget = Widget::new(client(), store.clone()).with_policy(SyncPolicy::ServerAuthoritative);
        assert_eq!(widget.mount().await, SubscriptionState::Unsubscribed);
        assert!(!state.current().unwrap());

        assert_eq!(widget.handle_subscribe().await, SubscriptionState::Subscribed);
        assert!(state.current().unwrap());
        assert_eq!(store.get_item(IS_SUBSCRIBED_KEY).await.unwrap().as_deref(), Some("true"));

        // Default widget: mounting flips the server flag, and the display comes from the store.
        let mut legacy = Widget::new(client(), store.clone());
        assert_eq!(legacy.policy(), SyncPolicy::Legacy);
        assert_eq!(legacy.mount().await, SubscriptionState::Subscribed);
        assert!(!state.current().unwrap());

        // The server now returns true, which the click reads as "was subscribed".
        assert_eq!(legacy.handle_subscribe().await, SubscriptionState::Unsubscribed);
        assert!(state.current().unwrap());
        assert_eq!(store.get_item(IS_SUBSCRIBED_KEY).await.unwrap(), None);

        shutdown_tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }
}
