#[cfg(test)]
mod access_api_tests {
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
    };
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tower::ServiceExt;

    use crate::api::{app_state::AppState, create_router};
    use crate::observability::AppMetrics;
    use crate::security::{
        AccessControl, BruteForceConfig, InMemoryCounterStore, InMemoryFailureStore,
        InMemoryIdentityProvider, JwtTokenGenerator, JwtVerifier, RateLimitTiers, RateLimiter,
        Role, RoleResolver, SecurityMonitor, telemetry::MemoryTelemetrySink,
    };

    const SECRET: &str = "api-test-secret-with-at-least-32-chars";

    struct TestApp {
        router: Router,
        provider: Arc<InMemoryIdentityProvider>,
        sink: Arc<MemoryTelemetrySink>,
        tokens: JwtTokenGenerator,
    }

    fn test_app() -> TestApp {
        let metrics = Arc::new(AppMetrics::default());
        let provider = Arc::new(InMemoryIdentityProvider::new());
        let sink = Arc::new(MemoryTelemetrySink::new());

        let resolver = Arc::new(RoleResolver::new(provider.clone()));
        let limiter = Arc::new(RateLimiter::new(
            Arc::new(InMemoryCounterStore::new()),
            RateLimitTiers::default(),
        ));
        let monitor = Arc::new(SecurityMonitor::new(
            Arc::new(InMemoryFailureStore::new()),
            sink.clone(),
            BruteForceConfig::default(),
        ));

        let state = AppState::new(
            AccessControl::new(resolver, limiter),
            monitor,
            JwtVerifier::new(SECRET, "lawnbud", "lawnbud-api"),
            metrics,
        );

        TestApp {
            router: create_router(state),
            provider,
            sink,
            tokens: JwtTokenGenerator::new(SECRET, "lawnbud", "lawnbud-api", 3600),
        }
    }

    fn post_json(uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_anonymous_check_is_denied() {
        let app = test_app();

        let response = app
            .router
            .oneshot(post_json(
                "/api/v1/rate-limit/check",
                json!({"endpoint": "weather_api"}),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["allowed"], false);
        assert_eq!(body["remaining"], 0);
        assert_eq!(body["role"], "user");
    }

    #[tokio::test]
    async fn test_authenticated_user_consumes_quota() {
        let app = test_app();
        let token = app.tokens.generate_token("user-1").unwrap();

        let response = app
            .router
            .oneshot(post_json(
                "/api/v1/rate-limit/check",
                json!({"endpoint": "weather_api"}),
                Some(&token),
            ))
            .await
            .unwrap();

        let body = body_json(response).await;
        assert_eq!(body["allowed"], true);
        assert_eq!(body["remaining"], 99);
        assert_eq!(body["role"], "user");
        assert_eq!(body["error"], Value::Null);
    }

    #[tokio::test]
    async fn test_bearer_identity_gets_server_side_role() {
        let app = test_app();
        app.provider.assign_role("admin-1", Role::Admin);
        let token = app.tokens.generate_token("admin-1").unwrap();

        let response = app
            .router
            .oneshot(post_json(
                "/api/v1/rate-limit/check",
                json!({"endpoint": "weather_api", "role": "user"}),
                Some(&token),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["role"], "admin");
        assert_eq!(body["remaining"], 999_998);
    }

    #[tokio::test]
    async fn test_invalid_token_is_rejected() {
        let app = test_app();

        let response = app
            .router
            .oneshot(post_json(
                "/api/v1/rate-limit/check",
                json!({"endpoint": "weather_api"}),
                Some("not-a-jwt"),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_missing_endpoint_is_bad_request() {
        let app = test_app();

        let response = app
            .router
            .oneshot(post_json("/api/v1/rate-limit/check", json!({}), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_limit_info_does_not_consume_quota() {
        let app = test_app();
        app.provider.assign_role("premium-1", Role::Premium);
        let token = app.tokens.generate_token("premium-1").unwrap();

        for _ in 0..2 {
            let response = app
                .router
                .clone()
                .oneshot(post_json(
                    "/api/v1/rate-limit/check",
                    json!({"endpoint": "plant_id"}),
                    Some(&token),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        for _ in 0..2 {
            let response = app
                .router
                .clone()
                .oneshot(
                    Request::builder()
                        .method("GET")
                        .uri("/api/v1/rate-limit/info?endpoint=plant_id")
                        .header(header::AUTHORIZATION, format!("Bearer {}", token))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let body = body_json(response).await;
            assert_eq!(body["current"], 2);
            assert_eq!(body["limit"], 1000);
            assert_eq!(body["remaining"], 998);
        }
    }

    #[tokio::test]
    async fn test_resolve_role_reports_flags() {
        let app = test_app();
        app.provider.assign_role("premium-1", Role::Premium);
        let token = app.tokens.generate_token("premium-1").unwrap();

        let response = app
            .router
            .oneshot(post_json("/api/v1/roles/resolve", json!({}), Some(&token)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["role"], "premium");
        assert_eq!(body["is_premium"], true);
        assert_eq!(body["is_admin"], false);
        assert_eq!(body["error"], Value::Null);
    }

    fn reporter_token(app: &TestApp) -> String {
        app.provider.assign_role("auth-service", Role::Admin);
        app.tokens.generate_token("auth-service").unwrap()
    }

    async fn report(app: &TestApp, body: Value, token: Option<&str>) -> axum::response::Response {
        app.router
            .clone()
            .oneshot(post_json("/api/v1/security/login-attempts", body, token))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_login_attempts_flag_brute_force() {
        let app = test_app();
        let token = reporter_token(&app);

        let mut flags = Vec::new();
        for _ in 0..3 {
            let response = report(
                &app,
                json!({
                    "identifier": "gardener@example.com",
                    "success": false,
                    "error": "invalid password"
                }),
                Some(&token),
            )
            .await;
            assert_eq!(response.status(), StatusCode::ACCEPTED);
            flags.push(body_json(response).await["suspicious"].clone());
        }

        assert_eq!(flags, vec![json!(false), json!(false), json!(true)]);
        assert_eq!(app.sink.security_events().len(), 1);
    }

    #[tokio::test]
    async fn test_login_success_clears_failures() {
        let app = test_app();
        let token = reporter_token(&app);
        let failure = json!({"identifier": "user@example.com", "success": false});

        for _ in 0..2 {
            report(&app, failure.clone(), Some(&token)).await;
        }
        let cleared = report(
            &app,
            json!({"identifier": "user@example.com", "success": true}),
            Some(&token),
        )
        .await;
        assert_eq!(cleared.status(), StatusCode::ACCEPTED);

        let response = report(&app, failure, Some(&token)).await;
        let body = body_json(response).await;
        assert_eq!(body["suspicious"], false);
        assert!(app.sink.security_events().is_empty());
    }

    #[tokio::test]
    async fn test_anonymous_success_report_cannot_clear_tracking() {
        let app = test_app();
        let token = reporter_token(&app);
        let failure = json!({"identifier": "victim@example.com", "success": false});

        for _ in 0..2 {
            report(&app, failure.clone(), Some(&token)).await;
        }
        let forged = report(
            &app,
            json!({"identifier": "victim@example.com", "success": true}),
            None,
        )
        .await;
        assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);

        let response = report(&app, failure, Some(&token)).await;
        assert_eq!(body_json(response).await["suspicious"], true);
        assert_eq!(app.sink.security_events().len(), 1);
    }

    #[tokio::test]
    async fn test_regular_user_cannot_report_login_attempts() {
        let app = test_app();
        let token = app.tokens.generate_token("user-1").unwrap();

        let response = report(
            &app,
            json!({"identifier": "victim@example.com", "success": true}),
            Some(&token),
        )
        .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["code"], "FORBIDDEN");
        assert!(app.sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_responses_carry_security_headers() {
        let app = test_app();

        let response = app
            .router
            .oneshot(post_json("/api/v1/roles/resolve", json!({}), None))
            .await
            .unwrap();

        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
    }
}
