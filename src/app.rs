use std::net::SocketAddr;
use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use crate::config::ServerConfig;
use crate::state::AppState;
use crate::{auth, users};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest("/api",
              Router::new()
                  .merge(auth::router())
                  .merge(users::router())
                  .route("/health", get(|| async { "ok" }))
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router, server: &ServerConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", server.host, server.port).parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        build_app(AppState::in_memory(AppConfig::ephemeral("app-secret")))
    }

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(v) => {
                req = req.header(header::CONTENT_TYPE, "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let res = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (status, _) = call(&app(), Method::GET, "/api/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn full_account_lifecycle() {
        let app = app();
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/users/auth/register",
            None,
            Some(json!({
                "username": "bob",
                "email": "Bob@Example.com",
                "password": "winter-river-7",
                "password_confirm": "winter-river-7",
                "first_name": "Bob",
                "last_name": "Stone"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["user"]["email"], "bob@example.com");

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/users/auth/login",
            None,
            Some(json!({"username": "bob@example.com", "password": "winter-river-7"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let access = body["tokens"]["access"].as_str().unwrap().to_owned();
        let refresh = body["tokens"]["refresh"].as_str().unwrap().to_owned();

        let (status, body) =
            call(&app, Method::GET, "/api/users/profile", Some(&access), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "bob");

        let (status, body) = call(
            &app,
            Method::PATCH,
            "/api/users/profile",
            Some(&access),
            Some(json!({"first_name": "Robert"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["first_name"], "Robert");
        assert_eq!(body["last_name"], "Stone");

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/users/auth/logout",
            Some(&access),
            Some(json!({"refresh_token": refresh})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/users/auth/refresh",
            None,
            Some(json!({"refresh": refresh})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid_token");
    }

    #[tokio::test]
    async fn protected_routes_need_a_token() {
        let app = app();
        for (method, uri) in [
            (Method::GET, "/api/users/profile"),
            (Method::GET, "/api/users/dashboard"),
            (Method::POST, "/api/users/change-password"),
            (Method::POST, "/api/users/auth/logout"),
        ] {
            let (status, _) = call(&app, method, uri, None, Some(json!({}))).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        }
    }

    #[tokio::test]
    async fn register_reports_every_field_problem_at_once() {
        let (status, body) = call(
            &app(),
            Method::POST,
            "/api/users/auth/register",
            None,
            Some(json!({
                "username": "alice",
                "email": "a@x.com",
                "password": "short",
                "password_confirm": "short",
                "last_name": "L",
                "gender": "X",
                "dob": "1990-13-45"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
        for field in ["gender", "date_of_birth", "first_name", "password"] {
            assert!(body["fields"][field].is_array(), "{field}: {body}");
        }
        assert_eq!(body["fields"]["gender"][0]["code"], "invalid");
    }

    #[tokio::test]
    async fn oversized_names_are_rejected_before_storage() {
        let app = app();
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/users/auth/register",
            None,
            Some(json!({
                "username": "carol",
                "email": format!("{}@example.com", "c".repeat(300)),
                "password": "winter-river-7",
                "password_confirm": "winter-river-7",
                "first_name": "C".repeat(300),
                "last_name": "Reed"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["fields"]["first_name"][0]["code"], "invalid");
        assert_eq!(body["fields"]["email"][0]["code"], "invalid");

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/users/auth/login",
            None,
            Some(json!({"username": "carol", "password": "winter-river-7"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let app = app();
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/users/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
