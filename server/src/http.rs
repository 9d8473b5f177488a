use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use anyhow::Context;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, FromRef, Path, State, rejection::JsonRejection},
    http::{self, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
};
use axum_extra::extract::cookie::{Cookie, Key, PrivateCookieJar, SameSite};
use dashboard::auth::{self, CurrentUser, SESSION_COOKIE};
use dashboard::graphql::AppSchema;
use dashboard::storage::{self, AvatarStore, MAX_AVATAR_BYTES};
use dashboard::users::{self, NewUser, UserView};
use dashboard::{ApiError, ApiResult};
use platform_db::{self, DbPool};
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use time::Duration as TimeDuration;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::info;
use uuid::Uuid;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub schema: AppSchema,
    pub config: Arc<AppConfig>,
    pub avatars: AvatarStore,
}

impl AppState {
    pub fn new(db: DbPool, config: Arc<AppConfig>) -> Self {
        let schema = dashboard::graphql::build_schema(Arc::new(db.clone()));
        let avatars = AvatarStore::new(config.storage_dir.clone(), config.storage_url());
        Self {
            db,
            schema,
            config,
            avatars,
        }
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.config.cookie_key.clone()
    }
}

#[derive(Clone, Debug)]
pub struct ServeConfig {
    addr: SocketAddr,
}

impl ServeConfig {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self {
            addr: SocketAddr::from((host, port)),
        }
    }
}

pub async fn serve(config: ServeConfig, state: AppState) -> anyhow::Result<()> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;

    info!(%config.addr, "bizdash server listening");
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();
    // credentials cannot be combined with a wildcard origin
    let credentials = !allowed.is_empty();
    let allow_origin = if allowed.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(allowed)
    };
    CorsLayer::new()
        .allow_credentials(credentials)
        .allow_headers([http::header::CONTENT_TYPE, http::header::AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_origin(allow_origin)
}

pub fn build_router(state: AppState) -> Router {
    let request_id = MakeRequestUuid;
    let header_name = HeaderName::from_static("x-request-id");
    let storage = ServeDir::new(state.config.storage_dir.clone());
    Router::new()
        .route("/health", get(health_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/auth/password", put(change_password_handler))
        .route("/graphql", post(graphql_handler))
        .route("/api/admin/users", post(create_user_handler))
        .route(
            "/api/users/{id}/avatar",
            put(upload_avatar_handler)
                .delete(remove_avatar_handler)
                .layer(DefaultBodyLimit::max(MAX_AVATAR_BYTES)),
        )
        .nest_service("/storage", storage)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(header_name.clone(), request_id))
                .layer(PropagateRequestIdLayer::new(header_name))
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&state.config.cors_allowed_origins)),
        )
        .with_state(state)
}

/// Session id from `Authorization: Bearer <id>`, falling back to the private
/// session cookie.
fn session_id(headers: &HeaderMap, jar: &PrivateCookieJar) -> Option<Uuid> {
    let bearer = headers
        .get(http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);
    match bearer {
        Some(token) => Uuid::parse_str(token).ok(),
        None => jar
            .get(SESSION_COOKIE)
            .and_then(|cookie| Uuid::parse_str(cookie.value()).ok()),
    }
}

/// The signed-in caller, or `None` when there is no usable session.
async fn optional_user(
    state: &AppState,
    headers: &HeaderMap,
    jar: &PrivateCookieJar,
) -> ApiResult<Option<CurrentUser>> {
    let Some(id) = session_id(headers, jar) else {
        return Ok(None);
    };
    match auth::resolve_session(&state.db, id).await {
        Ok(user) => Ok(Some(user)),
        Err(ApiError::Unauthenticated) => Ok(None),
        Err(err) => Err(err),
    }
}

async fn require_user(
    state: &AppState,
    headers: &HeaderMap,
    jar: &PrivateCookieJar,
) -> ApiResult<CurrentUser> {
    optional_user(state, headers, jar)
        .await?
        .ok_or(ApiError::Unauthenticated)
}

fn session_cookie(state: &AppState, value: String, max_age: TimeDuration) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, value))
        .path("/")
        .http_only(true)
        .secure(state.config.public_base_url.starts_with("https://"))
        .same_site(SameSite::Lax)
        .max_age(max_age)
        .build()
}

#[derive(Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    token: Uuid,
    expires_at: DateTimeWithTimeZone,
    user: UserView,
}

async fn login_handler(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    body: Result<Json<LoginBody>, JsonRejection>,
) -> ApiResult<(PrivateCookieJar, Json<LoginResponse>)> {
    let Json(body) = body.map_err(|rejection| ApiError::invalid(rejection.body_text()))?;
    let (session, user) =
        auth::login(&state.db, &body.email, &body.password, state.config.session_ttl).await?;
    let profile = users::me(&state.db, &user).await?;
    let max_age = TimeDuration::seconds(state.config.session_ttl.num_seconds());
    let jar = jar.add(session_cookie(&state, session.id.to_string(), max_age));
    Ok((
        jar,
        Json(LoginResponse {
            token: session.id,
            expires_at: session.expires_at,
            user: profile,
        }),
    ))
}

async fn logout_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: PrivateCookieJar,
) -> ApiResult<(PrivateCookieJar, StatusCode)> {
    if let Some(id) = session_id(&headers, &jar) {
        auth::close_session(&state.db, id).await?;
    }
    let jar = jar.remove(Cookie::build((SESSION_COOKIE, "")).path("/").build());
    Ok((jar, StatusCode::NO_CONTENT))
}

#[derive(Deserialize)]
struct PasswordBody {
    current_password: String,
    new_password: String,
}

async fn change_password_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: PrivateCookieJar,
    body: Result<Json<PasswordBody>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let user = require_user(&state, &headers, &jar).await?;
    let Json(body) = body.map_err(|rejection| ApiError::invalid(rejection.body_text()))?;
    auth::change_password(&state.db, &user, &body.current_password, &body.new_password).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn graphql_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: PrivateCookieJar,
    request: GraphQLRequest,
) -> ApiResult<GraphQLResponse> {
    let mut req = request.into_inner();
    if let Some(user) = optional_user(&state, &headers, &jar).await? {
        req = req.data(user);
    }
    Ok(GraphQLResponse::from(state.schema.execute(req).await))
}

async fn create_user_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: PrivateCookieJar,
    body: Result<Json<NewUser>, JsonRejection>,
) -> ApiResult<Json<UserView>> {
    let caller = require_user(&state, &headers, &jar).await?;
    caller.require_admin()?;
    let Json(body) = body.map_err(|rejection| ApiError::invalid(rejection.body_text()))?;
    let user = users::create_user(&state.db, &caller, body).await?;
    Ok(Json(user))
}

async fn upload_avatar_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    jar: PrivateCookieJar,
    body: Bytes,
) -> ApiResult<Json<UserView>> {
    let caller = require_user(&state, &headers, &jar).await?;
    let content_type = headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let user =
        storage::upload_avatar(&state.db, &state.avatars, &caller, id, content_type, &body).await?;
    Ok(Json(user))
}

async fn remove_avatar_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    jar: PrivateCookieJar,
) -> ApiResult<Json<UserView>> {
    let caller = require_user(&state, &headers, &jar).await?;
    let user = storage::remove_avatar(&state.db, &state.avatars, &caller, id).await?;
    Ok(Json(user))
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let db_ok = platform_db::ping(&state.db).await;
    Json(HealthResponse {
        ok: db_ok,
        db_ok,
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    db_ok: bool,
    version: &'static str,
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for CTRL+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    ctrl_c.await;

    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use dashboard::seed::seed_accounts;
    use http_body_util::BodyExt;
    use migration::{Migrator, MigratorTrait};
    use platform_db::DatabaseSettings;
    use sea_orm::Database;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    const PASSWORD: &str = "seed-password-1";

    struct Harness {
        router: Router,
        _storage: tempfile::TempDir,
    }

    async fn harness() -> Harness {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        seed_accounts(&db, PASSWORD).await.unwrap();
        let storage = tempfile::tempdir().unwrap();
        let config = AppConfig {
            database: DatabaseSettings::new("sqlite::memory:"),
            cookie_key: Key::generate(),
            cors_allowed_origins: vec!["http://localhost:5173".into()],
            session_ttl: chrono::Duration::hours(1),
            storage_dir: storage.path().to_path_buf(),
            public_base_url: "http://localhost:8080".into(),
        };
        Harness {
            router: build_router(AppState::new(db, Arc::new(config))),
            _storage: storage,
        }
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    fn json_request(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(http::header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(http::header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn login(router: &Router, email: &str) -> (String, Value) {
        let (status, body) = send(
            router,
            json_request(
                Method::POST,
                "/auth/login",
                None,
                json!({"email": email, "password": PASSWORD}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        (body["token"].as_str().unwrap().to_string(), body["user"].clone())
    }

    #[tokio::test]
    async fn health_reports_database() {
        let h = harness().await;
        let request = Request::get("/health").body(Body::empty()).unwrap();
        let (status, body) = send(&h.router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], json!(true));
        assert_eq!(body["db_ok"], json!(true));
    }

    #[tokio::test]
    async fn login_sets_cookie_and_bearer_reaches_graphql() {
        let h = harness().await;
        let request = json_request(
            Method::POST,
            "/auth/login",
            None,
            json!({"email": "sales@bizdash.test", "password": PASSWORD}),
        );
        let response = h.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(http::header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(cookie.starts_with(SESSION_COOKIE), "{cookie}");
        assert!(cookie.contains("HttpOnly"));

        let (token, _) = login(&h.router, "sales@bizdash.test").await;
        let (status, body) = send(
            &h.router,
            json_request(
                Method::POST,
                "/graphql",
                Some(&token),
                json!({"query": "{ me { email role } }"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["data"]["me"],
            json!({"email": "sales@bizdash.test", "role": "SALES"})
        );
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let h = harness().await;
        let (status, body) = send(
            &h.router,
            json_request(
                Method::POST,
                "/auth/login",
                None,
                json!({"email": "sales@bizdash.test", "password": "nope-nope"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("invalid email or password"));
    }

    #[tokio::test]
    async fn graphql_without_session_is_unauthenticated() {
        let h = harness().await;
        let (status, body) = send(
            &h.router,
            json_request(
                Method::POST,
                "/graphql",
                None,
                json!({"query": "{ dashboard { stats { totalProjects } } }"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["errors"][0]["extensions"]["code"], json!("UNAUTHENTICATED"));
    }

    #[tokio::test]
    async fn admin_user_creation_statuses() {
        let h = harness().await;
        let payload = json!({
            "email": "new.sales@example.com",
            "password": "long-enough-pw",
            "full_name": "New Sales",
            "role": "Sales",
            "department": "dropped"
        });

        let (status, body) = send(
            &h.router,
            json_request(Method::POST, "/api/admin/users", None, payload.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], json!("not signed in"));

        let (sales_token, _) = login(&h.router, "sales@bizdash.test").await;
        let (status, _) = send(
            &h.router,
            json_request(
                Method::POST,
                "/api/admin/users",
                Some(&sales_token),
                payload.clone(),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (admin_token, _) = login(&h.router, "admin@bizdash.test").await;
        let malformed = Request::builder()
            .method(Method::POST)
            .uri("/api/admin/users")
            .header(http::header::CONTENT_TYPE, "application/json")
            .header(http::header::AUTHORIZATION, format!("Bearer {admin_token}"))
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(&h.router, malformed).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, body) = send(
            &h.router,
            json_request(
                Method::POST,
                "/api/admin/users",
                Some(&admin_token),
                payload.clone(),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["role"], json!("Sales"));
        assert_eq!(body["department"], Value::Null);

        let (status, body) = send(
            &h.router,
            json_request(Method::POST, "/api/admin/users", Some(&admin_token), payload),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], json!("email already registered"));
    }

    #[tokio::test]
    async fn avatar_upload_replaces_and_removes_objects() {
        let h = harness().await;
        let (token, me) = login(&h.router, "engineer@bizdash.test").await;
        let id = me["id"].as_str().unwrap().to_string();

        let upload = |content_type: &'static str, bytes: Vec<u8>| {
            Request::builder()
                .method(Method::PUT)
                .uri(format!("/api/users/{id}/avatar"))
                .header(http::header::CONTENT_TYPE, content_type)
                .header(http::header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::from(bytes))
                .unwrap()
        };

        let (status, _) = send(&h.router, upload("text/plain", b"hello".to_vec())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, first) = send(&h.router, upload("image/png", vec![1, 2, 3])).await;
        assert_eq!(status, StatusCode::OK, "{first}");
        let first_url = first["avatar_url"].as_str().unwrap().to_string();
        assert!(first_url.starts_with("http://localhost:8080/storage/avatars/"));
        let first_path = h
            ._storage
            .path()
            .join(first_url.trim_start_matches("http://localhost:8080/storage/"));
        assert!(first_path.exists());

        let (status, second) = send(&h.router, upload("image/webp", vec![4, 5, 6])).await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(second["avatar_url"], first["avatar_url"]);
        assert!(!first_path.exists());

        let served = Request::get(
            second["avatar_url"]
                .as_str()
                .unwrap()
                .trim_start_matches("http://localhost:8080"),
        )
        .body(Body::empty())
        .unwrap();
        let response = h.router.clone().oneshot(served).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let remove = Request::builder()
            .method(Method::DELETE)
            .uri(format!("/api/users/{id}/avatar"))
            .header(http::header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&h.router, remove).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["avatar_url"], Value::Null);
    }

    #[tokio::test]
    async fn users_cannot_change_someone_elses_avatar() {
        let h = harness().await;
        let (token, _) = login(&h.router, "engineer@bizdash.test").await;
        let (_, other) = login(&h.router, "pm@bizdash.test").await;
        let request = Request::builder()
            .method(Method::PUT)
            .uri(format!("/api/users/{}/avatar", other["id"].as_str().unwrap()))
            .header(http::header::CONTENT_TYPE, "image/png")
            .header(http::header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::from(vec![1u8, 2, 3]))
            .unwrap();
        let (status, _) = send(&h.router, request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn logout_revokes_the_bearer_token() {
        let h = harness().await;
        let (token, _) = login(&h.router, "pm@bizdash.test").await;
        let (status, _) = send(
            &h.router,
            json_request(Method::POST, "/auth/logout", Some(&token), json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(
            &h.router,
            json_request(
                Method::PUT,
                "/auth/password",
                Some(&token),
                json!({"current_password": PASSWORD, "new_password": "another-password"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
