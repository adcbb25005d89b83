use crate::{auth::AuthenticationPipeline, keys::KeyLifecycleService};
use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    routing::{get, post},
    Extension, Router,
};
use secrecy::SecretString;
use sqlx::PgPool;
use std::{future::Future, net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;
mod openapi;

pub use openapi::openapi;

pub const RESOURCE_PATH: &str = "/api/sentinel-key";

/// Shared by every handler through an `Extension`.
pub struct AppState {
    pub pipeline: Arc<AuthenticationPipeline>,
    pub service: Arc<KeyLifecycleService>,
    /// Admin routes are only mounted when a token is configured.
    pub admin_token: Option<SecretString>,
    pub trust_forwarded_for: bool,
    /// Pinged by `/health` when running against Postgres.
    pub pool: Option<PgPool>,
}

impl AppState {
    #[must_use]
    pub fn new(
        pipeline: Arc<AuthenticationPipeline>,
        service: Arc<KeyLifecycleService>,
        admin_token: Option<SecretString>,
        trust_forwarded_for: bool,
    ) -> Self {
        Self {
            pipeline,
            service,
            admin_token,
            trust_forwarded_for,
            pool: None,
        }
    }

    #[must_use]
    pub fn with_pool(mut self, pool: PgPool) -> Self {
        self.pool = Some(pool);
        self
    }
}

/// Build the application router.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route("/health", get(handlers::health::health))
        .route(RESOURCE_PATH, get(handlers::resource::resource));

    if state.admin_token.is_some() {
        app = app.merge(admin_router());
    }

    app.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(state)),
        )
}

fn admin_router() -> Router {
    use handlers::admin;

    Router::new()
        .route(
            "/admin/owners/:owner_id/key",
            post(admin::issue).delete(admin::revoke),
        )
        .route("/admin/owners/:owner_id/key/rotate", post(admin::rotate))
        .route("/admin/owners/:owner_id/key/reveal", get(admin::reveal))
        .route("/admin/keys/:key_id/block", post(admin::toggle_block))
        .route("/admin/keys/:key_id/enabled", post(admin::set_enabled))
        .route("/admin/keys/:key_id/status", get(admin::status))
        .route("/admin/regenerate", post(admin::regenerate))
}

/// Serve until `shutdown` resolves.
///
/// # Errors
/// Returns an error if the listener cannot bind or the server fails.
pub async fn serve<F>(port: u16, state: Arc<AppState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
