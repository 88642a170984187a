use axum::{middleware, Router};
use std::sync::Arc;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use crate::auth::login;
use crate::auth::middleware::JwtSecret;
use crate::installations;
use crate::notify::routes as notify_routes;
use crate::sales;
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Inject the JWT secret into request extensions so the Claims extractor can find it.
async fn inject_jwt_secret(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    req.extensions_mut()
        .insert(JwtSecret(state.jwt_secret.clone()));
    next.run(req).await
}

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Rate limiting: 5 requests per minute per IP on auth endpoints
    // Uses PeerIpKeyExtractor which reads from ConnectInfo<SocketAddr>
    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .key_extractor(PeerIpKeyExtractor)
            .per_second(12) // 1 token every 12 seconds = 5 per minute
            .burst_size(5) // Allow burst of 5
            .finish()
            .expect("Failed to build governor config"),
    );
    let governor_limiter = governor_config.limiter().clone();

    // Spawn background task to clean up rate limiter state
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            governor_limiter.retain_recent();
        }
    });

    // Auth routes with rate limiting
    let auth_routes = Router::new()
        .route("/auth/register", axum::routing::post(login::register))
        .route("/auth/login", axum::routing::post(login::login))
        .layer(GovernorLayer {
            config: governor_config,
        });

    // Authenticated routes (JWT required — Claims extractor validates token)
    let notification_routes = Router::new()
        .route(
            "/notifications",
            axum::routing::get(notify_routes::list_notifications),
        )
        .route(
            "/notifications/unread-count",
            axum::routing::get(notify_routes::unread_count),
        )
        .route(
            "/notifications/mark-read",
            axum::routing::post(notify_routes::mark_all_read),
        )
        .route(
            "/notifications/{id}/mark-read",
            axum::routing::post(notify_routes::mark_single_read),
        );

    let installation_routes = Router::new()
        .route(
            "/installations",
            axum::routing::post(installations::create_installation),
        )
        .route(
            "/installations",
            axum::routing::get(installations::list_installations),
        );

    let sales_routes = Router::new()
        .route("/sales/leads", axum::routing::post(sales::create_lead))
        .route(
            "/sales/notifications/run",
            axum::routing::post(sales::run_notifications),
        );

    // WebSocket endpoint (auth via query param, not JWT header)
    let ws_routes = Router::new().route("/ws/live", axum::routing::get(ws_handler::ws_upgrade));

    // Health check
    let health = Router::new().route("/health", axum::routing::get(health_check));

    Router::new()
        .merge(auth_routes)
        .merge(notification_routes)
        .merge(installation_routes)
        .merge(sales_routes)
        .merge(ws_routes)
        .merge(health)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            inject_jwt_secret,
        ))
        .with_state(state)
}

/// Health check: confirms the database answers a trivial query.
async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<&'static str, axum::http::StatusCode> {
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| axum::http::StatusCode::SERVICE_UNAVAILABLE)?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|_| axum::http::StatusCode::SERVICE_UNAVAILABLE)
    })
    .await
    .map_err(|_| axum::http::StatusCode::SERVICE_UNAVAILABLE)??;
    Ok("ok")
}
