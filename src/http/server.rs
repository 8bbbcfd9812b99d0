//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Wire up middleware (request id, tracing, timeout, body limit, identity)
//! - Serve plain TCP or TLS until shutdown
//! - Apply hot-reloaded pricing to the live calculator

use axum::{
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer, map_response_body::MapResponseBodyLayer, timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin::setup_admin_router;
use crate::config::DispatchConfig;
use crate::http::middleware::identity_middleware;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::http::{drivers, rides, websocket};
use crate::lifecycle::{Services, Shutdown};
use crate::notify::ConnectionTracker;
use crate::security::{rate_limit_middleware, RateLimiter};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub config: Arc<DispatchConfig>,
    pub limiter: Arc<RateLimiter>,
    pub connections: ConnectionTracker,
    /// Closes open driver sockets when the server stops.
    pub shutdown: Shutdown,
    pub started_at: Instant,
}

/// HTTP server for the dispatch API.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    pub fn new(config: DispatchConfig, services: Services) -> Self {
        let state = AppState {
            services,
            limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
            config: Arc::new(config),
            connections: ConnectionTracker::new(),
            shutdown: Shutdown::new(),
            started_at: Instant::now(),
        };
        let router = Self::build_router(state.clone());
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState) -> Router {
        let config = Arc::clone(&state.config);

        let ride_requests = Router::new()
            .route("/v1/rides", post(rides::request_ride))
            .route_layer(middleware::from_fn_with_state(
                Arc::clone(&state.limiter),
                rate_limit_middleware,
            ));

        let api = Router::new()
            .merge(ride_requests)
            .route("/v1/rides/{id}", get(rides::get_ride))
            .route("/v1/rides/{id}/status", post(rides::update_status))
            .route("/v1/drivers/location", put(drivers::update_location))
            .route("/v1/drivers/availability", put(drivers::set_availability))
            .route("/v1/drivers/nearby", get(drivers::nearby))
            .route("/v1/drivers/ws", get(websocket::driver_channel))
            .route_layer(middleware::from_fn_with_state(state.clone(), identity_middleware));

        let mut app = Router::new()
            .route("/health", get(health))
            .merge(api)
            .with_state(state.clone());

        if config.admin.enabled {
            app = app.merge(setup_admin_router(state));
        }

        // Outermost first: the request id exists before tracing sees the request.
        app.layer(
            ServiceBuilder::new()
                .layer(set_request_id_layer())
                .layer(propagate_request_id_layer())
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(config.timeouts.request()))
                .layer(MapResponseBodyLayer::new(axum::body::Body::new))
                .layer(RequestBodyLimitLayer::new(config.listener.max_body_bytes)),
        )
    }

    /// The fully layered router, for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.state.config
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<DispatchConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        self.spawn_reloader(config_updates);
        let internal = self.state.shutdown.clone();

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
                internal.trigger();
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Serve TLS on `addr` until `shutdown` fires.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: axum_server::tls_rustls::RustlsConfig,
        config_updates: mpsc::UnboundedReceiver<DispatchConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        tracing::info!(address = %addr, "HTTPS server starting");

        self.spawn_reloader(config_updates);
        let handle = axum_server::Handle::new();
        let drain = handle.clone();
        let internal = self.state.shutdown.clone();
        let grace = self.state.config.timeouts.request();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTPS server draining");
            internal.trigger();
            drain.graceful_shutdown(Some(grace));
        });

        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(self.router.into_make_service())
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }

    fn spawn_reloader(&self, mut updates: mpsc::UnboundedReceiver<DispatchConfig>) {
        let state = self.state.clone();
        let mut stop = state.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = updates.recv() => match update {
                        Some(config) => apply_reload(&state, config),
                        None => break,
                    },
                    _ = stop.recv() => break,
                }
            }
        });
    }
}

/// Pricing changes apply live; everything else waits for a restart.
fn apply_reload(state: &AppState, new: DispatchConfig) {
    let pricing = state.services.pricing.current();
    if *pricing != new.pricing {
        state.services.pricing.update(new.pricing);
    } else {
        tracing::debug!("Pricing unchanged");
    }
    tracing::info!("Configuration reloaded; non-pricing sections take effect after restart");
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::TokenConfig;
    use crate::identity::Role;
    use crate::location::GeoPoint;
    use crate::pricing::FixedClock;
    use crate::storage::{DriverDirectory, MemoryStore};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    fn server() -> HttpServer {
        let mut config = DispatchConfig::default();
        config.identity.tokens = vec![
            TokenConfig {
                token: "rider-token".into(),
                subject: "rider-1".into(),
                role: Role::Rider,
            },
            TokenConfig {
                token: "driver-token".into(),
                subject: "driver1".into(),
                role: Role::Driver,
            },
        ];
        config.admin.enabled = true;
        config.admin.api_key = "admin-key".into();
        let store = Arc::new(MemoryStore::new());
        let services = Services::with_store(&config, store, Arc::new(FixedClock::at_hour(12)));
        HttpServer::new(config, services)
    }

    fn post_json(uri: &str, token: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_has_request_id() {
        let response = server()
            .router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn request_id_is_echoed() {
        let response = server()
            .router()
            .oneshot(
                Request::get("/health")
                    .header("x-request-id", "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["x-request-id"], "abc-123");
    }

    #[tokio::test]
    async fn rides_require_credentials() {
        let response = server()
            .router()
            .oneshot(
                Request::post("/v1/rides")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"pickup":{"lat":0.0,"lng":0.0}}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"], "unauthenticated");
    }

    #[tokio::test]
    async fn drivers_cannot_request_rides() {
        let response = server()
            .router()
            .oneshot(post_json("/v1/rides", "driver-token", json!({"pickup": {"lat": 0.0, "lng": 0.0}})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn bad_coordinates_are_400() {
        let response = server()
            .router()
            .oneshot(post_json("/v1/rides", "rider-token", json!({"pickup": {"lat": 95.0, "lng": 0.0}})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "validation_error");
    }

    #[tokio::test]
    async fn malformed_json_is_400() {
        let response = server()
            .router()
            .oneshot(
                Request::post("/v1/rides")
                    .header(header::AUTHORIZATION, "Bearer rider-token")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn no_driver_is_200_outcome() {
        let response = server()
            .router()
            .oneshot(post_json("/v1/rides", "rider-token", json!({"pickup": {"lat": 0.3135, "lng": 32.5811}})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["outcome"], "no_driver_available");
    }

    #[tokio::test]
    async fn assigned_ride_is_visible_to_both_parties_only() {
        let server = server();
        server
            .state()
            .services
            .store
            .upsert_location(&"driver1".into(), GeoPoint::new(0.3140, 32.5811).unwrap())
            .unwrap();
        let router = server.router();

        let response = router
            .clone()
            .oneshot(post_json("/v1/rides", "rider-token", json!({"pickup": {"lat": 0.3135, "lng": 32.5811}})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["outcome"], "assigned");
        assert_eq!(body["driver"]["id"], "driver1");
        assert_eq!(body["status"], "requested");
        let ride_id = body["ride_id"].as_str().unwrap().to_string();

        for token in ["rider-token", "driver-token"] {
            let response = router
                .clone()
                .oneshot(
                    Request::get(format!("/v1/rides/{ride_id}"))
                        .header(header::AUTHORIZATION, format!("Bearer {token}"))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn admin_requires_key() {
        let router = server().router();
        let response = router
            .clone()
            .oneshot(Request::get("/admin/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = router
            .oneshot(
                Request::get("/admin/status")
                    .header(header::AUTHORIZATION, "Bearer admin-key")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "operational");
    }

    #[tokio::test]
    async fn admin_registers_driver() {
        let server = server();
        let response = server
            .router()
            .oneshot(post_json(
                "/admin/drivers",
                "admin-key",
                json!({
                    "driver_id": "d9",
                    "profile": {"name": "Musa", "rating": 4.6, "vehicle": "Honda Fit"},
                    "position": {"lat": 0.31, "lng": 32.58}
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let driver = server.state().services.store.get_driver(&"d9".into()).unwrap().unwrap();
        assert_eq!(driver.profile.name, "Musa");
        assert!(driver.available);
    }

    #[test]
    fn reload_swaps_pricing() {
        let server = server();
        let mut config = DispatchConfig::default();
        config.pricing.base_fare = 9.0;
        apply_reload(server.state(), config);
        assert_eq!(server.state().services.pricing.current().base_fare, 9.0);
    }
}
