use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use hospital_api::ApiError;
use hospital_auth::AuthService;
use hospital_storage::DynStorage;
use tokio::net::TcpListener;
use tower_http::{
    catch_panic::CatchPanicLayer, compression::CompressionLayer, cors::CorsLayer,
    trace::TraceLayer,
};

use crate::cache::{CacheStore, ResponseCache, create_cache_store, spawn_purge_task};
use crate::{bootstrap, config::AppConfig, create_storage, handlers, middleware as app_middleware};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub storage: DynStorage,
    pub cache: ResponseCache,
    pub auth: Arc<AuthService>,
}

pub struct HospitalServer {
    addr: SocketAddr,
    app: Router,
    state: AppState,
}

pub fn build_app(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit_bytes;

    let protected = Router::new()
        .route("/logout", post(handlers::auth::logout))
        .route("/me", get(handlers::auth::me))
        .route(
            "/patients",
            get(handlers::patients::list_patients).post(handlers::patients::create_patient),
        )
        .route(
            "/patients/{id}",
            get(handlers::patients::get_patient)
                .put(handlers::patients::update_patient)
                .delete(handlers::patients::delete_patient),
        )
        .route(
            "/visits",
            get(handlers::visits::list_visits).post(handlers::visits::create_visit),
        )
        .route(
            "/visits/{id}",
            get(handlers::visits::get_visit)
                .put(handlers::visits::update_visit)
                .delete(handlers::visits::delete_visit),
        )
        .route(
            "/prescriptions",
            get(handlers::prescriptions::list_prescriptions)
                .post(handlers::prescriptions::create_prescription),
        )
        .route(
            "/prescriptions/{id}",
            get(handlers::prescriptions::get_prescription)
                .put(handlers::prescriptions::update_prescription)
                .delete(handlers::prescriptions::delete_prescription),
        )
        .route(
            "/reports",
            get(handlers::reports::list_reports).post(handlers::reports::create_report),
        )
        .route(
            "/reports/{id}",
            get(handlers::reports::get_report)
                .put(handlers::reports::update_report)
                .delete(handlers::reports::delete_report),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::authentication_middleware,
        ));

    Router::new()
        // Service and documentation endpoints
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .route("/metrics", get(handlers::metrics))
        .route("/docs/validation-rules", get(handlers::validation_rules))
        .route("/login", post(handlers::auth::login))
        .merge(protected)
        .fallback(handlers::not_found)
        .with_state(state)
        // Middleware stack, innermost first: panics -> error envelope -> metrics
        // -> cors/compression -> trace -> request id -> body limit
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn(app_middleware::hypermedia_errors))
        .layer(middleware::from_fn(app_middleware::track_metrics))
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .extensions()
                        .get::<axum::http::HeaderValue>()
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(middleware::from_fn(app_middleware::request_id))
        .layer(DefaultBodyLimit::max(body_limit))
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    ApiError::internal(format!("handler panicked: {detail}")).into_response()
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    storage: Option<DynStorage>,
    cache_store: Option<Arc<dyn CacheStore>>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
            storage: None,
            cache_store: None,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Uses `storage` instead of the backend named in the configuration.
    pub fn with_storage(mut self, storage: DynStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Uses `store` instead of the cache backend named in the configuration.
    pub fn with_cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache_store = Some(store);
        self
    }

    /// Connects storage and cache, runs bootstrap provisioning and assembles
    /// the router.
    pub async fn build(self) -> anyhow::Result<HospitalServer> {
        crate::metrics::init_metrics();
        let config = Arc::new(self.config);

        let storage = match self.storage {
            Some(storage) => storage,
            None => create_storage(&config.storage).await?,
        };
        let store = match self.cache_store {
            Some(store) => store,
            None => create_cache_store(&config.redis, &config.cache).await,
        };
        spawn_purge_task(&store, config.cache.purge_interval());
        let cache = ResponseCache::new(store, &config.cache);

        if config.auth.enabled && config.auth.uses_default_secret() {
            tracing::warn!("auth.jwt_secret is the built-in default; set HOSPITAL__AUTH__JWT_SECRET");
        }
        if !config.auth.enabled {
            tracing::warn!("authentication is disabled, protected routes accept anonymous requests");
        }
        let auth = Arc::new(AuthService::new(storage.clone(), &config.auth));

        bootstrap::run(&config.bootstrap, &auth, &storage).await?;

        let state = AppState {
            config,
            storage,
            cache,
            auth,
        };
        Ok(HospitalServer {
            addr: self.addr,
            app: build_app(state.clone()),
            state,
        })
    }
}

impl HospitalServer {
    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn router(&self) -> Router {
        self.app.clone()
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve(listener).await
    }

    /// Serves on an already bound listener until Ctrl+C.
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        tracing::info!(
            addr = %listener.local_addr()?,
            storage = self.state.storage.backend_name(),
            cache = self.state.cache.backend_name(),
            "listening"
        );
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
