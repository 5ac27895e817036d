use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

use crate::proxy::auth::AuthResolver;
use crate::proxy::config::{GatewayConfig, ResolutionMode};
use crate::proxy::deployment::{DeploymentCache, DeploymentResolver, LocalManifests, NetworkDiscovery};
use crate::proxy::forwarder::Forwarder;
use crate::proxy::middleware::auth::API_PREFIX;
use crate::proxy::upstream::AuthorityClient;

const MAX_BODY_BYTES: usize = 100 * 1024 * 1024;

/// Axum application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub authority: Arc<AuthorityClient>,
    pub resolver: Arc<AuthResolver>,
    pub deployments: Arc<dyn DeploymentResolver>,
    pub forwarder: Arc<Forwarder>,
    pub started_at: Instant,
}

impl AppState {
    /// Wire every component from config, picking the deployment resolver by mode.
    pub fn from_config(config: GatewayConfig) -> Result<Self, String> {
        let deployments: Arc<dyn DeploymentResolver> = match config.resolution {
            ResolutionMode::Remote => Arc::new(NetworkDiscovery::new(
                &config,
                Arc::new(DeploymentCache::new()),
            )?),
            ResolutionMode::Local => {
                let dir = config
                    .local
                    .manifests_dir
                    .clone()
                    .ok_or_else(|| "local resolution needs local.manifests_dir".to_string())?;
                Arc::new(LocalManifests::new(dir, config.local.base_port))
            }
        };
        Self::with_deployments(config, deployments)
    }

    pub fn with_deployments(
        config: GatewayConfig,
        deployments: Arc<dyn DeploymentResolver>,
    ) -> Result<Self, String> {
        let authority = Arc::new(AuthorityClient::new(&config)?);
        let resolver = Arc::new(AuthResolver::new(authority.clone()));
        let forwarder = Arc::new(Forwarder::new(&config)?);

        tracing::info!(
            resolution = deployments.name(),
            api_url = %config.api_url,
            "gateway state initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            authority,
            resolver,
            deployments,
            forwarder,
            started_at: Instant::now(),
        })
    }
}

fn routes(state: &AppState) -> Router<AppState> {
    use crate::proxy::handlers;

    let pages = &state.config.pages_dir;
    Router::new()
        .route("/", get(handlers::status::root))
        .route_service("/docs", ServeFile::new(pages.join("docs.html")))
        .route("/healthcheck", get(handlers::status::healthcheck))
        .route("/verify", get(handlers::status::verify))
        // Session
        .route_service("/auth/login", ServeFile::new(pages.join("login.html")))
        .route_service("/auth/callback", ServeFile::new(pages.join("callback.html")))
        .route("/auth/set-token", post(handlers::auth::set_token))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/auth/magic-link", post(handlers::auth::magic_link))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/me", get(handlers::auth::me))
        .route("/auth/:provider", get(handlers::auth::oauth_redirect))
        // Workforce
        .route("/workforce", get(handlers::workforce::list_workforce))
        .route("/workforce/:id", post(handlers::workforce::handle_run))
        .route("/workforce/:id/stream", post(handlers::workforce::handle_stream))
}

/// Full router: every route at the root and again under `/api`.
pub fn build_router(state: AppState) -> Router {
    let routes = routes(&state);

    Router::new()
        .merge(routes.clone())
        .nest(API_PREFIX, routes)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::proxy::middleware::auth_middleware,
        ))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(crate::proxy::middleware::cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Axum server instance
pub struct GatewayServer {
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl GatewayServer {
    /// Bind and start serving in a background task.
    pub async fn start(state: AppState) -> Result<(Self, tokio::task::JoinHandle<()>), String> {
        let addr = format!("{}:{}", state.config.get_bind_address(), state.config.port);
        let app = build_router(state);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| format!("Failed to bind address {}: {}", addr, e))?;

        tracing::info!("Workforce gateway started at http://{}", addr);

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            use hyper::server::conn::http1;
            use hyper_util::rt::TokioIo;
            use hyper_util::service::TowerToHyperService;

            loop {
                tokio::select! {
                    res = listener.accept() => {
                        match res {
                            Ok((stream, _)) => {
                                let io = TokioIo::new(stream);
                                let service = TowerToHyperService::new(app.clone());

                                tokio::task::spawn(async move {
                                    if let Err(err) = http1::Builder::new()
                                        .serve_connection(io, service)
                                        .await
                                    {
                                        debug!("Connection handling ended or error: {:?}", err);
                                    }
                                });
                            }
                            Err(e) => {
                                error!("Failed to accept connection: {:?}", e);
                            }
                        }
                    }
                    _ = &mut shutdown_rx => {
                        tracing::info!("Workforce gateway stopped listening");
                        break;
                    }
                }
            }
        });

        Ok((Self { shutdown_tx: Some(shutdown_tx) }, handle))
    }

    /// Stop the server
    pub fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
