//! # holdctl: Capacity Reservation Engine
//!
//! `holdctl` sells finite inventory (seats, tickets, slots) through time-limited holds. A client
//! places a hold on one unit of an event, which takes the unit out of the event's
//! `available_capacity` until the hold's deadline. Confirming the hold before the deadline makes
//! the allocation permanent; otherwise a background sweeper deletes the hold and returns the unit.
//!
//! ## Invariant
//!
//! For every event, after every committed transaction:
//!
//! ```text
//! available_capacity == capacity - count(reservations in HOLD or CONFIRMED)
//! ```
//!
//! Every path that touches the ledger (placing a hold, reclaiming an expired one) runs in one
//! transaction holding the event's row lock, so concurrent callers can never oversell or double
//! credit a unit.
//!
//! ## Architecture
//!
//! The HTTP layer is built on [Axum](https://github.com/tokio-rs/axum). Storage is pluggable
//! behind the [`storage::Storage`] trait: PostgreSQL (row locks via `SELECT ... FOR UPDATE`) for
//! production, or an in-process implementation for development and tests.
//!
//! - [`api`]: route handlers and request/response models
//! - [`auth`]: bearer token verification
//! - [`reservations`]: the ledger, state machine, service and expiry sweeper
//! - [`storage`] / [`db`]: persistence
//! - [`config`] / [`telemetry`]: ambient setup
//!
//! ## Lifecycle
//!
//! 1. **Create**: [`Application::new`] connects storage, runs migrations and starts the sweeper
//! 2. **Serve**: [`Application::serve`] binds to a TCP port and handles requests
//! 3. **Shutdown**: on the shutdown signal, the sweeper is cancelled and awaited, the pool closed
//!    and telemetry flushed

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod reservations;
pub mod storage;
pub mod telemetry;
#[cfg(test)]
mod test_utils;
pub mod types;

use axum::{
    Json, Router,
    http::{self, HeaderValue},
    routing::{get, post},
};
use bon::Builder;
use chrono::TimeDelta;
pub use config::Config;
use config::{CorsOrigin, DatabaseConfig, PoolSettings};
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::{CancellationToken, DropGuard};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;

use crate::api::{handlers, openapi::ApiDoc};
use crate::reservations::{Clock, ExpirySweeper, ReservationService, SystemClock};
use crate::storage::{InMemoryStorage, PostgresStorage, Storage};

/// Application state shared across all request handlers.
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .service(service)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState<S: Storage> {
    pub config: Config,
    pub service: ReservationService<S>,
}

/// Get the holdctl database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let allowed_origins = &config.security.cors.allowed_origins;

    // tower-http rejects `*` inside an origin list
    let allow_origin = if allowed_origins.contains(&CorsOrigin::Wildcard) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                // Origins never carry a path; `Url` always renders one
                origins.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([http::Method::GET, http::Method::POST])
        .allow_headers([http::header::AUTHORIZATION, http::header::CONTENT_TYPE])
        .allow_credentials(config.security.cors.allow_credentials);

    if let Some(max_age) = config.security.cors.max_age {
        cors = cors.max_age(Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router with all endpoints and middleware.
#[instrument(skip_all)]
pub fn build_router<S: Storage>(state: AppState<S>) -> anyhow::Result<Router> {
    let cors_layer = create_cors_layer(&state.config)?;

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .route("/events", post(handlers::events::create_event::<S>))
        .route("/events/{event_id}", get(handlers::events::get_event::<S>))
        .route("/reservations/hold", post(handlers::reservations::place_hold::<S>))
        .route(
            "/reservations/confirm/{reservation_id}",
            post(handlers::reservations::confirm_hold::<S>),
        )
        .route("/reservations/{reservation_id}", get(handlers::reservations::get_reservation::<S>))
        .with_state(state)
        .layer(cors_layer)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    Ok(router)
}

/// Container for background services and their lifecycle management.
///
/// The [`shutdown`](BackgroundServices::shutdown) method stops all background tasks and waits
/// for them. When dropped, the `drop_guard` cancels the shutdown token, signalling all tasks to
/// stop.
pub struct BackgroundServices {
    background_tasks: Vec<tokio::task::JoinHandle<()>>,
    shutdown_token: CancellationToken,
    // Pub so that we can disarm it if we want to
    pub drop_guard: Option<DropGuard>,
}

impl BackgroundServices {
    /// Gracefully shutdown all background tasks
    pub async fn shutdown(self) {
        self.shutdown_token.cancel();

        for handle in self.background_tasks {
            let _ = handle.await;
        }
    }
}

/// Start the expiry sweeper, unless disabled in config
fn setup_background_services<S: Storage>(storage: S, clock: Arc<dyn Clock>, config: &Config) -> BackgroundServices {
    let shutdown_token = CancellationToken::new();
    let drop_guard = shutdown_token.clone().drop_guard();
    let mut background_tasks = Vec::new();

    let sweeper_config = &config.background_services.expiry_sweeper;
    if sweeper_config.enabled {
        let sweeper = ExpirySweeper::new(storage, clock, sweeper_config.interval, sweeper_config.batch_size);
        let handle = tokio::spawn(sweeper.run(shutdown_token.clone()));
        background_tasks.push(handle);
    } else {
        info!("Expiry sweeper disabled; expired holds will not be reclaimed by this instance");
    }

    BackgroundServices {
        background_tasks,
        shutdown_token,
        drop_guard: Some(drop_guard),
    }
}

async fn connect_pool(url: &str, settings: &PoolSettings) -> anyhow::Result<PgPool> {
    let mut options = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs));

    // 0 = never
    if settings.idle_timeout_secs > 0 {
        options = options.idle_timeout(Duration::from_secs(settings.idle_timeout_secs));
    }
    if settings.max_lifetime_secs > 0 {
        options = options.max_lifetime(Duration::from_secs(settings.max_lifetime_secs));
    }

    Ok(options.connect(url).await?)
}

/// Main application struct that owns all resources and manages the lifecycle
pub struct Application {
    router: Router,
    config: Config,
    pool: Option<PgPool>,
    bg_services: BackgroundServices,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting holdctl with configuration: {:#?}", config);

        match config.database.clone() {
            DatabaseConfig::Memory => {
                info!("Using in-memory storage; all events and reservations are lost on shutdown");
                Self::with_storage(config, InMemoryStorage::new(), None)
            }
            DatabaseConfig::Postgres { url, pool: settings } => {
                info!("Using PostgreSQL storage");
                let pool = connect_pool(&url, &settings).await?;
                migrator().run(&pool).await?;
                Self::with_storage(config, PostgresStorage::new(pool.clone()), Some(pool))
            }
        }
    }

    fn with_storage<S: Storage>(config: Config, storage: S, pool: Option<PgPool>) -> anyhow::Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let service = ReservationService::builder()
            .storage(storage.clone())
            .clock(clock.clone())
            .hold_ttl(TimeDelta::from_std(config.reservations.hold_ttl)?)
            .build();

        let app_state = AppState::builder().config(config.clone()).service(service).build();
        let router = build_router(app_state)?;

        let bg_services = setup_background_services(storage, clock, &config);

        Ok(Self {
            router,
            config,
            pool,
            bg_services,
        })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> (axum_test::TestServer, BackgroundServices) {
        let server = axum_test::TestServer::new(self.router).expect("Failed to create test server");
        (server, self.bg_services)
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "holdctl listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Stopping background services...");
        self.bg_services.shutdown().await;

        if let Some(pool) = self.pool {
            info!("Closing database connections...");
            pool.close().await;
        }

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
