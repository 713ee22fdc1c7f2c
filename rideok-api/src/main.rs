use std::net::SocketAddr;
use std::sync::Arc;

use rideok_api::{
    app,
    state::{AppState, AuthConfig},
};
use rideok_core::repository::{RideRepository, UserRepository};
use rideok_core::{ExpirySweeper, RideLifecycle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rideok_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = rideok_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting RideOK API on port {}", config.server.port);

    // Postgres Connection
    let db = rideok_store::DbClient::new(&config.database.url)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");

    let rides: Arc<dyn RideRepository> =
        Arc::new(rideok_store::PostgresRideRepository::new(db.pool.clone()));
    let users: Arc<dyn UserRepository> =
        Arc::new(rideok_store::PostgresUserRepository::new(db.pool.clone()));
    let lifecycle = Arc::new(RideLifecycle::new(rides.clone(), users.clone()));

    // Expiration sweeper runs independently of request handling
    let expiry = ExpirySweeper::new(rides.clone(), config.sweeper.batch_size);
    rideok_api::sweeper::spawn(expiry, config.sweeper.interval_seconds);

    let app_state = AppState {
        lifecycle,
        users,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
