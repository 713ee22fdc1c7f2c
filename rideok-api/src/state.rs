use std::sync::Arc;

use rideok_core::repository::UserRepository;
use rideok_core::RideLifecycle;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<RideLifecycle>,
    pub users: Arc<dyn UserRepository>,
    pub auth: AuthConfig,
}
