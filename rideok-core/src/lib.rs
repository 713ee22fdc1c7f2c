pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod repository;
pub mod ride;
pub mod sweeper;
pub mod user;

pub use error::{CoreError, CoreResult};
pub use lifecycle::{RideLifecycle, RideWithDriver};
pub use memory::MemoryStore;
pub use ride::{NewRide, PassengerRequest, PassengerStatus, Ride, RidePassenger, RideUpdate};
pub use sweeper::ExpirySweeper;
pub use user::{DriverSummary, User};
