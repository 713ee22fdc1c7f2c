use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::CoreResult;
use crate::ride::{Ride, RidePassenger};
use crate::user::User;

/// Repository trait for ride records and their participant sub-records.
///
/// The mutation methods that touch the seat count (`book_seat`,
/// `approve_request`, `remove_participant`) must check and adjust
/// `available_seats` in a single conditional storage operation, so two
/// concurrent calls can never drive the count negative.
#[async_trait]
pub trait RideRepository: Send + Sync {
    async fn insert(&self, ride: &Ride) -> CoreResult<()>;

    async fn get(&self, id: Uuid) -> CoreResult<Option<Ride>>;

    /// Case-insensitive substring match on both location fields, restricted
    /// to upcoming rides (future `ride_time`, not flagged expired).
    async fn search(
        &self,
        start_location: &str,
        end_location: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<Ride>>;

    /// All upcoming rides.
    async fn list_upcoming(&self, now: DateTime<Utc>) -> CoreResult<Vec<Ride>>;

    /// Upcoming rides where the user is the driver or appears among the
    /// participants in any status.
    async fn list_for_user(&self, user_id: Uuid, now: DateTime<Utc>) -> CoreResult<Vec<Ride>>;

    /// Overwrites the ride's own fields (not its participant list).
    async fn save(&self, ride: &Ride) -> CoreResult<()>;

    /// Hard delete. Returns false when the ride was already gone.
    async fn delete(&self, id: Uuid) -> CoreResult<bool>;

    /// Appends `passenger` and decrements the seat count in one conditional
    /// operation. Fails with `CoreError::Capacity` when no seats remain and
    /// `CoreError::NotFound` when the ride does not exist.
    async fn book_seat(&self, ride_id: Uuid, passenger: RidePassenger) -> CoreResult<Ride>;

    /// Appends a pending request without touching the seat count.
    async fn add_request(&self, ride_id: Uuid, passenger: RidePassenger) -> CoreResult<Ride>;

    /// Promotes the REQUESTED entry with sub-record id `request_id` to
    /// APPROVED, consuming a seat in the same conditional operation.
    async fn approve_request(&self, ride_id: Uuid, request_id: Uuid) -> CoreResult<Ride>;

    /// Removes the first entry whose embedded user reference matches
    /// `user_id`, releasing the seat when the entry held one.
    async fn remove_participant(&self, ride_id: Uuid, user_id: Uuid) -> CoreResult<Ride>;

    /// One sweeper batch: captures up to `limit` past-due, not-yet-expired
    /// ride ids, then flags exactly that set. Returns how many were flagged.
    async fn mark_expired(&self, now: DateTime<Utc>, limit: u32) -> CoreResult<u64>;
}

/// Repository trait for user accounts.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert(&self, user: &User) -> CoreResult<()>;

    async fn get(&self, id: Uuid) -> CoreResult<Option<User>>;

    async fn find_by_email(&self, email: &str) -> CoreResult<Option<User>>;

    async fn save(&self, user: &User) -> CoreResult<()>;

    /// Hard delete. Returns false when the user was already gone.
    async fn delete(&self, id: Uuid) -> CoreResult<bool>;
}
