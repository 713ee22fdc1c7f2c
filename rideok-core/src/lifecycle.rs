use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::repository::{RideRepository, UserRepository};
use crate::ride::{NewRide, PassengerRequest, Ride, RidePassenger, RideUpdate};
use crate::user::{DriverSummary, User};

/// A ride with its driver's public identity attached, the shape returned
/// by search and detail reads.
#[derive(Debug, Clone, Serialize)]
pub struct RideWithDriver {
    #[serde(flatten)]
    pub ride: Ride,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<DriverSummary>,
}

/// Owns ride records and their participant sub-records: seat-availability
/// rules, driver-only mutation rights, approval/rejection transitions and
/// the read paths that filter out past or expired rides.
pub struct RideLifecycle {
    rides: Arc<dyn RideRepository>,
    users: Arc<dyn UserRepository>,
}

impl RideLifecycle {
    pub fn new(rides: Arc<dyn RideRepository>, users: Arc<dyn UserRepository>) -> Self {
        Self { rides, users }
    }

    pub async fn create_ride(&self, driver_id: Uuid, new: NewRide) -> CoreResult<Ride> {
        let ride = new.into_ride(driver_id, Utc::now())?;
        self.rides.insert(&ride).await?;
        info!("Ride created: {} ({} -> {})", ride.id, ride.start_location, ride.end_location);
        Ok(ride)
    }

    /// Case-insensitive substring search over both location fields. The
    /// time filter is applied at query time so rides the sweeper has not
    /// reached yet are still excluded.
    pub async fn search_rides(
        &self,
        start_location: &str,
        end_location: &str,
    ) -> CoreResult<Vec<RideWithDriver>> {
        let rides = self
            .rides
            .search(start_location, end_location, Utc::now())
            .await?;
        self.attach_drivers(rides).await
    }

    /// Books a seat for `passenger`, snapshotting their contact details.
    /// The seat check and decrement happen in one storage operation.
    pub async fn book_ride(&self, ride_id: Uuid, passenger: &User) -> CoreResult<Ride> {
        let ride = self
            .rides
            .book_seat(ride_id, RidePassenger::booked(passenger))
            .await?;
        info!("Ride {} booked by {}", ride_id, passenger.id);
        Ok(ride)
    }

    /// Files a pending request; seats are untouched until the driver
    /// approves.
    pub async fn request_ride(&self, ride_id: Uuid, request: PassengerRequest) -> CoreResult<Ride> {
        let user_id = request
            .user_id
            .ok_or_else(|| CoreError::validation("passengerData.user is required"))?;

        self.rides
            .add_request(
                ride_id,
                RidePassenger::requested(user_id, request.phone_number, request.location),
            )
            .await
    }

    /// Driver-only. Promotes a pending request into the confirmed passenger
    /// set, consuming a seat.
    pub async fn approve_passenger(
        &self,
        ride_id: Uuid,
        passenger_id: Uuid,
        caller: Uuid,
    ) -> CoreResult<Ride> {
        self.owned_ride(ride_id, caller).await?;
        self.rides.approve_request(ride_id, passenger_id).await
    }

    /// Driver-only. Removes the participant whose user reference matches
    /// `passenger_id`; a held seat is released back to the pool.
    pub async fn reject_passenger(
        &self,
        ride_id: Uuid,
        passenger_id: Uuid,
        caller: Uuid,
    ) -> CoreResult<Ride> {
        self.owned_ride(ride_id, caller).await?;
        self.rides.remove_participant(ride_id, passenger_id).await
    }

    /// Driver-only partial update. Present fields overwrite, absent fields
    /// are left alone; `is_expired` may be set either way.
    pub async fn update_ride(
        &self,
        ride_id: Uuid,
        update: RideUpdate,
        caller: Uuid,
    ) -> CoreResult<Ride> {
        update.validate()?;
        let mut ride = self.owned_ride(ride_id, caller).await?;
        ride.apply(update, Utc::now());
        self.rides.save(&ride).await?;
        Ok(ride)
    }

    /// Driver-only hard delete.
    pub async fn delete_ride(&self, ride_id: Uuid, caller: Uuid) -> CoreResult<()> {
        self.owned_ride(ride_id, caller).await?;
        if !self.rides.delete(ride_id).await? {
            return Err(CoreError::NotFound("Ride"));
        }
        info!("Ride deleted: {}", ride_id);
        Ok(())
    }

    pub async fn ride_details(&self, ride_id: Uuid) -> CoreResult<RideWithDriver> {
        let ride = self
            .rides
            .get(ride_id)
            .await?
            .ok_or(CoreError::NotFound("Ride"))?;
        let driver = self.users.get(ride.driver_id).await?;
        Ok(RideWithDriver {
            ride,
            driver: driver.as_ref().map(DriverSummary::from),
        })
    }

    /// All rides still open for booking (future departure, not expired).
    pub async fn all_rides(&self) -> CoreResult<Vec<RideWithDriver>> {
        let rides = self.rides.list_upcoming(Utc::now()).await?;
        self.attach_drivers(rides).await
    }

    /// Upcoming rides the user drives, rides they sit in, and rides they
    /// have asked to join.
    pub async fn user_rides(&self, user_id: Uuid) -> CoreResult<Vec<RideWithDriver>> {
        let rides = self.rides.list_for_user(user_id, Utc::now()).await?;
        self.attach_drivers(rides).await
    }

    /// Fetches the ride and enforces the driver-only mutation rule.
    async fn owned_ride(&self, ride_id: Uuid, caller: Uuid) -> CoreResult<Ride> {
        let ride = self
            .rides
            .get(ride_id)
            .await?
            .ok_or(CoreError::NotFound("Ride"))?;

        if ride.driver_id != caller {
            return Err(CoreError::Forbidden);
        }
        Ok(ride)
    }

    async fn attach_drivers(&self, rides: Vec<Ride>) -> CoreResult<Vec<RideWithDriver>> {
        let mut out = Vec::with_capacity(rides.len());
        for ride in rides {
            let driver = self.users.get(ride.driver_id).await?;
            out.push(RideWithDriver {
                ride,
                driver: driver.as_ref().map(DriverSummary::from),
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::ride::PassengerStatus;
    use chrono::{Duration, NaiveDate};

    struct Fixture {
        lifecycle: RideLifecycle,
        users: Arc<MemoryStore>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        Fixture {
            lifecycle: RideLifecycle::new(store.clone(), store.clone()),
            users: store,
        }
    }

    async fn seed_user(fx: &Fixture, name: &str) -> User {
        let mut user = User::new(
            name.to_string(),
            format!("{}@example.com", name),
            "hash".to_string(),
            Utc::now(),
        );
        user.phone_number = Some("555-0100".to_string());
        user.location = Some("Downtown".to_string());
        UserRepository::insert(fx.users.as_ref(), &user)
            .await
            .unwrap();
        user
    }

    fn new_ride(seats: i32) -> NewRide {
        NewRide {
            start_location: Some("Pune".to_string()),
            end_location: Some("Mumbai".to_string()),
            price: Some(250.0),
            available_seats: Some(seats),
            ride_date: Some(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()),
            ride_time: Some(Utc::now() + Duration::days(1)),
        }
    }

    #[tokio::test]
    async fn test_booking_stops_at_zero_seats() {
        let fx = fixture();
        let driver = seed_user(&fx, "driver").await;
        let ride = fx
            .lifecycle
            .create_ride(driver.id, new_ride(2))
            .await
            .unwrap();

        let a = seed_user(&fx, "a").await;
        let b = seed_user(&fx, "b").await;
        let c = seed_user(&fx, "c").await;

        let after_a = fx.lifecycle.book_ride(ride.id, &a).await.unwrap();
        assert_eq!(after_a.available_seats, 1);

        let after_b = fx.lifecycle.book_ride(ride.id, &b).await.unwrap();
        assert_eq!(after_b.available_seats, 0);
        assert_eq!(after_b.passengers().count(), 2);

        let err = fx.lifecycle.book_ride(ride.id, &c).await.unwrap_err();
        assert!(matches!(err, CoreError::Capacity));
    }

    #[tokio::test]
    async fn test_booking_snapshots_contact_details() {
        let fx = fixture();
        let driver = seed_user(&fx, "driver").await;
        let ride = fx
            .lifecycle
            .create_ride(driver.id, new_ride(1))
            .await
            .unwrap();

        let rider = seed_user(&fx, "rider").await;
        let booked = fx.lifecycle.book_ride(ride.id, &rider).await.unwrap();

        let entry = booked.passengers().next().unwrap();
        assert_eq!(entry.user_id, rider.id);
        assert_eq!(entry.phone_number.as_deref(), Some("555-0100"));
        assert_eq!(entry.location.as_deref(), Some("Downtown"));
        assert_eq!(entry.status, PassengerStatus::Booked);
    }

    #[tokio::test]
    async fn test_book_missing_ride_is_not_found() {
        let fx = fixture();
        let rider = seed_user(&fx, "rider").await;
        let err = fx
            .lifecycle
            .book_ride(Uuid::new_v4(), &rider)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound("Ride")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_bookings_never_oversell() {
        let fx = fixture();
        let driver = seed_user(&fx, "driver").await;
        let seats = 5;
        let ride = fx
            .lifecycle
            .create_ride(driver.id, new_ride(seats))
            .await
            .unwrap();

        let store = fx.users.clone();
        let lifecycle = Arc::new(RideLifecycle::new(store.clone(), store.clone()));

        let mut handles = Vec::new();
        for i in 0..(seats * 2) {
            let lifecycle = lifecycle.clone();
            let store = store.clone();
            let ride_id = ride.id;
            handles.push(tokio::spawn(async move {
                let user = User::new(
                    format!("rider{}", i),
                    format!("rider{}@example.com", i),
                    "hash".to_string(),
                    Utc::now(),
                );
                UserRepository::insert(store.as_ref(), &user)
                    .await
                    .unwrap();
                lifecycle.book_ride(ride_id, &user).await
            }));
        }

        let mut booked = 0;
        let mut full = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => booked += 1,
                Err(CoreError::Capacity) => full += 1,
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }

        assert_eq!(booked, seats);
        assert_eq!(full, seats);

        let final_ride = RideRepository::get(store.as_ref(), ride.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(final_ride.available_seats, 0);
        assert_eq!(final_ride.passengers().count(), seats as usize);
    }

    #[tokio::test]
    async fn test_approve_promotes_request_and_consumes_seat() {
        let fx = fixture();
        let driver = seed_user(&fx, "driver").await;
        let rider = seed_user(&fx, "rider").await;
        let ride = fx
            .lifecycle
            .create_ride(driver.id, new_ride(1))
            .await
            .unwrap();

        let with_request = fx
            .lifecycle
            .request_ride(
                ride.id,
                PassengerRequest {
                    user_id: Some(rider.id),
                    phone_number: Some("555-0199".to_string()),
                    location: Some("Station".to_string()),
                },
            )
            .await
            .unwrap();

        // Requests alone never consume seats.
        assert_eq!(with_request.available_seats, 1);
        let request_id = with_request.customer_requests().next().unwrap().id;

        let approved = fx
            .lifecycle
            .approve_passenger(ride.id, request_id, driver.id)
            .await
            .unwrap();

        assert_eq!(approved.available_seats, 0);
        assert_eq!(approved.customer_requests().count(), 0);
        let entry = approved.passengers().next().unwrap();
        assert_eq!(entry.status, PassengerStatus::Approved);

        // A second approval finds no pending request.
        let err = fx
            .lifecycle
            .approve_passenger(ride.id, request_id, driver.id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound("Passenger")));
    }

    #[tokio::test]
    async fn test_approve_on_full_ride_is_capacity_error() {
        let fx = fixture();
        let driver = seed_user(&fx, "driver").await;
        let booker = seed_user(&fx, "booker").await;
        let requester = seed_user(&fx, "requester").await;
        let ride = fx
            .lifecycle
            .create_ride(driver.id, new_ride(1))
            .await
            .unwrap();

        fx.lifecycle.book_ride(ride.id, &booker).await.unwrap();
        let with_request = fx
            .lifecycle
            .request_ride(
                ride.id,
                PassengerRequest {
                    user_id: Some(requester.id),
                    phone_number: None,
                    location: None,
                },
            )
            .await
            .unwrap();
        let request_id = with_request.customer_requests().next().unwrap().id;

        let err = fx
            .lifecycle
            .approve_passenger(ride.id, request_id, driver.id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Capacity));
    }

    #[tokio::test]
    async fn test_reject_removes_request_then_approve_is_not_found() {
        let fx = fixture();
        let driver = seed_user(&fx, "driver").await;
        let rider = seed_user(&fx, "rider").await;
        let ride = fx
            .lifecycle
            .create_ride(driver.id, new_ride(2))
            .await
            .unwrap();

        let with_request = fx
            .lifecycle
            .request_ride(
                ride.id,
                PassengerRequest {
                    user_id: Some(rider.id),
                    phone_number: None,
                    location: None,
                },
            )
            .await
            .unwrap();
        let request_id = with_request.customer_requests().next().unwrap().id;

        let rejected = fx
            .lifecycle
            .reject_passenger(ride.id, rider.id, driver.id)
            .await
            .unwrap();
        assert_eq!(rejected.participants.len(), 0);
        assert_eq!(rejected.available_seats, 2);

        let err = fx
            .lifecycle
            .approve_passenger(ride.id, request_id, driver.id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound("Passenger")));
    }

    #[tokio::test]
    async fn test_reject_seated_passenger_releases_seat() {
        let fx = fixture();
        let driver = seed_user(&fx, "driver").await;
        let rider = seed_user(&fx, "rider").await;
        let ride = fx
            .lifecycle
            .create_ride(driver.id, new_ride(1))
            .await
            .unwrap();

        let booked = fx.lifecycle.book_ride(ride.id, &rider).await.unwrap();
        assert_eq!(booked.available_seats, 0);

        let rejected = fx
            .lifecycle
            .reject_passenger(ride.id, rider.id, driver.id)
            .await
            .unwrap();
        assert_eq!(rejected.available_seats, 1);
        assert_eq!(rejected.participants.len(), 0);
    }

    #[tokio::test]
    async fn test_only_driver_may_mutate() {
        let fx = fixture();
        let driver = seed_user(&fx, "driver").await;
        let outsider = seed_user(&fx, "outsider").await;
        let ride = fx
            .lifecycle
            .create_ride(driver.id, new_ride(2))
            .await
            .unwrap();

        let update = fx
            .lifecycle
            .update_ride(ride.id, RideUpdate::default(), outsider.id)
            .await;
        assert!(matches!(update, Err(CoreError::Forbidden)));

        let delete = fx.lifecycle.delete_ride(ride.id, outsider.id).await;
        assert!(matches!(delete, Err(CoreError::Forbidden)));

        let approve = fx
            .lifecycle
            .approve_passenger(ride.id, Uuid::new_v4(), outsider.id)
            .await;
        assert!(matches!(approve, Err(CoreError::Forbidden)));

        let reject = fx
            .lifecycle
            .reject_passenger(ride.id, Uuid::new_v4(), outsider.id)
            .await;
        assert!(matches!(reject, Err(CoreError::Forbidden)));
    }

    #[tokio::test]
    async fn test_update_reopens_full_ride() {
        let fx = fixture();
        let driver = seed_user(&fx, "driver").await;
        let a = seed_user(&fx, "a").await;
        let b = seed_user(&fx, "b").await;
        let ride = fx
            .lifecycle
            .create_ride(driver.id, new_ride(1))
            .await
            .unwrap();

        fx.lifecycle.book_ride(ride.id, &a).await.unwrap();
        let err = fx.lifecycle.book_ride(ride.id, &b).await.unwrap_err();
        assert!(matches!(err, CoreError::Capacity));

        fx.lifecycle
            .update_ride(
                ride.id,
                RideUpdate {
                    available_seats: Some(2),
                    ..Default::default()
                },
                driver.id,
            )
            .await
            .unwrap();

        let rebooked = fx.lifecycle.book_ride(ride.id, &b).await.unwrap();
        assert_eq!(rebooked.available_seats, 1);
        assert_eq!(rebooked.passengers().count(), 2);
    }

    #[tokio::test]
    async fn test_driver_may_override_expiry_both_ways() {
        let fx = fixture();
        let driver = seed_user(&fx, "driver").await;
        let ride = fx
            .lifecycle
            .create_ride(driver.id, new_ride(2))
            .await
            .unwrap();

        let expired = fx
            .lifecycle
            .update_ride(
                ride.id,
                RideUpdate {
                    is_expired: Some(true),
                    ..Default::default()
                },
                driver.id,
            )
            .await
            .unwrap();
        assert!(expired.is_expired);

        let revived = fx
            .lifecycle
            .update_ride(
                ride.id,
                RideUpdate {
                    is_expired: Some(false),
                    ..Default::default()
                },
                driver.id,
            )
            .await
            .unwrap();
        assert!(!revived.is_expired);
    }

    #[tokio::test]
    async fn test_search_matches_substrings_case_insensitively() {
        let fx = fixture();
        let driver = seed_user(&fx, "driver").await;

        let mut downtown = new_ride(2);
        downtown.start_location = Some("Pune Station".to_string());
        downtown.end_location = Some("Navi Mumbai".to_string());
        fx.lifecycle
            .create_ride(driver.id, downtown)
            .await
            .unwrap();

        let mut elsewhere = new_ride(2);
        elsewhere.start_location = Some("Nashik".to_string());
        elsewhere.end_location = Some("Goa".to_string());
        fx.lifecycle
            .create_ride(driver.id, elsewhere)
            .await
            .unwrap();

        let hits = fx.lifecycle.search_rides("pune", "MUMBAI").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].ride.start_location, "Pune Station");

        // Driver identity is attached, nothing beyond name and email.
        let attached = hits[0].driver.as_ref().unwrap();
        assert_eq!(attached.email, "driver@example.com");

        let all = fx.lifecycle.search_rides("", "").await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_search_excludes_past_and_expired_rides() {
        let fx = fixture();
        let driver = seed_user(&fx, "driver").await;

        let open = fx
            .lifecycle
            .create_ride(driver.id, new_ride(2))
            .await
            .unwrap();

        let mut past = new_ride(2);
        past.ride_time = Some(Utc::now() - Duration::hours(1));
        fx.lifecycle.create_ride(driver.id, past).await.unwrap();

        let flagged = fx
            .lifecycle
            .create_ride(driver.id, new_ride(2))
            .await
            .unwrap();
        fx.lifecycle
            .update_ride(
                flagged.id,
                RideUpdate {
                    is_expired: Some(true),
                    ..Default::default()
                },
                driver.id,
            )
            .await
            .unwrap();

        let hits = fx.lifecycle.search_rides("pune", "mumbai").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].ride.id, open.id);

        let listed = fx.lifecycle.all_rides().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].ride.id, open.id);
    }

    #[tokio::test]
    async fn test_user_rides_cover_every_role() {
        let fx = fixture();
        let driver = seed_user(&fx, "driver").await;
        let booker = seed_user(&fx, "booker").await;
        let requester = seed_user(&fx, "requester").await;
        let stranger = seed_user(&fx, "stranger").await;

        let ride = fx
            .lifecycle
            .create_ride(driver.id, new_ride(3))
            .await
            .unwrap();
        fx.lifecycle.book_ride(ride.id, &booker).await.unwrap();
        fx.lifecycle
            .request_ride(
                ride.id,
                PassengerRequest {
                    user_id: Some(requester.id),
                    phone_number: None,
                    location: None,
                },
            )
            .await
            .unwrap();

        for user in [&driver, &booker, &requester] {
            let rides = fx.lifecycle.user_rides(user.id).await.unwrap();
            assert_eq!(rides.len(), 1, "expected a ride for {}", user.name);
        }

        let none = fx.lifecycle.user_rides(stranger.id).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_delete_is_hard_and_not_found_after() {
        let fx = fixture();
        let driver = seed_user(&fx, "driver").await;
        let ride = fx
            .lifecycle
            .create_ride(driver.id, new_ride(2))
            .await
            .unwrap();

        fx.lifecycle.delete_ride(ride.id, driver.id).await.unwrap();

        let err = fx.lifecycle.ride_details(ride.id).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound("Ride")));

        let again = fx.lifecycle.delete_ride(ride.id, driver.id).await;
        assert!(matches!(again, Err(CoreError::NotFound("Ride"))));
    }
}
