use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::repository::{RideRepository, UserRepository};
use crate::ride::{PassengerStatus, Ride, RidePassenger};
use crate::user::User;

/// In-memory store implementing both repository traits behind one mutex.
/// Backs the test suites and local development without a database; the
/// single lock is the serialization point that keeps the seat count and
/// the participant list consistent under concurrent calls.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    rides: HashMap<Uuid, Ride>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn sorted_by_creation(mut rides: Vec<Ride>) -> Vec<Ride> {
    rides.sort_by_key(|r| r.created_at);
    rides
}

#[async_trait]
impl RideRepository for MemoryStore {
    async fn insert(&self, ride: &Ride) -> CoreResult<()> {
        self.lock().rides.insert(ride.id, ride.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<Ride>> {
        Ok(self.lock().rides.get(&id).cloned())
    }

    async fn search(
        &self,
        start_location: &str,
        end_location: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<Ride>> {
        let start = start_location.to_lowercase();
        let end = end_location.to_lowercase();

        let matches = self
            .lock()
            .rides
            .values()
            .filter(|r| r.is_upcoming(now))
            .filter(|r| r.start_location.to_lowercase().contains(&start))
            .filter(|r| r.end_location.to_lowercase().contains(&end))
            .cloned()
            .collect();

        Ok(sorted_by_creation(matches))
    }

    async fn list_upcoming(&self, now: DateTime<Utc>) -> CoreResult<Vec<Ride>> {
        let rides = self
            .lock()
            .rides
            .values()
            .filter(|r| r.is_upcoming(now))
            .cloned()
            .collect();
        Ok(sorted_by_creation(rides))
    }

    async fn list_for_user(&self, user_id: Uuid, now: DateTime<Utc>) -> CoreResult<Vec<Ride>> {
        let rides = self
            .lock()
            .rides
            .values()
            .filter(|r| r.ride_time > now && r.involves(user_id))
            .cloned()
            .collect();
        Ok(sorted_by_creation(rides))
    }

    async fn save(&self, ride: &Ride) -> CoreResult<()> {
        let mut inner = self.lock();
        if !inner.rides.contains_key(&ride.id) {
            return Err(CoreError::NotFound("Ride"));
        }
        inner.rides.insert(ride.id, ride.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> CoreResult<bool> {
        Ok(self.lock().rides.remove(&id).is_some())
    }

    async fn book_seat(&self, ride_id: Uuid, passenger: RidePassenger) -> CoreResult<Ride> {
        let mut inner = self.lock();
        let ride = inner
            .rides
            .get_mut(&ride_id)
            .ok_or(CoreError::NotFound("Ride"))?;

        if ride.available_seats <= 0 {
            return Err(CoreError::Capacity);
        }

        ride.available_seats -= 1;
        ride.participants.push(passenger);
        ride.updated_at = Utc::now();
        Ok(ride.clone())
    }

    async fn add_request(&self, ride_id: Uuid, passenger: RidePassenger) -> CoreResult<Ride> {
        let mut inner = self.lock();
        let ride = inner
            .rides
            .get_mut(&ride_id)
            .ok_or(CoreError::NotFound("Ride"))?;

        ride.participants.push(passenger);
        ride.updated_at = Utc::now();
        Ok(ride.clone())
    }

    async fn approve_request(&self, ride_id: Uuid, request_id: Uuid) -> CoreResult<Ride> {
        let mut inner = self.lock();
        let ride = inner
            .rides
            .get_mut(&ride_id)
            .ok_or(CoreError::NotFound("Ride"))?;

        let entry = ride
            .participants
            .iter_mut()
            .find(|p| p.id == request_id && p.status == PassengerStatus::Requested)
            .ok_or(CoreError::NotFound("Passenger"))?;

        if ride.available_seats <= 0 {
            return Err(CoreError::Capacity);
        }

        entry.status = PassengerStatus::Approved;
        ride.available_seats -= 1;
        ride.updated_at = Utc::now();
        Ok(ride.clone())
    }

    async fn remove_participant(&self, ride_id: Uuid, user_id: Uuid) -> CoreResult<Ride> {
        let mut inner = self.lock();
        let ride = inner
            .rides
            .get_mut(&ride_id)
            .ok_or(CoreError::NotFound("Ride"))?;

        let index = ride
            .participants
            .iter()
            .position(|p| p.user_id == user_id)
            .ok_or(CoreError::NotFound("Passenger"))?;

        let removed = ride.participants.remove(index);
        if removed.status.holds_seat() {
            ride.available_seats += 1;
        }
        ride.updated_at = Utc::now();
        Ok(ride.clone())
    }

    async fn mark_expired(&self, now: DateTime<Utc>, limit: u32) -> CoreResult<u64> {
        let mut inner = self.lock();

        // Capture the batch first, then flag exactly that id set.
        let batch: Vec<Uuid> = inner
            .rides
            .values()
            .filter(|r| r.ride_time < now && !r.is_expired)
            .take(limit as usize)
            .map(|r| r.id)
            .collect();

        for id in &batch {
            if let Some(ride) = inner.rides.get_mut(id) {
                ride.is_expired = true;
                ride.updated_at = now;
            }
        }

        Ok(batch.len() as u64)
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn insert(&self, user: &User) -> CoreResult<()> {
        let mut inner = self.lock();
        if inner
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(CoreError::validation("User already exists"));
        }
        inner.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<User>> {
        Ok(self.lock().users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> CoreResult<Option<User>> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn save(&self, user: &User) -> CoreResult<()> {
        let mut inner = self.lock();
        if !inner.users.contains_key(&user.id) {
            return Err(CoreError::NotFound("User"));
        }
        inner.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> CoreResult<bool> {
        Ok(self.lock().users.remove(&id).is_some())
    }
}
