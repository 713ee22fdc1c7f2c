use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::CoreResult;
use crate::repository::RideRepository;

/// Periodic batch job that flags past-due rides as expired.
///
/// Each tick drains the entire current backlog in `batch_size` chunks:
/// the repository captures an id set first and flags exactly that set, and
/// the loop stops once a query comes back empty. Scheduling (and the
/// guarantee that ticks never overlap) is the caller's concern; see the
/// api crate's sweeper task.
pub struct ExpirySweeper {
    rides: Arc<dyn RideRepository>,
    batch_size: u32,
}

impl ExpirySweeper {
    pub fn new(rides: Arc<dyn RideRepository>, batch_size: u32) -> Self {
        Self { rides, batch_size }
    }

    /// One full sweep. Returns the total number of rides flagged.
    pub async fn run_once(&self, now: DateTime<Utc>) -> CoreResult<u64> {
        let mut processed: u64 = 0;

        loop {
            let flagged = self.rides.mark_expired(now, self.batch_size).await?;
            if flagged == 0 {
                break;
            }
            processed += flagged;
            info!("Processed {} expired rides...", processed);
        }

        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::ride::NewRide;
    use chrono::{Duration, NaiveDate};
    use uuid::Uuid;

    async fn seed_ride(store: &MemoryStore, ride_time: DateTime<Utc>) -> Uuid {
        let new = NewRide {
            start_location: Some("A".to_string()),
            end_location: Some("B".to_string()),
            price: Some(10.0),
            available_seats: Some(2),
            ride_date: Some(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()),
            ride_time: Some(ride_time),
        };
        let ride = new.into_ride(Uuid::new_v4(), Utc::now()).unwrap();
        let id = ride.id;
        RideRepository::insert(store, &ride).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_sweep_drains_backlog_across_batches() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();

        for _ in 0..25 {
            seed_ride(store.as_ref(), now - Duration::minutes(5)).await;
        }
        let future = seed_ride(store.as_ref(), now + Duration::hours(1)).await;

        // Batch size well below the backlog forces several drain rounds.
        let sweeper = ExpirySweeper::new(store.clone(), 10);
        let processed = sweeper.run_once(now).await.unwrap();
        assert_eq!(processed, 25);

        let untouched = RideRepository::get(store.as_ref(), future)
            .await
            .unwrap()
            .unwrap();
        assert!(!untouched.is_expired);

        let upcoming = store.list_upcoming(now).await.unwrap();
        assert_eq!(upcoming.len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent_per_backlog() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();

        for _ in 0..3 {
            seed_ride(store.as_ref(), now - Duration::minutes(1)).await;
        }

        let sweeper = ExpirySweeper::new(store.clone(), 100);
        assert_eq!(sweeper.run_once(now).await.unwrap(), 3);
        assert_eq!(sweeper.run_once(now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_swept_rides_drop_out_of_search() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();

        // ride_time just passed but the flag has not been set yet: already
        // invisible to search, the sweep merely records the fact.
        let id = seed_ride(store.as_ref(), now - Duration::seconds(30)).await;
        assert!(store.search("a", "b", now).await.unwrap().is_empty());

        let sweeper = ExpirySweeper::new(store.clone(), 100);
        sweeper.run_once(now).await.unwrap();

        let ride = RideRepository::get(store.as_ref(), id)
            .await
            .unwrap()
            .unwrap();
        assert!(ride.is_expired);
    }
}
