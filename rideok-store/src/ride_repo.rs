use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use rideok_core::error::{CoreError, CoreResult};
use rideok_core::repository::RideRepository;
use rideok_core::ride::{PassengerStatus, Ride, RidePassenger};

pub struct PostgresRideRepository {
    pub pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct RideRow {
    id: Uuid,
    driver_id: Uuid,
    start_location: String,
    end_location: String,
    price: f64,
    available_seats: i32,
    ride_date: NaiveDate,
    ride_time: DateTime<Utc>,
    is_expired: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct PassengerRow {
    id: Uuid,
    user_id: Uuid,
    phone_number: Option<String>,
    location: Option<String>,
    status: String,
}

impl PassengerRow {
    fn into_passenger(self) -> RidePassenger {
        RidePassenger {
            id: self.id,
            user_id: self.user_id,
            phone_number: self.phone_number,
            location: self.location,
            status: self.status.parse().unwrap_or(PassengerStatus::Requested),
        }
    }
}

fn unexpected(err: sqlx::Error) -> CoreError {
    CoreError::unexpected(err)
}

const SELECT_RIDE: &str = "SELECT id, driver_id, start_location, end_location, price, \
     available_seats, ride_date, ride_time, is_expired, created_at, updated_at FROM rides";

impl PostgresRideRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn participants_for(&self, ride_id: Uuid) -> CoreResult<Vec<RidePassenger>> {
        let rows = sqlx::query_as::<_, PassengerRow>(
            "SELECT id, user_id, phone_number, location, status \
             FROM ride_passengers WHERE ride_id = $1 ORDER BY seq",
        )
        .bind(ride_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(rows.into_iter().map(PassengerRow::into_passenger).collect())
    }

    async fn hydrate(&self, row: RideRow) -> CoreResult<Ride> {
        let participants = self.participants_for(row.id).await?;
        Ok(Ride {
            id: row.id,
            driver_id: row.driver_id,
            start_location: row.start_location,
            end_location: row.end_location,
            price: row.price,
            available_seats: row.available_seats,
            ride_date: row.ride_date,
            ride_time: row.ride_time,
            is_expired: row.is_expired,
            participants,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    async fn hydrate_all(&self, rows: Vec<RideRow>) -> CoreResult<Vec<Ride>> {
        let mut rides = Vec::with_capacity(rows.len());
        for row in rows {
            rides.push(self.hydrate(row).await?);
        }
        Ok(rides)
    }

    async fn reload(&self, ride_id: Uuid) -> CoreResult<Ride> {
        self.get(ride_id)
            .await?
            .ok_or(CoreError::NotFound("Ride"))
    }
}

#[async_trait]
impl RideRepository for PostgresRideRepository {
    async fn insert(&self, ride: &Ride) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO rides (id, driver_id, start_location, end_location, price, \
             available_seats, ride_date, ride_time, is_expired, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(ride.id)
        .bind(ride.driver_id)
        .bind(&ride.start_location)
        .bind(&ride.end_location)
        .bind(ride.price)
        .bind(ride.available_seats)
        .bind(ride.ride_date)
        .bind(ride.ride_time)
        .bind(ride.is_expired)
        .bind(ride.created_at)
        .bind(ride.updated_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<Ride>> {
        let row = sqlx::query_as::<_, RideRow>(&format!("{} WHERE id = $1", SELECT_RIDE))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn search(
        &self,
        start_location: &str,
        end_location: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<Ride>> {
        let rows = sqlx::query_as::<_, RideRow>(&format!(
            "{} WHERE start_location ILIKE '%' || $1 || '%' \
             AND end_location ILIKE '%' || $2 || '%' \
             AND ride_time > $3 AND is_expired = FALSE \
             ORDER BY created_at",
            SELECT_RIDE
        ))
        .bind(start_location)
        .bind(end_location)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        self.hydrate_all(rows).await
    }

    async fn list_upcoming(&self, now: DateTime<Utc>) -> CoreResult<Vec<Ride>> {
        let rows = sqlx::query_as::<_, RideRow>(&format!(
            "{} WHERE ride_time > $1 AND is_expired = FALSE ORDER BY created_at",
            SELECT_RIDE
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        self.hydrate_all(rows).await
    }

    async fn list_for_user(&self, user_id: Uuid, now: DateTime<Utc>) -> CoreResult<Vec<Ride>> {
        let rows = sqlx::query_as::<_, RideRow>(&format!(
            "{} WHERE ride_time > $2 AND (driver_id = $1 OR EXISTS \
             (SELECT 1 FROM ride_passengers p WHERE p.ride_id = rides.id AND p.user_id = $1)) \
             ORDER BY created_at",
            SELECT_RIDE
        ))
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        self.hydrate_all(rows).await
    }

    async fn save(&self, ride: &Ride) -> CoreResult<()> {
        let result = sqlx::query(
            "UPDATE rides SET start_location = $2, end_location = $3, price = $4, \
             available_seats = $5, ride_date = $6, ride_time = $7, is_expired = $8, \
             updated_at = $9 WHERE id = $1",
        )
        .bind(ride.id)
        .bind(&ride.start_location)
        .bind(&ride.end_location)
        .bind(ride.price)
        .bind(ride.available_seats)
        .bind(ride.ride_date)
        .bind(ride.ride_time)
        .bind(ride.is_expired)
        .bind(ride.updated_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound("Ride"));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> CoreResult<bool> {
        let result = sqlx::query("DELETE FROM rides WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;

        Ok(result.rows_affected() > 0)
    }

    async fn book_seat(&self, ride_id: Uuid, passenger: RidePassenger) -> CoreResult<Ride> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        // Conditional decrement: the capacity check and the write are one
        // statement, so concurrent bookings serialize on the row.
        let seated = sqlx::query(
            "UPDATE rides SET available_seats = available_seats - 1, updated_at = NOW() \
             WHERE id = $1 AND available_seats > 0",
        )
        .bind(ride_id)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        if seated.rows_affected() == 0 {
            let exists =
                sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM rides WHERE id = $1)")
                    .bind(ride_id)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(unexpected)?;

            return Err(if exists {
                CoreError::Capacity
            } else {
                CoreError::NotFound("Ride")
            });
        }

        sqlx::query(
            "INSERT INTO ride_passengers (id, ride_id, user_id, phone_number, location, status) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(passenger.id)
        .bind(ride_id)
        .bind(passenger.user_id)
        .bind(&passenger.phone_number)
        .bind(&passenger.location)
        .bind(passenger.status.as_str())
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        self.reload(ride_id).await
    }

    async fn add_request(&self, ride_id: Uuid, passenger: RidePassenger) -> CoreResult<Ride> {
        let result = sqlx::query(
            "INSERT INTO ride_passengers (id, ride_id, user_id, phone_number, location, status) \
             SELECT $1, id, $3, $4, $5, $6 FROM rides WHERE id = $2",
        )
        .bind(passenger.id)
        .bind(ride_id)
        .bind(passenger.user_id)
        .bind(&passenger.phone_number)
        .bind(&passenger.location)
        .bind(passenger.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound("Ride"));
        }
        self.reload(ride_id).await
    }

    async fn approve_request(&self, ride_id: Uuid, request_id: Uuid) -> CoreResult<Ride> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let promoted = sqlx::query(
            "UPDATE ride_passengers SET status = $1 \
             WHERE id = $2 AND ride_id = $3 AND status = $4",
        )
        .bind(PassengerStatus::Approved.as_str())
        .bind(request_id)
        .bind(ride_id)
        .bind(PassengerStatus::Requested.as_str())
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        if promoted.rows_affected() == 0 {
            return Err(CoreError::NotFound("Passenger"));
        }

        let seated = sqlx::query(
            "UPDATE rides SET available_seats = available_seats - 1, updated_at = NOW() \
             WHERE id = $1 AND available_seats > 0",
        )
        .bind(ride_id)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        // Dropping the transaction rolls the promotion back.
        if seated.rows_affected() == 0 {
            return Err(CoreError::Capacity);
        }

        tx.commit().await.map_err(unexpected)?;
        self.reload(ride_id).await
    }

    async fn remove_participant(&self, ride_id: Uuid, user_id: Uuid) -> CoreResult<Ride> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        // First matching entry only, mirroring the in-place list removal.
        let removed_status = sqlx::query_scalar::<_, String>(
            "DELETE FROM ride_passengers WHERE seq = \
             (SELECT seq FROM ride_passengers WHERE ride_id = $1 AND user_id = $2 \
              ORDER BY seq LIMIT 1) \
             RETURNING status",
        )
        .bind(ride_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(unexpected)?;

        let Some(status) = removed_status else {
            return Err(CoreError::NotFound("Passenger"));
        };

        let held_seat = status
            .parse::<PassengerStatus>()
            .map(|s| s.holds_seat())
            .unwrap_or(false);
        if held_seat {
            sqlx::query(
                "UPDATE rides SET available_seats = available_seats + 1, updated_at = NOW() \
                 WHERE id = $1",
            )
            .bind(ride_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        }

        tx.commit().await.map_err(unexpected)?;
        self.reload(ride_id).await
    }

    async fn mark_expired(&self, now: DateTime<Utc>, limit: u32) -> CoreResult<u64> {
        // Capture the batch first, then flag exactly that id set.
        let batch: Vec<Uuid> = sqlx::query_scalar(
            "SELECT id FROM rides WHERE ride_time < $1 AND is_expired = FALSE LIMIT $2",
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        if batch.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            "UPDATE rides SET is_expired = TRUE, updated_at = NOW() WHERE id = ANY($1)",
        )
        .bind(&batch)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(result.rows_affected())
    }
}
