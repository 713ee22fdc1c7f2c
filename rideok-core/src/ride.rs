use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::user::User;

/// Seat-allocation state of a ride participant.
///
/// REQUESTED entries are pending driver approval and hold no seat.
/// APPROVED and BOOKED entries each occupy exactly one seat; the only
/// difference is how they got in (driver approval vs. self-service booking).
/// Rejection removes the entry outright, so there is no rejected state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PassengerStatus {
    Requested,
    Approved,
    Booked,
}

impl PassengerStatus {
    /// Whether this entry occupies one of the ride's seats.
    pub fn holds_seat(&self) -> bool {
        matches!(self, PassengerStatus::Approved | PassengerStatus::Booked)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PassengerStatus::Requested => "REQUESTED",
            PassengerStatus::Approved => "APPROVED",
            PassengerStatus::Booked => "BOOKED",
        }
    }
}

impl std::fmt::Display for PassengerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PassengerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REQUESTED" => Ok(PassengerStatus::Requested),
            "APPROVED" => Ok(PassengerStatus::Approved),
            "BOOKED" => Ok(PassengerStatus::Booked),
            other => Err(format!("unknown passenger status: {}", other)),
        }
    }
}

/// A participant sub-record embedded in a ride. Phone number and location
/// are snapshots of the user's contact details at request/booking time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RidePassenger {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub user_id: Uuid,
    pub phone_number: Option<String>,
    pub location: Option<String>,
    pub status: PassengerStatus,
}

impl RidePassenger {
    /// A seat-holding entry created by self-service booking.
    pub fn booked(user: &User) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user.id,
            phone_number: user.phone_number.clone(),
            location: user.location.clone(),
            status: PassengerStatus::Booked,
        }
    }

    /// A pending entry awaiting driver approval.
    pub fn requested(user_id: Uuid, phone_number: Option<String>, location: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            phone_number,
            location,
            status: PassengerStatus::Requested,
        }
    }
}

/// A driver-posted trip offer with capacity, schedule and price.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ride {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub driver_id: Uuid,
    pub start_location: String,
    pub end_location: String,
    pub price: f64,
    pub available_seats: i32,
    pub ride_date: NaiveDate,
    pub ride_time: DateTime<Utc>,
    pub is_expired: bool,
    pub participants: Vec<RidePassenger>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ride {
    /// Seat-holding entries (approved or booked), in insertion order.
    pub fn passengers(&self) -> impl Iterator<Item = &RidePassenger> {
        self.participants.iter().filter(|p| p.status.holds_seat())
    }

    /// Pending requests, in insertion order.
    pub fn customer_requests(&self) -> impl Iterator<Item = &RidePassenger> {
        self.participants
            .iter()
            .filter(|p| p.status == PassengerStatus::Requested)
    }

    /// A ride shows up in listings and search only while its departure is
    /// still ahead and nothing has flagged it expired.
    pub fn is_upcoming(&self, now: DateTime<Utc>) -> bool {
        self.ride_time > now && !self.is_expired
    }

    /// Whether the user drives this ride or appears among its participants.
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.driver_id == user_id || self.participants.iter().any(|p| p.user_id == user_id)
    }

    /// Applies a partial update. Absent fields leave the current value
    /// untouched; present fields overwrite, including zero and empty-string
    /// values.
    pub fn apply(&mut self, update: RideUpdate, now: DateTime<Utc>) {
        if let Some(start_location) = update.start_location {
            self.start_location = start_location;
        }
        if let Some(end_location) = update.end_location {
            self.end_location = end_location;
        }
        if let Some(price) = update.price {
            self.price = price;
        }
        if let Some(available_seats) = update.available_seats {
            self.available_seats = available_seats;
        }
        if let Some(ride_date) = update.ride_date {
            self.ride_date = ride_date;
        }
        if let Some(ride_time) = update.ride_time {
            self.ride_time = ride_time;
        }
        if let Some(is_expired) = update.is_expired {
            self.is_expired = is_expired;
        }
        self.updated_at = now;
    }
}

/// Payload for creating a ride. Every field is optional at the wire level
/// so validation can report all missing/invalid fields at once instead of
/// failing on the first.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRide {
    pub start_location: Option<String>,
    pub end_location: Option<String>,
    pub price: Option<f64>,
    pub available_seats: Option<i32>,
    pub ride_date: Option<NaiveDate>,
    pub ride_time: Option<DateTime<Utc>>,
}

impl NewRide {
    /// Validates the payload and builds the ride, collecting every violated
    /// rule into one `Validation` error.
    pub fn into_ride(self, driver_id: Uuid, now: DateTime<Utc>) -> CoreResult<Ride> {
        let mut problems = Vec::new();

        match self.start_location.as_deref() {
            Some(s) if !s.trim().is_empty() => {}
            _ => problems.push("startLocation is required"),
        }
        match self.end_location.as_deref() {
            Some(s) if !s.trim().is_empty() => {}
            _ => problems.push("endLocation is required"),
        }
        match self.price {
            Some(p) if p > 0.0 => {}
            Some(_) => problems.push("price must be greater than 0"),
            None => problems.push("price is required"),
        }
        match self.available_seats {
            Some(s) if s > 0 => {}
            Some(_) => problems.push("availableSeats must be greater than 0"),
            None => problems.push("availableSeats is required"),
        }
        if self.ride_date.is_none() {
            problems.push("rideDate is required");
        }
        if self.ride_time.is_none() {
            problems.push("rideTime is required");
        }

        if !problems.is_empty() {
            return Err(CoreError::Validation(
                problems.into_iter().map(String::from).collect(),
            ));
        }

        Ok(Ride {
            id: Uuid::new_v4(),
            driver_id,
            start_location: self.start_location.unwrap_or_default(),
            end_location: self.end_location.unwrap_or_default(),
            price: self.price.unwrap_or_default(),
            available_seats: self.available_seats.unwrap_or_default(),
            ride_date: self.ride_date.unwrap_or_default(),
            ride_time: self.ride_time.unwrap_or_default(),
            is_expired: false,
            participants: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }
}

/// Partial update for a ride. Field presence decides what changes: `None`
/// means "leave alone", so legitimate updates to `0` or `""` go through.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideUpdate {
    pub start_location: Option<String>,
    pub end_location: Option<String>,
    pub price: Option<f64>,
    pub available_seats: Option<i32>,
    pub ride_date: Option<NaiveDate>,
    pub ride_time: Option<DateTime<Utc>>,
    pub is_expired: Option<bool>,
}

impl RideUpdate {
    /// Price may be dropped to 0 (promotional rides) but never negative;
    /// the seat count may be set to 0 but never negative.
    pub fn validate(&self) -> CoreResult<()> {
        let mut problems = Vec::new();

        if let Some(p) = self.price {
            if p < 0.0 {
                problems.push("price must not be negative");
            }
        }
        if let Some(s) = self.available_seats {
            if s < 0 {
                problems.push("availableSeats must not be negative");
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Validation(
                problems.into_iter().map(String::from).collect(),
            ))
        }
    }
}

/// Body of a ride request submitted on behalf of a would-be passenger.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassengerRequest {
    #[serde(rename = "user")]
    pub user_id: Option<Uuid>,
    pub phone_number: Option<String>,
    pub location: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn valid_new_ride() -> NewRide {
        NewRide {
            start_location: Some("Pune".to_string()),
            end_location: Some("Mumbai".to_string()),
            price: Some(250.0),
            available_seats: Some(3),
            ride_date: Some(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()),
            ride_time: Some(Utc::now() + Duration::days(1)),
        }
    }

    #[test]
    fn test_create_validation_aggregates_all_problems() {
        let err = NewRide::default()
            .into_ride(Uuid::new_v4(), Utc::now())
            .unwrap_err();

        match err {
            CoreError::Validation(problems) => {
                assert_eq!(problems.len(), 6);
                assert!(problems.iter().any(|p| p.contains("startLocation")));
                assert!(problems.iter().any(|p| p.contains("rideTime")));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_create_rejects_non_positive_price_and_seats() {
        let mut new = valid_new_ride();
        new.price = Some(0.0);
        new.available_seats = Some(0);

        let err = new.into_ride(Uuid::new_v4(), Utc::now()).unwrap_err();
        match err {
            CoreError::Validation(problems) => {
                assert_eq!(problems.len(), 2);
                assert!(problems.iter().any(|p| p.contains("price")));
                assert!(problems.iter().any(|p| p.contains("availableSeats")));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_create_builds_open_ride() {
        let driver = Uuid::new_v4();
        let ride = valid_new_ride().into_ride(driver, Utc::now()).unwrap();

        assert_eq!(ride.driver_id, driver);
        assert!(!ride.is_expired);
        assert_eq!(ride.available_seats, 3);
        assert_eq!(ride.participants.len(), 0);
    }

    #[test]
    fn test_update_presence_semantics() {
        let now = Utc::now();
        let mut ride = valid_new_ride().into_ride(Uuid::new_v4(), now).unwrap();

        // Explicit zeros are real updates, absent fields are not.
        ride.apply(
            RideUpdate {
                price: Some(0.0),
                available_seats: Some(0),
                ..Default::default()
            },
            now,
        );

        assert_eq!(ride.price, 0.0);
        assert_eq!(ride.available_seats, 0);
        assert_eq!(ride.start_location, "Pune");

        ride.apply(RideUpdate::default(), now);
        assert_eq!(ride.price, 0.0);
    }

    #[test]
    fn test_update_rejects_negative_values() {
        let update = RideUpdate {
            price: Some(-5.0),
            available_seats: Some(-1),
            ..Default::default()
        };
        assert!(update.validate().is_err());

        let promo = RideUpdate {
            price: Some(0.0),
            ..Default::default()
        };
        assert!(promo.validate().is_ok());
    }

    #[test]
    fn test_upcoming_filter() {
        let now = Utc::now();
        let mut ride = valid_new_ride().into_ride(Uuid::new_v4(), now).unwrap();
        assert!(ride.is_upcoming(now));

        ride.is_expired = true;
        assert!(!ride.is_upcoming(now));

        ride.is_expired = false;
        ride.ride_time = now - Duration::minutes(1);
        assert!(!ride.is_upcoming(now));
    }

    #[test]
    fn test_participant_views_split_by_status() {
        let now = Utc::now();
        let mut ride = valid_new_ride().into_ride(Uuid::new_v4(), now).unwrap();

        let rider = Uuid::new_v4();
        ride.participants
            .push(RidePassenger::requested(rider, None, None));

        assert_eq!(ride.customer_requests().count(), 1);
        assert_eq!(ride.passengers().count(), 0);

        ride.participants[0].status = PassengerStatus::Approved;
        assert_eq!(ride.customer_requests().count(), 0);
        assert_eq!(ride.passengers().count(), 1);
    }
}
