use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::{require_auth, CurrentUser};
use crate::state::AppState;
use rideok_core::{DriverSummary, NewRide, Ride, RidePassenger, RideUpdate, RideWithDriver};

/// Wire shape of a ride: the single participants list splits back into the
/// two arrays the frontend has always consumed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RideResponse {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub driver_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<DriverSummary>,
    pub start_location: String,
    pub end_location: String,
    pub price: f64,
    pub available_seats: i32,
    pub ride_date: NaiveDate,
    pub ride_time: DateTime<Utc>,
    pub is_expired: bool,
    pub passengers: Vec<RidePassenger>,
    pub customer_requests: Vec<RidePassenger>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RideResponse {
    fn build(ride: Ride, driver: Option<DriverSummary>) -> Self {
        let (passengers, customer_requests) = ride
            .participants
            .into_iter()
            .partition(|p: &RidePassenger| p.status.holds_seat());

        Self {
            id: ride.id,
            driver_id: ride.driver_id,
            driver,
            start_location: ride.start_location,
            end_location: ride.end_location,
            price: ride.price,
            available_seats: ride.available_seats,
            ride_date: ride.ride_date,
            ride_time: ride.ride_time,
            is_expired: ride.is_expired,
            passengers,
            customer_requests,
            created_at: ride.created_at,
            updated_at: ride.updated_at,
        }
    }
}

impl From<Ride> for RideResponse {
    fn from(ride: Ride) -> Self {
        Self::build(ride, None)
    }
}

impl From<RideWithDriver> for RideResponse {
    fn from(value: RideWithDriver) -> Self {
        Self::build(value.ride, value.driver)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchQuery {
    start_location: Option<String>,
    end_location: Option<String>,
}

pub fn routes(state: &AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/create", post(create_ride))
        .route("/book/{rideId}", post(book_ride))
        .route("/update/{rideId}", put(update_ride))
        .route("/delete/{rideId}", delete(delete_ride))
        .route("/user-rides", get(user_rides))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/search", get(search_rides))
        .route("/rideId/{rideId}", get(ride_details))
        .route("/", get(all_rides))
        .merge(protected)
}

async fn create_ride(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<NewRide>,
) -> Result<(StatusCode, Json<RideResponse>), AppError> {
    let ride = state.lifecycle.create_ride(current.0.id, req).await?;
    Ok((StatusCode::CREATED, Json(ride.into())))
}

async fn search_rides(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<RideResponse>>, AppError> {
    let rides = state
        .lifecycle
        .search_rides(
            query.start_location.as_deref().unwrap_or(""),
            query.end_location.as_deref().unwrap_or(""),
        )
        .await?;

    Ok(Json(rides.into_iter().map(RideResponse::from).collect()))
}

async fn book_ride(
    State(state): State<AppState>,
    Path(ride_id): Path<Uuid>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Value>, AppError> {
    let ride = state.lifecycle.book_ride(ride_id, &current.0).await?;
    Ok(Json(json!({
        "message": "Ride booked successfully",
        "ride": RideResponse::from(ride),
    })))
}

async fn update_ride(
    State(state): State<AppState>,
    Path(ride_id): Path<Uuid>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<RideUpdate>,
) -> Result<Json<RideResponse>, AppError> {
    let ride = state
        .lifecycle
        .update_ride(ride_id, req, current.0.id)
        .await?;
    Ok(Json(ride.into()))
}

async fn delete_ride(
    State(state): State<AppState>,
    Path(ride_id): Path<Uuid>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Value>, AppError> {
    state.lifecycle.delete_ride(ride_id, current.0.id).await?;
    Ok(Json(json!({ "message": "Ride deleted successfully" })))
}

async fn ride_details(
    State(state): State<AppState>,
    Path(ride_id): Path<Uuid>,
) -> Result<Json<RideResponse>, AppError> {
    let ride = state.lifecycle.ride_details(ride_id).await?;
    Ok(Json(ride.into()))
}

async fn all_rides(State(state): State<AppState>) -> Result<Json<Vec<RideResponse>>, AppError> {
    let rides = state.lifecycle.all_rides().await?;
    Ok(Json(rides.into_iter().map(RideResponse::from).collect()))
}

async fn user_rides(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Vec<RideResponse>>, AppError> {
    let rides = state.lifecycle.user_rides(current.0.id).await?;
    Ok(Json(rides.into_iter().map(RideResponse::from).collect()))
}
