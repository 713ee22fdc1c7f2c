use axum::{
    extract::{Path, State},
    middleware::from_fn_with_state,
    routing::{delete, put},
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::{require_auth, CurrentUser};
use crate::rides::RideResponse;
use crate::state::AppState;
use rideok_core::PassengerRequest;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddPassengerRequest {
    ride_id: Option<String>,
    passenger_data: Option<PassengerRequest>,
}

pub fn routes(state: &AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/approve-passenger/{rideId}/{passengerId}", put(approve_passenger))
        .route("/reject-passenger/{rideId}/{passengerId}", delete(reject_passenger))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/add-passenger", put(add_passenger))
        .merge(protected)
}

async fn approve_passenger(
    State(state): State<AppState>,
    Path((ride_id, passenger_id)): Path<(Uuid, Uuid)>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Value>, AppError> {
    let ride = state
        .lifecycle
        .approve_passenger(ride_id, passenger_id, current.0.id)
        .await?;

    Ok(Json(json!({
        "message": "Passenger approved",
        "ride": RideResponse::from(ride),
    })))
}

async fn reject_passenger(
    State(state): State<AppState>,
    Path((ride_id, passenger_id)): Path<(Uuid, Uuid)>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Value>, AppError> {
    let ride = state
        .lifecycle
        .reject_passenger(ride_id, passenger_id, current.0.id)
        .await?;

    Ok(Json(json!({
        "message": "Passenger rejected",
        "ride": RideResponse::from(ride),
    })))
}

async fn add_passenger(
    State(state): State<AppState>,
    Json(req): Json<AddPassengerRequest>,
) -> Result<Json<Value>, AppError> {
    let ride_id = req
        .ride_id
        .as_deref()
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .ok_or_else(|| AppError::ValidationError("Invalid rideId format".to_string()))?;

    let passenger_data = req
        .passenger_data
        .ok_or_else(|| AppError::ValidationError("passengerData is required".to_string()))?;

    let ride = state.lifecycle.request_ride(ride_id, passenger_data).await?;

    Ok(Json(json!({
        "message": "Passenger added successfully",
        "ride": RideResponse::from(ride),
    })))
}
