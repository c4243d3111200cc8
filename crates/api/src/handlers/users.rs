use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use poc_indexer::storage::User;
use serde::Deserialize;

use super::{parse_address, require_text};
use crate::error::{internal_error, invalid_field, not_found, storage_error, ApiError, ApiJson};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserRequest {
    address: String,
    name: String,
    email: String,
}

pub async fn register_user(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let address = parse_address("address", &req.address)?;
    let name = require_text("name", &req.name)?;
    let email = require_text("email", &req.email)?;
    if !is_plausible_email(email) {
        return Err(invalid_field("email", "Invalid email address"));
    }

    let user = state
        .storage
        .create_user(&address, name, email)
        .await
        .map_err(storage_error)?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<User>, ApiError> {
    let address = parse_address("address", &address)?;
    state
        .storage
        .get_user(&address)
        .await
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("User not found"))
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    }
}
