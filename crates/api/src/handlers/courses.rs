use axum::{
    extract::{Path, State},
    Json,
};
use poc_core::rewards::parse_token_amount;
use poc_indexer::storage::Course;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{
    internal_error, invalid_field, not_found, ApiError, ApiJson, ApiQuery, ApiResult,
};
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListCoursesQuery {
    #[serde(default)]
    all: bool,
}

#[derive(Serialize)]
pub struct CoursesResponse {
    courses: Vec<Course>,
}

#[derive(Serialize)]
pub struct DeleteResponse {
    deleted: bool,
}

pub async fn list_courses(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListCoursesQuery>,
) -> ApiResult<CoursesResponse> {
    let courses = state
        .storage
        .list_courses(!query.all)
        .await
        .map_err(internal_error)?;
    Ok(Json(CoursesResponse { courses }))
}

pub async fn get_course(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Course> {
    state
        .storage
        .get_course(id)
        .await
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found(format!("Course {} not found", id)))
}

/// Create or replace a course. The path id wins over the body id.
pub async fn upsert_course(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    ApiJson(mut course): ApiJson<Course>,
) -> ApiResult<Course> {
    course.id = id;
    validate_course(&course)?;

    let stored = state
        .storage
        .upsert_course(&course)
        .await
        .map_err(internal_error)?;
    tracing::info!(course_id = id, modules = stored.modules.len(), "Course upserted");
    Ok(Json(stored))
}

pub async fn delete_course(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<DeleteResponse> {
    let deleted = state
        .storage
        .delete_course(id)
        .await
        .map_err(internal_error)?;
    if !deleted {
        return Err(not_found(format!("Course {} not found", id)));
    }
    Ok(Json(DeleteResponse { deleted }))
}

pub(crate) fn validate_course(course: &Course) -> Result<(), ApiError> {
    if course.title.trim().is_empty() {
        return Err(invalid_field("title", "title is required"));
    }
    if course.modules.is_empty() {
        return Err(invalid_field("modules", "Course must have at least one module"));
    }
    for (idx, module) in course.modules.iter().enumerate() {
        if module.id as usize != idx + 1 {
            return Err(invalid_field(
                "modules",
                format!("Module ids must run 1..{} in order", course.modules.len()),
            ));
        }
    }

    let mut seen = HashSet::new();
    if let Some(dup) = course.assignments.iter().find(|a| !seen.insert(&a.id)) {
        return Err(invalid_field(
            "assignments",
            format!("Duplicate assignment id {}", dup.id),
        ));
    }

    parse_token_amount(&course.stake_amount)
        .map_err(|e| invalid_field("stakeAmount", e.to_string()))?;
    Ok(())
}
