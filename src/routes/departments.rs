use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use diesel::{dsl::count_star, prelude::*};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::{
    auth::Principal,
    error::{AppError, AppResult},
    models::{Department, NewDepartment},
    policy::{self, Action},
    schema::{departments, document_departments, user_departments},
    state::AppState,
};

#[derive(Deserialize)]
pub struct CreateDepartmentRequest {
    pub name: String,
    pub code: String,
}

#[derive(Serialize)]
pub struct DepartmentEntry {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub document_count: i64,
}

pub async fn list_departments(
    State(state): State<AppState>,
    _principal: Principal,
) -> AppResult<Json<Vec<DepartmentEntry>>> {
    let mut conn = state.db()?;

    let rows: Vec<Department> = departments::table
        .order(departments::code.asc())
        .load(&mut conn)?;

    let usage_rows: Vec<(Uuid, i64)> = document_departments::table
        .group_by(document_departments::department_id)
        .select((document_departments::department_id, count_star()))
        .load(&mut conn)?;
    let usage_map: HashMap<Uuid, i64> = usage_rows.into_iter().collect();

    let response = rows
        .into_iter()
        .map(|department| DepartmentEntry {
            document_count: *usage_map.get(&department.id).unwrap_or(&0),
            id: department.id,
            name: department.name,
            code: department.code,
        })
        .collect();

    Ok(Json(response))
}

pub async fn create_department(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<CreateDepartmentRequest>,
) -> AppResult<(StatusCode, Json<DepartmentEntry>)> {
    policy::authorize(&principal, Action::Create)?;

    let name = payload.name.trim();
    let code = payload.code.trim();
    if name.is_empty() {
        return Err(AppError::validation("name must not be empty"));
    }
    if code.is_empty() {
        return Err(AppError::validation("code must not be empty"));
    }

    let mut conn = state.db()?;
    let new_department = NewDepartment {
        id: Uuid::new_v4(),
        name: name.to_string(),
        code: code.to_string(),
    };

    match diesel::insert_into(departments::table)
        .values(&new_department)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        )) => {
            return Err(AppError::validation("department code already exists"));
        }
        Err(err) => return Err(AppError::from(err)),
    }

    let department: Department = departments::table.find(new_department.id).first(&mut conn)?;
    Ok((
        StatusCode::CREATED,
        Json(DepartmentEntry {
            id: department.id,
            name: department.name,
            code: department.code,
            document_count: 0,
        }),
    ))
}

pub async fn delete_department(
    State(state): State<AppState>,
    principal: Principal,
    Path(department_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    policy::authorize(&principal, Action::Delete)?;

    let mut conn = state.db()?;

    let document_usage: i64 = document_departments::table
        .filter(document_departments::department_id.eq(department_id))
        .select(count_star())
        .first(&mut conn)?;
    if document_usage > 0 {
        return Err(AppError::validation(
            "cannot delete department that is still linked to documents",
        ));
    }

    let member_usage: i64 = user_departments::table
        .filter(user_departments::department_id.eq(department_id))
        .select(count_star())
        .first(&mut conn)?;
    if member_usage > 0 {
        return Err(AppError::validation(
            "cannot delete department that still has members",
        ));
    }

    let deleted =
        diesel::delete(departments::table.find(department_id)).execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::NotFound);
    }

    Ok(StatusCode::NO_CONTENT)
}
