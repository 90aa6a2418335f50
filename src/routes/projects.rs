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
    models::{NewProject, Project},
    policy::{self, Action},
    schema::{documents, projects},
    state::AppState,
};

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub code: String,
}

#[derive(Serialize)]
pub struct ProjectEntry {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub document_count: i64,
}

pub async fn list_projects(
    State(state): State<AppState>,
    _principal: Principal,
) -> AppResult<Json<Vec<ProjectEntry>>> {
    let mut conn = state.db()?;

    let rows: Vec<Project> = projects::table.order(projects::code.asc()).load(&mut conn)?;

    let usage_rows: Vec<(Option<Uuid>, i64)> = documents::table
        .group_by(documents::project_id)
        .select((documents::project_id, count_star()))
        .load(&mut conn)?;
    let usage_map: HashMap<Uuid, i64> = usage_rows
        .into_iter()
        .filter_map(|(project_id, count)| project_id.map(|id| (id, count)))
        .collect();

    let response = rows
        .into_iter()
        .map(|project| ProjectEntry {
            document_count: *usage_map.get(&project.id).unwrap_or(&0),
            id: project.id,
            name: project.name,
            code: project.code,
        })
        .collect();

    Ok(Json(response))
}

pub async fn create_project(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<CreateProjectRequest>,
) -> AppResult<(StatusCode, Json<ProjectEntry>)> {
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
    let new_project = NewProject {
        id: Uuid::new_v4(),
        name: name.to_string(),
        code: code.to_string(),
    };

    match diesel::insert_into(projects::table)
        .values(&new_project)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        )) => {
            return Err(AppError::validation("project code already exists"));
        }
        Err(err) => return Err(AppError::from(err)),
    }

    let project: Project = projects::table.find(new_project.id).first(&mut conn)?;
    Ok((
        StatusCode::CREATED,
        Json(ProjectEntry {
            id: project.id,
            name: project.name,
            code: project.code,
            document_count: 0,
        }),
    ))
}

pub async fn delete_project(
    State(state): State<AppState>,
    principal: Principal,
    Path(project_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    policy::authorize(&principal, Action::Delete)?;

    let mut conn = state.db()?;

    let usage: i64 = documents::table
        .filter(documents::project_id.eq(project_id))
        .select(count_star())
        .first(&mut conn)?;
    if usage > 0 {
        return Err(AppError::validation(
            "cannot delete project that still has documents",
        ));
    }

    let deleted = diesel::delete(projects::table.find(project_id)).execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::NotFound);
    }

    Ok(StatusCode::NO_CONTENT)
}
