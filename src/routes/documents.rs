use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::Principal,
    error::{AppError, AppResult},
    models::{Attachment, Direction},
    repository::{
        attachments,
        documents::{self, CreateDocumentInput, DocumentDetail, DocumentFilter, UpdateDocumentInput},
    },
    state::AppState,
};

#[derive(Deserialize)]
pub struct ListQuery {
    pub direction: Option<String>,
    pub year: Option<i32>,
    pub keyword: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Serialize)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub direction: String,
    pub year: i32,
    pub sequence_number: i32,
    pub issue_date: NaiveDate,
    pub counterparty_name: String,
    pub original_code: String,
    pub original_date: Option<NaiveDate>,
    pub summary: String,
    pub project_id: Option<Uuid>,
    pub created_by: Uuid,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub department_ids: Vec<Uuid>,
    pub attachments: Vec<AttachmentResponse>,
}

#[derive(Serialize)]
pub struct AttachmentResponse {
    pub id: Uuid,
    pub file_name: String,
    pub file_path: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub uploaded_by: Uuid,
    pub uploaded_at: NaiveDateTime,
}

#[derive(Serialize)]
pub struct DocumentListResponse {
    pub items: Vec<DocumentResponse>,
    pub pagination: Pagination,
}

#[derive(Serialize)]
pub struct Pagination {
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

impl From<Attachment> for AttachmentResponse {
    fn from(attachment: Attachment) -> Self {
        AttachmentResponse {
            id: attachment.id,
            file_name: attachment.file_name,
            file_path: attachment.file_path,
            content_type: attachment.content_type,
            size_bytes: attachment.size_bytes,
            uploaded_by: attachment.uploaded_by,
            uploaded_at: attachment.uploaded_at,
        }
    }
}

impl From<DocumentDetail> for DocumentResponse {
    fn from(detail: DocumentDetail) -> Self {
        let document = detail.document;
        DocumentResponse {
            id: document.id,
            direction: document.direction,
            year: document.year,
            sequence_number: document.sequence_number,
            issue_date: document.issue_date,
            counterparty_name: document.counterparty_name,
            original_code: document.original_code,
            original_date: document.original_date,
            summary: document.summary,
            project_id: document.project_id,
            created_by: document.created_by,
            created_at: document.created_at,
            updated_at: document.updated_at,
            department_ids: detail.department_ids,
            attachments: detail
                .attachments
                .into_iter()
                .map(AttachmentResponse::from)
                .collect(),
        }
    }
}

pub async fn list_documents(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<DocumentListResponse>> {
    let direction = match query.direction.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(value) => Some(Direction::parse(value).ok_or_else(|| {
            AppError::validation("direction must be INCOMING or OUTGOING")
        })?),
    };

    let filter = DocumentFilter {
        direction,
        year: query.year,
        keyword: query.keyword,
    };

    let mut conn = state.db()?;
    let page = documents::list(
        &mut conn,
        &principal,
        &filter,
        query.page.unwrap_or(1),
        query.page_size.unwrap_or(20),
    )?;

    Ok(Json(DocumentListResponse {
        pagination: Pagination {
            total: page.total,
            page: page.page,
            page_size: page.page_size,
        },
        items: page.items.into_iter().map(DocumentResponse::from).collect(),
    }))
}

pub async fn create_document(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<CreateDocumentInput>,
) -> AppResult<(StatusCode, Json<DocumentResponse>)> {
    let mut conn = state.db()?;
    let detail = documents::create(&mut conn, &principal, payload)?;
    Ok((StatusCode::CREATED, Json(DocumentResponse::from(detail))))
}

pub async fn get_document(
    State(state): State<AppState>,
    principal: Principal,
    Path(document_id): Path<Uuid>,
) -> AppResult<Json<DocumentResponse>> {
    let mut conn = state.db()?;
    let detail = documents::get(&mut conn, &principal, document_id)?;
    Ok(Json(DocumentResponse::from(detail)))
}

pub async fn update_document(
    State(state): State<AppState>,
    principal: Principal,
    Path(document_id): Path<Uuid>,
    Json(payload): Json<UpdateDocumentInput>,
) -> AppResult<Json<DocumentResponse>> {
    let mut conn = state.db()?;
    let detail = documents::update(&mut conn, &principal, document_id, payload)?;
    Ok(Json(DocumentResponse::from(detail)))
}

pub async fn delete_document(
    State(state): State<AppState>,
    principal: Principal,
    Path(document_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    documents::delete(&mut conn, &principal, document_id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_attachments(
    State(state): State<AppState>,
    principal: Principal,
    Path(document_id): Path<Uuid>,
) -> AppResult<Json<Vec<AttachmentResponse>>> {
    let mut conn = state.db()?;
    let rows = attachments::list_for_document(&mut conn, &principal, document_id)?;
    Ok(Json(rows.into_iter().map(AttachmentResponse::from).collect()))
}

pub async fn remove_attachment(
    State(state): State<AppState>,
    principal: Principal,
    Path((document_id, attachment_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    attachments::delete(&mut conn, &principal, document_id, attachment_id)?;
    Ok(StatusCode::NO_CONTENT)
}
