//! Attachment metadata ledger. Attachments are exclusively owned by their
//! document: rows are written only from inside the owning create/update
//! transaction and removed with the same permission check as updating the
//! parent. File bytes never pass through here; the transport layer stores
//! them and hands over metadata only.

use std::collections::HashMap;

use diesel::prelude::*;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::Principal;
use crate::error::{AppError, AppResult};
use crate::models::{Attachment, NewAttachment};
use crate::policy::{self, Action};
use crate::repository::documents::find_visible;
use crate::schema::attachments;

#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentInput {
    pub file_name: String,
    pub file_path: String,
    pub content_type: String,
    pub size_bytes: i64,
}

pub fn validate(inputs: &[AttachmentInput]) -> AppResult<()> {
    for input in inputs {
        if input.file_name.trim().is_empty() {
            return Err(AppError::validation("attachment file_name must not be empty"));
        }
        if input.file_path.trim().is_empty() {
            return Err(AppError::validation("attachment file_path must not be empty"));
        }
        if input.content_type.trim().is_empty() {
            return Err(AppError::validation(
                "attachment content_type must not be empty",
            ));
        }
        if input.size_bytes < 0 {
            return Err(AppError::validation(
                "attachment size_bytes must not be negative",
            ));
        }
    }
    Ok(())
}

/// Inserts metadata rows for a document. Must run inside the transaction
/// that creates or updates the owning document; there is no standalone
/// attach operation.
pub fn attach(
    conn: &mut PgConnection,
    document_id: Uuid,
    uploaded_by: Uuid,
    inputs: &[AttachmentInput],
) -> AppResult<Vec<Attachment>> {
    if inputs.is_empty() {
        return Ok(Vec::new());
    }

    let rows: Vec<NewAttachment> = inputs
        .iter()
        .map(|input| NewAttachment {
            id: Uuid::new_v4(),
            document_id,
            file_name: input.file_name.trim().to_string(),
            file_path: input.file_path.clone(),
            content_type: input.content_type.trim().to_string(),
            size_bytes: input.size_bytes,
            uploaded_by,
        })
        .collect();

    diesel::insert_into(attachments::table)
        .values(&rows)
        .execute(conn)?;

    list_for(conn, document_id)
}

/// All attachments of one document, oldest upload first.
pub fn list_for(conn: &mut PgConnection, document_id: Uuid) -> AppResult<Vec<Attachment>> {
    let rows = attachments::table
        .filter(attachments::document_id.eq(document_id))
        .order((attachments::uploaded_at.asc(), attachments::id.asc()))
        .load(conn)?;
    Ok(rows)
}

pub fn list_for_many(
    conn: &mut PgConnection,
    document_ids: &[Uuid],
) -> AppResult<HashMap<Uuid, Vec<Attachment>>> {
    if document_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<Attachment> = attachments::table
        .filter(attachments::document_id.eq_any(document_ids))
        .order((attachments::uploaded_at.asc(), attachments::id.asc()))
        .load(conn)?;

    let mut map: HashMap<Uuid, Vec<Attachment>> = HashMap::new();
    for row in rows {
        map.entry(row.document_id).or_default().push(row);
    }
    Ok(map)
}

/// Attachments of a document the principal may read; NotFound when the
/// parent is absent or invisible.
pub fn list_for_document(
    conn: &mut PgConnection,
    principal: &Principal,
    document_id: Uuid,
) -> AppResult<Vec<Attachment>> {
    policy::authorize(principal, Action::Read)?;
    find_visible(conn, principal, document_id)?.ok_or(AppError::NotFound)?;
    list_for(conn, document_id)
}

/// Removing an attachment mutates the parent document's record, so it
/// carries the parent's update permission.
pub fn delete(
    conn: &mut PgConnection,
    principal: &Principal,
    document_id: Uuid,
    attachment_id: Uuid,
) -> AppResult<()> {
    policy::authorize(principal, Action::Update)?;
    find_visible(conn, principal, document_id)?.ok_or(AppError::NotFound)?;

    let deleted = diesel::delete(
        attachments::table
            .filter(attachments::id.eq(attachment_id))
            .filter(attachments::document_id.eq(document_id)),
    )
    .execute(conn)?;

    if deleted == 0 {
        return Err(AppError::NotFound);
    }

    info!(%document_id, %attachment_id, "attachment removed");
    Ok(())
}
