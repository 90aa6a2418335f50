//! Document registry operations. This is the only write path for documents,
//! their department links and their attachment metadata; every operation
//! enforces the access policy and validation here, regardless of what the
//! HTTP layer already disabled in its forms.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use diesel::dsl::exists;
use diesel::prelude::*;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::Principal;
use crate::error::{AppError, AppResult};
use crate::models::{Attachment, Direction, Document, NewDocument, NewDocumentDepartment};
use crate::policy::{self, Action, Scope};
use crate::repository::attachments::{self, AttachmentInput};
use crate::schema::{departments, document_departments, documents, projects};
use crate::sequence;
use crate::utils::json::Patch;

const MIN_YEAR: i32 = 1970;
const MAX_YEAR: i32 = 2100;
const MAX_PAGE_SIZE: i64 = 100;

// Attempts at the allocate-then-insert cycle before surfacing a conflict.
const REGISTRATION_ATTEMPTS: u32 = 3;

#[derive(Debug, Default, Deserialize)]
pub struct CreateDocumentInput {
    pub direction: Option<String>,
    pub year: Option<i32>,
    pub issue_date: Option<NaiveDate>,
    pub counterparty_name: Option<String>,
    pub original_code: Option<String>,
    pub original_date: Option<NaiveDate>,
    pub summary: Option<String>,
    pub project_id: Option<Uuid>,
    #[serde(default)]
    pub department_ids: Vec<Uuid>,
    #[serde(default)]
    pub attachments: Vec<AttachmentInput>,
}

/// Patch for an existing document. Identity fields (`direction`, `year`,
/// `sequence_number`) may be echoed back unchanged but never altered.
/// The nullable fields use [`Patch`] so an explicit `null` clears them
/// while an omitted key leaves them alone.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateDocumentInput {
    pub issue_date: Option<NaiveDate>,
    pub counterparty_name: Option<String>,
    pub original_code: Option<String>,
    #[serde(default)]
    pub original_date: Patch<NaiveDate>,
    pub summary: Option<String>,
    #[serde(default)]
    pub project_id: Patch<Uuid>,
    pub department_ids: Option<Vec<Uuid>>,
    pub direction: Option<String>,
    pub year: Option<i32>,
    pub sequence_number: Option<i32>,
}

#[derive(Debug, Default, Clone)]
pub struct DocumentFilter {
    pub direction: Option<Direction>,
    pub year: Option<i32>,
    pub keyword: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DocumentDetail {
    pub document: Document,
    pub department_ids: Vec<Uuid>,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug)]
pub struct DocumentPage {
    pub items: Vec<DocumentDetail>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

#[derive(AsChangeset)]
#[diesel(table_name = documents)]
struct DocumentChangeset<'a> {
    issue_date: Option<NaiveDate>,
    counterparty_name: Option<&'a str>,
    original_code: Option<&'a str>,
    original_date: Option<Option<NaiveDate>>,
    summary: Option<&'a str>,
    project_id: Option<Option<Uuid>>,
    updated_at: NaiveDateTime,
}

#[derive(Debug)]
struct ValidatedCreate {
    direction: Direction,
    year: i32,
    issue_date: NaiveDate,
    counterparty_name: String,
    original_code: String,
    original_date: Option<NaiveDate>,
    summary: String,
    project_id: Option<Uuid>,
    department_ids: Vec<Uuid>,
    attachments: Vec<AttachmentInput>,
}

pub fn create(
    conn: &mut PgConnection,
    principal: &Principal,
    input: CreateDocumentInput,
) -> AppResult<DocumentDetail> {
    policy::authorize(principal, Action::Create)?;

    let validated = validate_create(input)?;
    ensure_departments_exist(conn, &validated.department_ids)?;
    if let Some(project_id) = validated.project_id {
        ensure_project_exists(conn, project_id)?;
    }

    let mut attempt = 0u32;
    loop {
        attempt += 1;

        // The counter upsert commits on its own before the document insert
        // starts. An insert that fails below leaves the issued number as a
        // permanent gap; a retry allocates a fresh number.
        let sequence_number = sequence::allocate(conn, validated.direction, validated.year)?;

        let result = conn.transaction::<DocumentDetail, AppError, _>(|conn| {
            let new_document = NewDocument {
                id: Uuid::new_v4(),
                direction: validated.direction.as_str().to_string(),
                year: validated.year,
                sequence_number,
                issue_date: validated.issue_date,
                counterparty_name: validated.counterparty_name.clone(),
                original_code: validated.original_code.clone(),
                original_date: validated.original_date,
                summary: validated.summary.clone(),
                project_id: validated.project_id,
                created_by: principal.user_id,
            };

            diesel::insert_into(documents::table)
                .values(&new_document)
                .execute(conn)?;

            link_departments(conn, new_document.id, &validated.department_ids)?;
            let stored = attachments::attach(
                conn,
                new_document.id,
                principal.user_id,
                &validated.attachments,
            )?;

            let document: Document = documents::table.find(new_document.id).first(conn)?;
            Ok(DocumentDetail {
                document,
                department_ids: validated.department_ids.clone(),
                attachments: stored,
            })
        });

        match result {
            Ok(detail) => {
                info!(
                    document_id = %detail.document.id,
                    direction = %validated.direction,
                    year = validated.year,
                    sequence_number,
                    "document registered"
                );
                return Ok(detail);
            }
            Err(AppError::Conflict(reason)) if attempt < REGISTRATION_ATTEMPTS => {
                warn!(attempt, %reason, "registration conflicted, retrying with a fresh number");
                // Blocks the calling thread like the surrounding diesel
                // calls; bounded at 60ms across all attempts.
                std::thread::sleep(Duration::from_millis(20 * u64::from(attempt)));
            }
            Err(AppError::Conflict(_)) => {
                return Err(AppError::conflict(
                    "could not register document after repeated conflicts",
                ));
            }
            Err(other) => return Err(other),
        }
    }
}

pub fn update(
    conn: &mut PgConnection,
    principal: &Principal,
    document_id: Uuid,
    input: UpdateDocumentInput,
) -> AppResult<DocumentDetail> {
    policy::authorize(principal, Action::Update)?;

    let existing = find_visible(conn, principal, document_id)?.ok_or(AppError::NotFound)?;
    reject_identity_change(&existing, &input)?;

    let counterparty_name = validate_optional_text(input.counterparty_name, "counterparty_name")?;
    let original_code = validate_optional_text(input.original_code, "original_code")?;
    let summary = validate_optional_text(input.summary, "summary")?;

    let department_ids = match input.department_ids {
        Some(ids) => {
            let ids = dedupe_departments(ids);
            ensure_departments_exist(conn, &ids)?;
            Some(ids)
        }
        None => None,
    };

    let original_date = input.original_date.into_nullable_change();
    let project_id = input.project_id.into_nullable_change();
    if let Some(Some(project_id)) = project_id {
        ensure_project_exists(conn, project_id)?;
    }

    let detail = conn.transaction::<DocumentDetail, AppError, _>(|conn| {
        let changeset = DocumentChangeset {
            issue_date: input.issue_date,
            counterparty_name: counterparty_name.as_deref(),
            original_code: original_code.as_deref(),
            original_date,
            summary: summary.as_deref(),
            project_id,
            updated_at: Utc::now().naive_utc(),
        };

        diesel::update(documents::table.find(document_id))
            .set(&changeset)
            .execute(conn)?;

        // Wholesale replacement: the link set after an update is exactly
        // the requested set, never a partial merge.
        if let Some(ids) = &department_ids {
            diesel::delete(
                document_departments::table
                    .filter(document_departments::document_id.eq(document_id)),
            )
            .execute(conn)?;
            link_departments(conn, document_id, ids)?;
        }

        load_detail(conn, document_id)
    })?;

    info!(document_id = %document_id, "document updated");
    Ok(detail)
}

pub fn list(
    conn: &mut PgConnection,
    principal: &Principal,
    filter: &DocumentFilter,
    page: i64,
    page_size: i64,
) -> AppResult<DocumentPage> {
    policy::authorize(principal, Action::Read)?;

    let scope = policy::visibility_scope(principal);
    let page = page.max(1);
    let page_size = page_size.clamp(1, MAX_PAGE_SIZE);

    let build = || {
        let mut query = documents::table.into_boxed();

        // Visibility is part of the query itself, not a post-filter, so
        // pagination and totals stay correct as the table grows.
        if let Scope::Departments(ids) = &scope {
            query = query.filter(exists(
                document_departments::table
                    .filter(document_departments::document_id.eq(documents::id))
                    .filter(document_departments::department_id.eq_any(ids.clone())),
            ));
        }
        if let Some(direction) = filter.direction {
            query = query.filter(documents::direction.eq(direction.as_str()));
        }
        if let Some(year) = filter.year {
            query = query.filter(documents::year.eq(year));
        }
        if let Some(keyword) = filter
            .keyword
            .as_deref()
            .map(str::trim)
            .filter(|keyword| !keyword.is_empty())
        {
            let pattern = format!("%{}%", escape_like(keyword));
            query = query.filter(
                documents::summary
                    .ilike(pattern.clone())
                    .or(documents::counterparty_name.ilike(pattern.clone()))
                    .or(documents::original_code.ilike(pattern)),
            );
        }
        query
    };

    let total: i64 = build().count().get_result(conn)?;
    let rows: Vec<Document> = build()
        .order(documents::sequence_number.desc())
        .offset(list_offset(page, page_size))
        .limit(page_size)
        .load(conn)?;

    let items = load_details(conn, rows)?;
    Ok(DocumentPage {
        items,
        total,
        page,
        page_size,
    })
}

pub fn get(
    conn: &mut PgConnection,
    principal: &Principal,
    document_id: Uuid,
) -> AppResult<DocumentDetail> {
    policy::authorize(principal, Action::Read)?;
    find_visible(conn, principal, document_id)?.ok_or(AppError::NotFound)?;
    load_detail(conn, document_id)
}

pub fn delete(conn: &mut PgConnection, principal: &Principal, document_id: Uuid) -> AppResult<()> {
    policy::authorize(principal, Action::Delete)?;

    // Links and attachments cascade with the row.
    let deleted = diesel::delete(documents::table.find(document_id)).execute(conn)?;
    if deleted == 0 {
        return Err(AppError::NotFound);
    }

    info!(%document_id, "document deleted");
    Ok(())
}

/// The single-document form of the list visibility predicate. Returns
/// `None` both for absent rows and rows outside the principal's scope, so
/// callers answer NotFound either way and existence is not leaked.
pub(crate) fn find_visible(
    conn: &mut PgConnection,
    principal: &Principal,
    document_id: Uuid,
) -> AppResult<Option<Document>> {
    let mut query = documents::table
        .filter(documents::id.eq(document_id))
        .into_boxed();

    if let Scope::Departments(ids) = policy::visibility_scope(principal) {
        query = query.filter(exists(
            document_departments::table
                .filter(document_departments::document_id.eq(documents::id))
                .filter(document_departments::department_id.eq_any(ids)),
        ));
    }

    Ok(query.first(conn).optional()?)
}

fn validate_create(input: CreateDocumentInput) -> AppResult<ValidatedCreate> {
    let direction = match input.direction.as_deref().map(str::trim) {
        None | Some("") => return Err(AppError::validation("direction is required")),
        Some(value) => Direction::parse(value)
            .ok_or_else(|| AppError::validation("direction must be INCOMING or OUTGOING"))?,
    };
    let year = input
        .year
        .ok_or_else(|| AppError::validation("year is required"))?;
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(AppError::validation(format!(
            "year must be between {MIN_YEAR} and {MAX_YEAR}"
        )));
    }
    let issue_date = input
        .issue_date
        .ok_or_else(|| AppError::validation("issue_date is required"))?;
    let counterparty_name = require_text(input.counterparty_name, "counterparty_name")?;
    let original_code = require_text(input.original_code, "original_code")?;
    let summary = require_text(input.summary, "summary")?;
    attachments::validate(&input.attachments)?;

    Ok(ValidatedCreate {
        direction,
        year,
        issue_date,
        counterparty_name,
        original_code,
        original_date: input.original_date,
        summary,
        project_id: input.project_id,
        department_ids: dedupe_departments(input.department_ids),
        attachments: input.attachments,
    })
}

fn reject_identity_change(existing: &Document, input: &UpdateDocumentInput) -> AppResult<()> {
    if let Some(direction) = input.direction.as_deref() {
        let parsed = Direction::parse(direction)
            .ok_or_else(|| AppError::validation("direction must be INCOMING or OUTGOING"))?;
        if parsed.as_str() != existing.direction {
            return Err(AppError::validation("direction is immutable"));
        }
    }
    if let Some(year) = input.year {
        if year != existing.year {
            return Err(AppError::validation("year is immutable"));
        }
    }
    if let Some(sequence_number) = input.sequence_number {
        if sequence_number != existing.sequence_number {
            return Err(AppError::validation("sequence_number is immutable"));
        }
    }
    Ok(())
}

fn require_text(value: Option<String>, field: &str) -> AppResult<String> {
    match value.as_deref().map(str::trim) {
        Some(trimmed) if !trimmed.is_empty() => Ok(trimmed.to_string()),
        _ => Err(AppError::validation(format!("{field} is required"))),
    }
}

fn validate_optional_text(value: Option<String>, field: &str) -> AppResult<Option<String>> {
    match value {
        None => Ok(None),
        Some(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Err(AppError::validation(format!("{field} must not be empty")));
            }
            Ok(Some(trimmed.to_string()))
        }
    }
}

fn dedupe_departments(ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

fn ensure_departments_exist(conn: &mut PgConnection, ids: &[Uuid]) -> AppResult<()> {
    if ids.is_empty() {
        return Ok(());
    }

    let found: i64 = departments::table
        .filter(departments::id.eq_any(ids))
        .count()
        .get_result(conn)?;

    if found as usize != ids.len() {
        return Err(AppError::validation(
            "department_ids contains one or more unknown departments",
        ));
    }
    Ok(())
}

fn ensure_project_exists(conn: &mut PgConnection, project_id: Uuid) -> AppResult<()> {
    let found: bool = diesel::select(exists(
        projects::table.filter(projects::id.eq(project_id)),
    ))
    .get_result(conn)?;

    if !found {
        return Err(AppError::validation("project_id does not exist"));
    }
    Ok(())
}

fn link_departments(conn: &mut PgConnection, document_id: Uuid, ids: &[Uuid]) -> AppResult<()> {
    if ids.is_empty() {
        return Ok(());
    }

    let rows: Vec<NewDocumentDepartment> = ids
        .iter()
        .map(|department_id| NewDocumentDepartment {
            document_id,
            department_id: *department_id,
        })
        .collect();

    diesel::insert_into(document_departments::table)
        .values(&rows)
        .execute(conn)?;
    Ok(())
}

fn load_detail(conn: &mut PgConnection, document_id: Uuid) -> AppResult<DocumentDetail> {
    let document: Document = documents::table.find(document_id).first(conn)?;
    let department_ids = load_department_ids(conn, document_id)?;
    let stored = attachments::list_for(conn, document_id)?;
    Ok(DocumentDetail {
        document,
        department_ids,
        attachments: stored,
    })
}

fn load_department_ids(conn: &mut PgConnection, document_id: Uuid) -> AppResult<Vec<Uuid>> {
    let ids = document_departments::table
        .filter(document_departments::document_id.eq(document_id))
        .order(document_departments::department_id.asc())
        .select(document_departments::department_id)
        .load(conn)?;
    Ok(ids)
}

fn load_details(conn: &mut PgConnection, rows: Vec<Document>) -> AppResult<Vec<DocumentDetail>> {
    let ids: Vec<Uuid> = rows.iter().map(|document| document.id).collect();

    let links: Vec<(Uuid, Uuid)> = if ids.is_empty() {
        Vec::new()
    } else {
        document_departments::table
            .filter(document_departments::document_id.eq_any(&ids))
            .order(document_departments::department_id.asc())
            .select((
                document_departments::document_id,
                document_departments::department_id,
            ))
            .load(conn)?
    };

    let mut link_map: std::collections::HashMap<Uuid, Vec<Uuid>> =
        std::collections::HashMap::new();
    for (document_id, department_id) in links {
        link_map.entry(document_id).or_default().push(department_id);
    }

    let mut attachment_map = attachments::list_for_many(conn, &ids)?;

    Ok(rows
        .into_iter()
        .map(|document| {
            let department_ids = link_map.remove(&document.id).unwrap_or_default();
            let stored = attachment_map.remove(&document.id).unwrap_or_default();
            DocumentDetail {
                document,
                department_ids,
                attachments: stored,
            }
        })
        .collect())
}

// Saturates instead of overflowing when a caller asks for an absurd page;
// Postgres just returns an empty page for an out-of-range offset.
fn list_offset(page: i64, page_size: i64) -> i64 {
    (page - 1).saturating_mul(page_size)
}

fn escape_like(keyword: &str) -> String {
    keyword
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
