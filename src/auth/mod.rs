pub mod jwt;
pub mod password;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use diesel::prelude::*;
use uuid::Uuid;

use crate::{error::AppError, policy::Role, schema::user_departments, state::AppState};

/// The resolved actor behind a request: identity, role and the department
/// set that drives staff visibility. Handlers receive this fully resolved;
/// no core code ever parses credentials itself.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
    pub department_ids: Vec<Uuid>,
}

#[async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::Unauthorized)?;

        let claims = state
            .jwt
            .verify_token(bearer.token())
            .map_err(|_| AppError::Unauthorized)?;

        let role = Role::parse(&claims.role).ok_or(AppError::Unauthorized)?;

        // Memberships are re-read per request so revoking one takes effect
        // without waiting for token expiry.
        let department_ids: Vec<Uuid> = if role == Role::Staff {
            let mut conn = state.db()?;
            user_departments::table
                .filter(user_departments::user_id.eq(claims.sub))
                .select(user_departments::department_id)
                .load(&mut conn)?
        } else {
            Vec::new()
        };

        Ok(Principal {
            user_id: claims.sub,
            username: claims.username,
            role,
            department_ids,
        })
    }
}
