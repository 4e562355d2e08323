pub mod authority;
pub mod csrf;
pub mod jwt;

use std::collections::BTreeSet;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    state::AppState,
};

pub use authority::Authority;

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub username: String,
    pub roles: BTreeSet<String>,
    pub authorities: BTreeSet<Authority>,
}

impl AuthenticatedUser {
    pub fn has_authority(&self, authority: Authority) -> bool {
        self.authorities.contains(&authority)
    }

    pub fn is_advice_seeker(&self) -> bool {
        self.roles.contains(authority::ROLE_USER)
    }

    pub fn is_consultant(&self) -> bool {
        self.has_authority(Authority::ConsultantDefault)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::unauthorized())?;

        let claims = state
            .jwt
            .verify_token(bearer.token())
            .map_err(|_| AppError::unauthorized())?;

        let authorities = authority::authorities_for_roles(
            claims.realm_access.roles.iter().map(String::as_str),
        );

        Ok(AuthenticatedUser {
            user_id: claims.sub,
            username: claims.preferred_username,
            roles: claims.realm_access.roles.into_iter().collect(),
            authorities,
        })
    }
}

/// Passes when the caller holds at least one of `required_any_of`.
pub fn authorize(user: &AuthenticatedUser, required_any_of: &[Authority]) -> AppResult<()> {
    if required_any_of
        .iter()
        .any(|authority| user.has_authority(*authority))
    {
        return Ok(());
    }
    Err(AppError::forbidden(format!(
        "missing authority, one of: {}",
        required_any_of
            .iter()
            .map(|authority| authority.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    )))
}
