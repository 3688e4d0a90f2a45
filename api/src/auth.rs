use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use lexi_rag::models::AuthUser;

/// The Supabase user behind the request's bearer token.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub AuthUser);

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::unauthorized())?;

        match state.auth.user_for_token(bearer.token()).await {
            Ok(Some(user)) => {
                log::info!("Authenticated user {}", user.id);
                Ok(CurrentUser(user))
            }
            Ok(None) => Err(ApiError::unauthorized()),
            Err(e) => Err(ApiError::internal("Error al verificar la sesión", e)),
        }
    }
}

/// Guards the job routes. With `LEXI_JOB_TOKEN` set the bearer token must
/// match it; otherwise any bearer token is accepted.
pub async fn require_job_token(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(TypedHeader(Authorization(bearer))) = auth else {
        log::warn!("Job request without bearer token: {}", request.uri());
        return Err(ApiError::unauthorized());
    };

    if !job_token_accepted(state.settings.job_token.as_deref(), bearer.token()) {
        log::warn!("Job request with wrong token: {}", request.uri());
        return Err(ApiError::unauthorized());
    }

    Ok(next.run(request).await)
}

fn job_token_accepted(expected: Option<&str>, presented: &str) -> bool {
    match expected {
        Some(expected) => presented == expected,
        None => !presented.is_empty(),
    }
}
