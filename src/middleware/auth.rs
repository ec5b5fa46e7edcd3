use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{request::Parts, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppError;
use crate::models::UserRole;
use crate::permissions::SocietyScope;
use crate::services::auth_service::{AuthService, TokenType};

/// Authenticated caller, decoded from a bearer access token.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: UserRole,
    pub society_id: Option<Uuid>,
}

impl AuthUser {
    pub fn scope(&self) -> SocietyScope {
        SocietyScope::for_user(self.role, self.society_id)
    }

    pub fn is_staff(&self) -> bool {
        matches!(self.role, UserRole::Admin | UserRole::Committee)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
}

// Makes AppState reachable from extractors that are generic over the router state.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    request.extensions_mut().insert(state);
    next.run(request).await
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = parts
            .extensions
            .get::<AppState>()
            .cloned()
            .ok_or_else(|| AppError::Internal("AppState missing from request".into()).into_response())?;

        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::Unauthorized.into_response())?;

        let auth_service = AuthService::new(app_state.config);
        let claims = auth_service
            .verify_token(bearer.token())
            .map_err(IntoResponse::into_response)?;

        if claims.token_type != TokenType::Access {
            return Err(AppError::Unauthorized.into_response());
        }

        let user_id =
            Uuid::parse_str(&claims.sub).map_err(|_| AppError::Unauthorized.into_response())?;
        let role = UserRole::parse(&claims.role).ok_or_else(|| AppError::Unauthorized.into_response())?;

        Ok(AuthUser {
            user_id,
            role,
            society_id: claims.society,
        })
    }
}
