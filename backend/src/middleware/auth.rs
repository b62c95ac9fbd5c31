//! Authentication middleware
//!
//! JWT authentication and permission gate. Tokens are issued elsewhere; this
//! server only verifies them and reads the user's company and permissions.

use axum::{
    extract::Request,
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::{AppError, AppResult, ErrorDetail, ErrorResponse};

/// Authenticated user information extracted from JWT
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: uuid::Uuid,
    pub company_id: uuid::Uuid,
    pub role_id: uuid::Uuid,
    pub permissions: Vec<String>,
}

impl AuthUser {
    /// Check if user has a specific permission
    pub fn has_permission(&self, resource: &str, action: &str) -> bool {
        let permission = format!("{}:{}", resource, action);
        self.permissions.contains(&permission)
    }
}

/// Authentication middleware that validates JWT tokens
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    // Extract Authorization header
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) => token,
        None => {
            return unauthorized_response("Missing or invalid Authorization header");
        }
    };

    // Secret comes from the environment so the layer needs no state
    let jwt_secret = std::env::var("FSS__JWT__SECRET")
        .or_else(|_| std::env::var("FSS_JWT_SECRET"))
        .unwrap_or_else(|_| "development-secret-key".to_string());

    let claims = match decode_jwt(token, &jwt_secret) {
        Ok(claims) => claims,
        Err(msg) => {
            return unauthorized_response(&msg);
        }
    };

    let auth_user = match claims.into_auth_user() {
        Ok(user) => user,
        Err(msg) => return unauthorized_response(msg),
    };

    request.extensions_mut().insert(auth_user);

    next.run(request).await
}

/// JWT claims structure
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct Claims {
    sub: String,
    company_id: String,
    role_id: String,
    permissions: Vec<String>,
    exp: i64,
    iat: i64,
}

impl Claims {
    fn into_auth_user(self) -> Result<AuthUser, &'static str> {
        let user_id =
            uuid::Uuid::parse_str(&self.sub).map_err(|_| "Invalid user ID in token")?;
        let company_id =
            uuid::Uuid::parse_str(&self.company_id).map_err(|_| "Invalid company ID in token")?;
        let role_id =
            uuid::Uuid::parse_str(&self.role_id).map_err(|_| "Invalid role ID in token")?;

        Ok(AuthUser {
            user_id,
            company_id,
            role_id,
            permissions: self.permissions,
        })
    }
}

/// Decode and validate JWT token
fn decode_jwt(token: &str, secret: &str) -> Result<Claims, String> {
    use jsonwebtoken::{decode, DecodingKey, Validation};

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| format!("Invalid token: {}", e))
}

/// Create unauthorized response
fn unauthorized_response(message: &str) -> Response {
    let error = ErrorResponse {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message_en: message.to_string(),
            message_fr: "Non autorisé".to_string(),
            field: None,
        },
    };

    (StatusCode::UNAUTHORIZED, Json(error)).into_response()
}

/// Extractor for authenticated user
/// Use this in handlers to get the current user
#[derive(Clone, Debug)]
pub struct CurrentUser(pub AuthUser);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .map(CurrentUser)
            .ok_or(AppError::InvalidToken)
    }
}

/// Permission guard for use in handlers
pub fn check_permission(user: &AuthUser, resource: &str, action: &str) -> AppResult<()> {
    if user.has_permission(resource, action) {
        Ok(())
    } else {
        Err(AppError::InsufficientPermissions(format!(
            "{}:{}",
            resource, action
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(permissions: &[&str]) -> AuthUser {
        AuthUser {
            user_id: uuid::Uuid::new_v4(),
            company_id: uuid::Uuid::new_v4(),
            role_id: uuid::Uuid::new_v4(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn test_permission_gate() {
        let operator = user(&["stock:read", "stock:write"]);
        assert!(check_permission(&operator, "stock", "write").is_ok());
        assert!(matches!(
            check_permission(&operator, "stock", "admin"),
            Err(AppError::InsufficientPermissions(p)) if p == "stock:admin"
        ));
    }

    #[test]
    fn test_claims_require_uuids() {
        let claims = Claims {
            sub: "not-a-uuid".to_string(),
            company_id: uuid::Uuid::new_v4().to_string(),
            role_id: uuid::Uuid::new_v4().to_string(),
            permissions: vec![],
            exp: 0,
            iat: 0,
        };
        assert_eq!(claims.into_auth_user().unwrap_err(), "Invalid user ID in token");
    }
}
