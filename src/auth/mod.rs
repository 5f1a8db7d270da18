/*!
 * # Staff Authentication
 *
 * Staff sign in with email and password (argon2 hashes) and receive an HS256
 * JWT. Handlers take [`AuthUser`] for any signed-in staff member or
 * [`RequireAdmin`] for routes limited to the admin roles.
 */

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use crate::{
    entities::{role, user},
    errors::ServiceError,
    services::{messages, Actor},
};

/// JWT claims for a staff session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub name: String,
    pub email: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_secs: i64,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token_ttl_secs", &self.token_ttl_secs)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StaffSummary {
    pub id: i32,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: StaffSummary,
}

pub fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ServiceError::InternalError(format!("Failed to hash password: {}", e)))
}

/// A malformed stored hash counts as a mismatch.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("stored password hash is malformed: {}", e);
            false
        }
    }
}

#[derive(Clone)]
pub struct AuthService {
    db: Arc<DatabaseConnection>,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(db: Arc<DatabaseConnection>, config: AuthConfig) -> Self {
        Self { db, config }
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ServiceError> {
        let invalid = || ServiceError::Unauthorized(messages::INVALID_CREDENTIALS.to_string());
        let email = request.email.trim().to_lowercase();

        let found = user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .filter(user::Column::IsDeleted.eq(false))
            .filter(user::Column::Status.eq(true))
            .find_also_related(role::Entity)
            .one(&*self.db)
            .await?;
        let (staff, staff_role) = found.ok_or_else(invalid)?;
        if !verify_password(&request.password, &staff.password_hash) {
            warn!(user_id = staff.id, "login rejected");
            return Err(invalid());
        }
        let role_name = staff_role
            .map(|r| r.name)
            .ok_or_else(|| ServiceError::InternalError("User has no role".to_string()))?;

        let token = self.issue_token(&staff, &role_name)?;
        info!(user_id = staff.id, role = %role_name, "staff signed in");
        Ok(LoginResponse {
            token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.token_ttl_secs,
            user: StaffSummary {
                id: staff.id,
                first_name: staff.first_name,
                last_name: staff.last_name,
                email: staff.email,
                role: role_name,
            },
        })
    }

    pub fn issue_token(&self, staff: &user::Model, role_name: &str) -> Result<String, ServiceError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: staff.id.to_string(),
            name: staff.full_name(),
            email: staff.email.clone(),
            role: role_name.to_string(),
            iat: now,
            exp: now + self.config.token_ttl_secs,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| ServiceError::InternalError(format!("Token creation failed: {}", e)))
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, ServiceError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                ServiceError::Unauthorized("Token has expired".to_string())
            }
            _ => ServiceError::Unauthorized("Invalid authentication token".to_string()),
        })
    }

    /// Creates the first super-admin when no account uses `email` yet.
    /// Returns whether an account was created.
    #[instrument(skip(self, password))]
    pub async fn ensure_bootstrap_admin(
        &self,
        email: &str,
        password: &str,
    ) -> Result<bool, ServiceError> {
        let email = email.trim().to_lowercase();
        let db = &*self.db;
        let existing = user::Entity::find()
            .filter(user::Column::Email.eq(email.as_str()))
            .one(db)
            .await?;
        if existing.is_some() {
            return Ok(false);
        }
        let super_admin = role::Entity::find()
            .filter(role::Column::Name.eq(role::SUPER_ADMIN))
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::InternalError("super-admin role is not seeded".to_string()))?;

        let now = Utc::now();
        user::ActiveModel {
            first_name: Set("Super".to_string()),
            last_name: Set("Admin".to_string()),
            email: Set(email),
            password_hash: Set(hash_password(password)?),
            role_id: Set(super_admin.id),
            status: Set(true),
            is_deleted: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await?;
        info!("bootstrap super-admin created");
        Ok(true)
    }
}

/// Any signed-in staff member.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i32,
    pub name: String,
    pub email: String,
    pub role: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        role::STAFF_ROLES.contains(&self.role.as_str())
    }

    pub fn actor(&self) -> Actor {
        Actor {
            id: self.user_id,
            name: self.name.clone(),
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<AuthService>: FromRef<S>,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = Arc::<AuthService>::from_ref(state);
        let token = bearer_token(parts)
            .ok_or_else(|| ServiceError::Unauthorized("Authentication required".to_string()))?;
        let claims = auth.validate_token(token)?;
        let user_id = claims
            .sub
            .parse()
            .map_err(|_| ServiceError::Unauthorized("Invalid authentication token".to_string()))?;
        Ok(AuthUser {
            user_id,
            name: claims.name,
            email: claims.email,
            role: claims.role,
        })
    }
}

/// A signed-in member of the super-admin or admin role.
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub AuthUser);

#[async_trait]
impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
    Arc<AuthService>: FromRef<S>,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(ServiceError::Forbidden("Insufficient permissions".to_string()));
        }
        Ok(RequireAdmin(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::memory_db;
    use crate::services::notifications::tests::add_staff;
    use axum::http::Request;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    async fn service() -> AuthService {
        AuthService::new(
            Arc::new(memory_db().await),
            AuthConfig {
                jwt_secret: SECRET.into(),
                token_ttl_secs: 3600,
            },
        )
    }

    #[derive(Clone)]
    struct TestState(Arc<AuthService>);

    impl FromRef<TestState> for Arc<AuthService> {
        fn from_ref(state: &TestState) -> Self {
            state.0.clone()
        }
    }

    fn parts_with(token: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/");
        if let Some(t) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", t));
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn password_hashes_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("correct horse", "not-a-hash"));
    }

    #[tokio::test]
    async fn bootstrap_admin_can_log_in_once_created() {
        let auth = service().await;
        assert!(auth.ensure_bootstrap_admin("Root@Example.com", "s3cret-pass").await.unwrap());
        assert!(!auth.ensure_bootstrap_admin("root@example.com", "other").await.unwrap());

        let response = auth
            .login(&LoginRequest {
                email: " root@example.com ".into(),
                password: "s3cret-pass".into(),
            })
            .await
            .unwrap();
        assert_eq!(response.token_type, "Bearer");
        assert_eq!(response.user.role, role::SUPER_ADMIN);

        let claims = auth.validate_token(&response.token).unwrap();
        assert_eq!(claims.sub, response.user.id.to_string());
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let auth = service().await;
        auth.ensure_bootstrap_admin("root@example.com", "s3cret-pass").await.unwrap();
        let err = auth
            .login(&LoginRequest {
                email: "root@example.com".into(),
                password: "nope".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(m) if m == messages::INVALID_CREDENTIALS));
    }

    #[tokio::test]
    async fn require_admin_rejects_plain_users() {
        let auth = Arc::new(service().await);
        let db = auth.db.clone();
        let user_id = add_staff(&db, "user@example.com", role::USER).await;
        let staff = user::Entity::find_by_id(user_id).one(&*db).await.unwrap().unwrap();
        let token = auth.issue_token(&staff, role::USER).unwrap();
        let state = TestState(auth.clone());

        let mut parts = parts_with(Some(&token));
        let user = AuthUser::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(user.user_id, user_id);

        let mut parts = parts_with(Some(&token));
        assert!(matches!(
            RequireAdmin::from_request_parts(&mut parts, &state).await,
            Err(ServiceError::Forbidden(_))
        ));

        let mut parts = parts_with(None);
        assert!(matches!(
            AuthUser::from_request_parts(&mut parts, &state).await,
            Err(ServiceError::Unauthorized(_))
        ));
        let mut parts = parts_with(Some("garbage"));
        assert!(matches!(
            AuthUser::from_request_parts(&mut parts, &state).await,
            Err(ServiceError::Unauthorized(_))
        ));
    }
}
