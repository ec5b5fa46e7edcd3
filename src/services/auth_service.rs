use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{TokenResponse, User, UserRole};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub role: String,
    pub society: Option<Uuid>,
    pub exp: i64,
    pub iat: i64,
    pub token_type: TokenType,
    pub jti: Uuid,
}

pub struct AuthService {
    config: Config,
}

impl AuthService {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn generate_token(&self, user: &User, token_type: TokenType, ttl_secs: i64) -> AppResult<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(ttl_secs);

        let claims = Claims {
            sub: user.id.to_string(),
            role: user.role.as_str().to_string(),
            society: user.society_id,
            exp: exp.timestamp(),
            iat: now.timestamp(),
            token_type,
            jti: Uuid::new_v4(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(AppError::from)
    }

    pub fn generate_access_token(&self, user: &User) -> AppResult<String> {
        self.generate_token(user, TokenType::Access, self.config.jwt_access_expiry)
    }

    pub fn generate_refresh_token(&self, user: &User) -> AppResult<String> {
        self.generate_token(user, TokenType::Refresh, self.config.jwt_refresh_expiry)
    }

    pub fn verify_token(&self, token: &str) -> AppResult<Claims> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &Validation::default(),
        )?;

        Ok(token_data.claims)
    }

    /// Issues an access/refresh pair and stores the refresh token hash.
    pub async fn issue_tokens(&self, pool: &PgPool, user: &User) -> AppResult<TokenResponse> {
        let access = self.generate_access_token(user)?;
        let refresh = self.generate_refresh_token(user)?;

        let expires_at = Utc::now() + Duration::seconds(self.config.jwt_refresh_expiry);
        Self::save_refresh_token(pool, user.id, &Self::hash_token(&refresh), expires_at).await?;

        Ok(TokenResponse { access, refresh })
    }

    pub fn hash_password(password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::Internal(format!("password hashing failed: {}", e)))
    }

    pub fn verify_password(password: &str, password_hash: &str) -> bool {
        PasswordHash::new(password_hash)
            .map(|parsed| {
                Argon2::default()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    }

    pub async fn get_user_by_id(pool: &PgPool, user_id: Uuid) -> AppResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    pub async fn get_user_by_username(pool: &PgPool, username: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(pool)
            .await?;
        Ok(user)
    }

    pub async fn save_refresh_token(
        pool: &PgPool,
        user_id: Uuid,
        token_hash: &str,
        expires_at: chrono::DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Returns false when the token was unknown or already rotated.
    pub async fn delete_refresh_token(pool: &PgPool, token_hash: &str) -> AppResult<bool> {
        let result = sqlx::query(
            "DELETE FROM refresh_tokens WHERE token_hash = $1 AND expires_at > NOW()",
        )
        .bind(token_hash)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn update_last_login(pool: &PgPool, user_id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(pool)
            .await?;

        Ok(())
    }

    pub fn hash_token(token: &str) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        format!("{:x}", hasher.finish())
    }

    /// Creates a society-less ADMIN from `BOOTSTRAP_ADMIN_*` when it does not exist yet.
    pub async fn bootstrap_admin(pool: &PgPool, config: &Config) -> AppResult<()> {
        let (Some(username), Some(password)) = (
            config.bootstrap_admin_username.as_deref(),
            config.bootstrap_admin_password.as_deref(),
        ) else {
            return Ok(());
        };

        if Self::get_user_by_username(pool, username).await?.is_some() {
            tracing::debug!(username, "bootstrap admin already exists");
            return Ok(());
        }

        let password_hash = Self::hash_password(password)?;
        sqlx::query(
            r#"
            INSERT INTO users (username, password_hash, first_name, last_name, role)
            VALUES ($1, $2, 'Admin', '', $3)
            "#,
        )
        .bind(username)
        .bind(&password_hash)
        .bind(UserRole::Admin)
        .execute(pool)
        .await?;

        tracing::info!(username, "bootstrap admin created");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user(role: UserRole, society_id: Option<Uuid>) -> User {
        User {
            id: Uuid::new_v4(),
            username: "a101".into(),
            password_hash: String::new(),
            email: None,
            first_name: "Asha".into(),
            last_name: "Rao".into(),
            role,
            society_id,
            phone: String::new(),
            emergency_contact: String::new(),
            address: String::new(),
            is_active: true,
            date_joined: Utc::now(),
            last_login_at: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_access_token_round_trip() {
        let service = AuthService::new(Config::for_tests("secret"));
        let society = Uuid::new_v4();
        let user = sample_user(UserRole::Committee, Some(society));

        let token = service.generate_access_token(&user).unwrap();
        let claims = service.verify_token(&token).unwrap();

        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.role, "COMMITTEE");
        assert_eq!(claims.society, Some(society));
        assert_eq!(claims.token_type, TokenType::Access);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_refresh_token_lifetime() {
        let service = AuthService::new(Config::for_tests("secret"));
        let user = sample_user(UserRole::Admin, None);

        let claims = service
            .verify_token(&service.generate_refresh_token(&user).unwrap())
            .unwrap();

        assert_eq!(claims.token_type, TokenType::Refresh);
        assert_eq!(claims.exp - claims.iat, 604_800);
        assert_eq!(claims.society, None);
    }

    #[test]
    fn test_refresh_tokens_are_unique() {
        let service = AuthService::new(Config::for_tests("secret"));
        let user = sample_user(UserRole::Resident, None);
        let a = service.generate_refresh_token(&user).unwrap();
        let b = service.generate_refresh_token(&user).unwrap();
        assert_ne!(AuthService::hash_token(&a), AuthService::hash_token(&b));
    }

    #[test]
    fn test_token_signed_with_other_secret_is_rejected() {
        let issuer = AuthService::new(Config::for_tests("one"));
        let verifier = AuthService::new(Config::for_tests("two"));
        let token = issuer
            .generate_access_token(&sample_user(UserRole::Resident, None))
            .unwrap();
        assert!(matches!(verifier.verify_token(&token), Err(AppError::Jwt(_))));
    }

    #[test]
    fn test_password_hashing() {
        let hash = AuthService::hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(AuthService::verify_password("correct horse", &hash));
        assert!(!AuthService::verify_password("wrong horse", &hash));
        assert!(!AuthService::verify_password("correct horse", "not-a-hash"));
    }
}
