use anyhow::{anyhow, Result};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use pasetors::claims::{Claims, ClaimsValidationRules};
use pasetors::keys::SymmetricKey;
use pasetors::token::UntrustedToken;
use pasetors::{local, version4::V4, Local};
use sqlx::Row;
use uuid::Uuid;

use crate::app::forms::CleanSignup;
use crate::domain::user::User;
use crate::infra::db::Db;

const TOKEN_ISSUER: &str = "yatube";
const SESSION_TOKEN_TYPE: &str = "session";

#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct SessionToken {
    pub token: String,
    pub max_age_seconds: u64,
}

#[derive(Debug)]
pub enum SignupOutcome {
    Created(User),
    UsernameTaken,
}

#[derive(Clone)]
pub struct AuthService {
    db: Db,
    session_key: [u8; 32],
    session_ttl_minutes: u64,
}

impl AuthService {
    pub fn new(db: Db, session_key: [u8; 32], session_ttl_minutes: u64) -> Self {
        Self {
            db,
            session_key,
            session_ttl_minutes,
        }
    }

    pub async fn signup(&self, form: CleanSignup) -> Result<SignupOutcome> {
        let password_hash = hash_password(&form.password)?;
        let row = sqlx::query(
            "INSERT INTO users (username, display_name, email, password_hash) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (username) DO NOTHING \
             RETURNING id, username, display_name, email, created_at",
        )
        .bind(form.username)
        .bind(form.display_name)
        .bind(form.email)
        .bind(password_hash)
        .fetch_optional(self.db.pool())
        .await?;

        let Some(row) = row else {
            return Ok(SignupOutcome::UsernameTaken);
        };

        Ok(SignupOutcome::Created(User {
            id: row.get("id"),
            username: row.get("username"),
            display_name: row.get("display_name"),
            email: row.get("email"),
            created_at: row.get("created_at"),
        }))
    }

    /// Checks credentials and issues a session token. `None` for unknown users,
    /// wrong passwords, and accounts without a password.
    pub async fn login(&self, username: &str, password: &str) -> Result<Option<SessionToken>> {
        let row = sqlx::query("SELECT id, password_hash FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(self.db.pool())
            .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let user_id: Uuid = row.get("id");
        let password_hash: String = row.get("password_hash");
        if password_hash.is_empty() {
            return Ok(None);
        }

        if !verify_password(password, &password_hash)? {
            return Ok(None);
        }

        Ok(Some(self.issue_session(user_id)?))
    }

    pub fn issue_session(&self, user_id: Uuid) -> Result<SessionToken> {
        let max_age_seconds = self.session_ttl_minutes * 60;
        let duration = std::time::Duration::from_secs(max_age_seconds);
        let mut claims = Claims::new_expires_in(&duration)?;
        claims.issuer(TOKEN_ISSUER)?;
        claims.audience(TOKEN_ISSUER)?;
        claims.subject(&user_id.to_string())?;
        claims.add_additional("typ", SESSION_TOKEN_TYPE)?;

        let key = SymmetricKey::<V4>::from(&self.session_key)?;
        let token = local::encrypt(&key, &claims, None, None)?;

        Ok(SessionToken {
            token,
            max_age_seconds,
        })
    }

    /// Resolves a session token. Tampered, expired, or foreign tokens yield `None`.
    pub fn authenticate(&self, token: &str) -> Result<Option<AuthSession>> {
        let claims = match self.decrypt_claims(token)? {
            Some(claims) => claims,
            None => return Ok(None),
        };
        if !has_token_type(&claims, SESSION_TOKEN_TYPE) {
            return Ok(None);
        }
        let user_id = claim_uuid(&claims, "sub")?;
        Ok(Some(AuthSession { user_id }))
    }

    fn decrypt_claims(&self, token: &str) -> Result<Option<Claims>> {
        let key = SymmetricKey::<V4>::from(&self.session_key)?;
        let mut rules = ClaimsValidationRules::new();
        rules.validate_issuer_with(TOKEN_ISSUER);
        rules.validate_audience_with(TOKEN_ISSUER);

        let untrusted = match UntrustedToken::<Local, V4>::try_from(token) {
            Ok(token) => token,
            Err(_) => return Ok(None),
        };
        let trusted = match local::decrypt(&key, &untrusted, &rules, None, None) {
            Ok(token) => token,
            Err(_) => return Ok(None),
        };
        Ok(trusted.payload_claims().cloned())
    }
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {}", err))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|err| anyhow!("failed to parse password hash: {}", err))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn claim_uuid(claims: &Claims, name: &str) -> Result<Uuid> {
    let value = claims
        .get_claim(name)
        .and_then(|value| value.as_str())
        .ok_or_else(|| anyhow!("missing {} claim", name))?;
    Ok(Uuid::parse_str(value)?)
}

fn has_token_type(claims: &Claims, expected: &str) -> bool {
    claims
        .get_claim("typ")
        .and_then(|value| value.as_str())
        .map(|value| value == expected)
        .unwrap_or(false)
}
