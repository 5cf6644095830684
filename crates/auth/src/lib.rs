use anyhow::Context;
use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use cuid2::CuidConstructor;
use flock_config::{AuthConfig, GoogleAuthConfig};
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, Scope,
    TokenResponse, TokenUrl,
};
use once_cell::sync::Lazy;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool, Transaction};
use thiserror::Error;
use tracing::{debug, info, warn};

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_API: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const DEFAULT_CHURCH_NAME: &str = "My Church";
const MAX_SESSION_TTL_SECONDS: i64 = 10 * 365 * 24 * 60 * 60;

static CUID: Lazy<CuidConstructor> = Lazy::new(CuidConstructor::new);

#[derive(Clone)]
pub struct Authenticator {
    pool: SqlitePool,
    session_ttl: Duration,
    google: Option<GoogleOAuth>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("user already exists")]
    UserExists,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("google oauth is not configured")]
    GoogleOauthDisabled,
    #[error("google oauth error: {0}")]
    GoogleOauth(#[from] anyhow::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("password hashing failed: {0}")]
    PasswordHash(#[from] argon2::password_hash::Error),
    #[error("session not found")]
    SessionNotFound,
    #[error("session expired")]
    SessionExpired,
    #[error("invalid session token")]
    InvalidSession,
}

/// Church-level role of a signed-in user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Leader,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Leader => "leader",
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    #[serde(skip_serializing)]
    pub id: i64,
    pub public_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub role: UserRole,
    #[serde(skip_serializing)]
    pub church_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct AuthSession {
    pub token: String,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct GoogleProfile {
    pub subject: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

/// Optional details captured at sign-up.
#[derive(Debug, Clone, Default)]
pub struct NewAccount<'a> {
    pub display_name: Option<&'a str>,
    pub church_name: Option<&'a str>,
}

impl Authenticator {
    pub fn new(pool: SqlitePool, config: AuthConfig) -> Self {
        let seconds = i64::try_from(config.session_ttl_seconds)
            .unwrap_or(i64::MAX)
            .min(MAX_SESSION_TTL_SECONDS);
        let session_ttl = Duration::seconds(seconds);
        let google = GoogleOAuth::from_config(&config.google);

        Self {
            pool,
            session_ttl,
            google,
        }
    }

    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    pub fn google_enabled(&self) -> bool {
        self.google.is_some()
    }

    pub fn google_authorization_url(
        &self,
        state: &str,
        redirect_uri: &str,
    ) -> Result<String, AuthError> {
        let google = self.google.as_ref().ok_or(AuthError::GoogleOauthDisabled)?;
        google
            .authorize_url(state, redirect_uri)
            .map_err(AuthError::GoogleOauth)
    }

    /// Create a password account together with the church it administers.
    pub async fn register_with_password(
        &self,
        email: &str,
        password: &str,
        account: NewAccount<'_>,
    ) -> Result<User, AuthError> {
        let email = normalize_email(email);
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query("SELECT id FROM users WHERE email = ?")
            .bind(&email)
            .fetch_optional(&mut *tx)
            .await?;

        if existing.is_some() {
            return Err(AuthError::UserExists);
        }

        let password_hash = self.hash_password(password)?;

        let user = self
            .insert_user_with_church(
                &mut tx,
                Some(email.clone()),
                account.display_name.map(str::to_owned),
                account.church_name,
            )
            .await?;

        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO user_identities (user_id, provider, provider_uid, secret, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(user.id)
        .bind("password")
        .bind(&email)
        .bind(password_hash)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(user = %user.public_id, "registered password account");
        Ok(user)
    }

    pub async fn login_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError> {
        let identity = sqlx::query(
            "SELECT user_id, secret FROM user_identities WHERE provider = 'password' AND provider_uid = ?",
        )
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = identity else {
            return Err(AuthError::InvalidCredentials);
        };

        let secret: String = row.try_get("secret")?;
        let stored_hash = PasswordHash::new(&secret)?;
        Argon2::default()
            .verify_password(password.as_bytes(), &stored_hash)
            .map_err(|_| AuthError::InvalidCredentials)?;

        let user_id: i64 = row.try_get("user_id")?;
        self.fetch_user(user_id).await?;

        self.issue_session(user_id).await
    }

    pub async fn login_with_google_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<AuthSession, AuthError> {
        let google = self.google.as_ref().ok_or(AuthError::GoogleOauthDisabled)?;

        let profile = google
            .exchange_code(code, redirect_uri)
            .await
            .map_err(AuthError::GoogleOauth)?;

        self.login_with_google_profile(profile).await
    }

    /// Sign in with a verified Google profile, linking or creating the account.
    pub async fn login_with_google_profile(
        &self,
        profile: GoogleProfile,
    ) -> Result<AuthSession, AuthError> {
        let mut tx = self.pool.begin().await?;

        if let Some(row) = sqlx::query(
            "SELECT user_id FROM user_identities WHERE provider = 'google' AND provider_uid = ?",
        )
        .bind(&profile.subject)
        .fetch_optional(&mut *tx)
        .await?
        {
            let user_id: i64 = row.try_get("user_id")?;
            tx.commit().await?;
            return self.issue_session(user_id).await;
        }

        let email = profile.email.as_deref().map(normalize_email);

        let existing = match email.as_ref() {
            Some(email) => sqlx::query("SELECT id FROM users WHERE email = ?")
                .bind(email)
                .fetch_optional(&mut *tx)
                .await?
                .map(|row| row.try_get::<i64, _>("id"))
                .transpose()?,
            None => None,
        };

        let user_id = match existing {
            Some(user_id) => user_id,
            None => {
                self.insert_user_with_church(&mut tx, email.clone(), profile.name.clone(), None)
                    .await?
                    .id
            }
        };

        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO user_identities (user_id, provider, provider_uid, secret, created_at, updated_at) VALUES (?, ?, ?, NULL, ?, ?)",
        )
        .bind(user_id)
        .bind("google")
        .bind(&profile.subject)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(user_id, email = ?email, "linked google identity");
        self.issue_session(user_id).await
    }

    pub async fn authenticate_token(&self, token: &str) -> Result<(User, AuthSession), AuthError> {
        let row = sqlx::query("SELECT user_id, expires_at FROM sessions WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Err(AuthError::SessionNotFound);
        };

        let user_id: i64 = row.try_get("user_id")?;
        let expires_at: String = row.try_get("expires_at")?;

        let expires_at = DateTime::parse_from_rfc3339(&expires_at)
            .map_err(|_| AuthError::InvalidSession)?
            .with_timezone(&Utc);

        if expires_at <= Utc::now() {
            sqlx::query("DELETE FROM sessions WHERE token = ?")
                .bind(token)
                .execute(&self.pool)
                .await?;
            return Err(AuthError::SessionExpired);
        }

        let user = self.fetch_user(user_id).await?;
        let session = AuthSession {
            token: token.to_owned(),
            user_id,
            expires_at,
        };

        Ok((user, session))
    }

    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        let result = sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::SessionNotFound);
        }

        debug!("session revoked");
        Ok(())
    }

    pub async fn user_profile(&self, user_id: i64) -> Result<User, AuthError> {
        self.fetch_user(user_id).await
    }

    async fn insert_user_with_church(
        &self,
        tx: &mut Transaction<'_, sqlx::Sqlite>,
        email: Option<String>,
        display_name: Option<String>,
        church_name: Option<&str>,
    ) -> Result<User, AuthError> {
        let now = Utc::now().to_rfc3339();
        let public_id = new_public_id();

        let user_id: i64 = sqlx::query_scalar(
            "INSERT INTO users (public_id, email, display_name, role, created_at, updated_at) VALUES (?, ?, ?, 'admin', ?, ?) RETURNING id",
        )
        .bind(&public_id)
        .bind(email.as_deref())
        .bind(display_name.as_deref())
        .bind(&now)
        .bind(&now)
        .fetch_one(&mut **tx)
        .await?;

        let church_name = church_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .or_else(|| display_name.as_ref().map(|name| format!("{name}'s Church")))
            .unwrap_or_else(|| DEFAULT_CHURCH_NAME.to_owned());

        let church_id: i64 = sqlx::query_scalar(
            "INSERT INTO churches (public_id, name, owner_user_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(new_public_id())
        .bind(&church_name)
        .bind(user_id)
        .bind(&now)
        .bind(&now)
        .fetch_one(&mut **tx)
        .await?;

        sqlx::query("UPDATE users SET church_id = ? WHERE id = ?")
            .bind(church_id)
            .bind(user_id)
            .execute(&mut **tx)
            .await?;

        Ok(User {
            id: user_id,
            public_id,
            email,
            display_name,
            phone: None,
            role: UserRole::Admin,
            church_id: Some(church_id),
        })
    }

    async fn fetch_user(&self, id: i64) -> Result<User, AuthError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, public_id, email, display_name, phone, role, church_id FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    async fn issue_session(&self, user_id: i64) -> Result<AuthSession, AuthError> {
        let token = self.generate_session_token();
        let now = Utc::now();
        let expires_at = now + self.session_ttl;

        sqlx::query(
            "INSERT INTO sessions (user_id, token, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(&token)
        .bind(now.to_rfc3339())
        .bind(expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(AuthSession {
            token,
            user_id,
            expires_at,
        })
    }

    fn hash_password(&self, password: &str) -> Result<String, argon2::password_hash::Error> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
        Ok(hash.to_string())
    }

    fn generate_session_token(&self) -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

/// Generate an opaque public identifier for a new record.
pub fn new_public_id() -> String {
    CUID.create_id()
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Clone)]
struct GoogleOAuth {
    client: BasicClient,
    http: reqwest::Client,
}

impl GoogleOAuth {
    fn from_config(config: &GoogleAuthConfig) -> Option<Self> {
        let client_id = config.client_id.clone()?;
        let client_secret = config.client_secret.clone()?;
        match Self::new(client_id, client_secret) {
            Ok(google) => Some(google),
            Err(error) => {
                warn!(error = %error, "google oauth disabled");
                None
            }
        }
    }

    fn new(client_id: String, client_secret: String) -> anyhow::Result<Self> {
        let client = BasicClient::new(
            ClientId::new(client_id),
            Some(ClientSecret::new(client_secret)),
            AuthUrl::new(GOOGLE_AUTH_URL.to_string()).context("invalid google auth url")?,
            Some(TokenUrl::new(GOOGLE_TOKEN_URL.to_string()).context("invalid google token url")?),
        )
        .set_auth_type(oauth2::AuthType::RequestBody);

        let http = reqwest::Client::builder()
            .user_agent("flock-backend")
            .build()
            .context("failed to build google http client")?;

        Ok(Self { client, http })
    }

    fn authorize_url(&self, state: &str, redirect_uri: &str) -> anyhow::Result<String> {
        let redirect = RedirectUrl::new(redirect_uri.to_owned())
            .context("invalid redirect uri for google oauth")?;

        let (url, _) = self
            .client
            .clone()
            .set_redirect_uri(redirect)
            .authorize_url(|| CsrfToken::new(state.to_owned()))
            .add_scope(Scope::new("openid".to_string()))
            .add_scope(Scope::new("email".to_string()))
            .add_scope(Scope::new("profile".to_string()))
            .url();

        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> anyhow::Result<GoogleProfile> {
        let redirect = RedirectUrl::new(redirect_uri.to_owned())
            .context("invalid redirect uri for google oauth")?;

        let token_response = self
            .client
            .clone()
            .set_redirect_uri(redirect)
            .exchange_code(AuthorizationCode::new(code.to_owned()))
            .request_async(async_http_client)
            .await
            .context("failed to exchange google oauth code")?;

        let access_token = token_response.access_token().secret();

        let user: GoogleUserInfo = self
            .http
            .get(GOOGLE_USERINFO_API)
            .bearer_auth(access_token)
            .send()
            .await
            .context("failed to call google userinfo api")?
            .error_for_status()
            .context("google userinfo api returned error")?
            .json()
            .await
            .context("failed to decode google userinfo response")?;

        debug!(subject = %user.sub, "fetched google user profile");

        let email = match user.email_verified {
            Some(false) => None,
            _ => user.email,
        };

        Ok(GoogleProfile {
            subject: user.sub,
            email,
            name: user.name,
        })
    }
}

#[derive(Deserialize)]
struct GoogleUserInfo {
    sub: String,
    name: Option<String>,
    email: Option<String>,
    email_verified: Option<bool>,
}
