use flock_auth::{AuthSession, Authenticator, NewAccount, User};

use super::error::ServiceError;
use crate::state::OAuthStateStore;

const MIN_PASSWORD_LEN: usize = 8;

pub async fn google_login_url(
    authenticator: &Authenticator,
    oauth_state: &OAuthStateStore,
    redirect_uri: String,
) -> Result<String, ServiceError> {
    if !authenticator.google_enabled() {
        return Err(ServiceError::config("Google OAuth is not configured"));
    }

    let oauth_state = oauth_state.issue().await;
    let authorize_url = authenticator.google_authorization_url(&oauth_state, &redirect_uri)?;

    Ok(authorize_url)
}

pub async fn google_callback(
    authenticator: &Authenticator,
    oauth_state: &OAuthStateStore,
    code: String,
    state: String,
    redirect_uri: String,
) -> Result<(AuthSession, User), ServiceError> {
    if !oauth_state.consume(&state).await {
        return Err(ServiceError::bad_request("invalid or expired OAuth state"));
    }

    let session = authenticator.login_with_google_code(&code, &redirect_uri).await?;
    let user = authenticator.user_profile(session.user_id).await?;

    Ok((session, user))
}

/// Create a password account with its own church, then sign it in.
pub async fn register(
    authenticator: &Authenticator,
    email: &str,
    password: &str,
    account: NewAccount<'_>,
) -> Result<(AuthSession, User), ServiceError> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(ServiceError::bad_request("a valid email is required"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ServiceError::bad_request(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let user = authenticator
        .register_with_password(email, password, account)
        .await?;
    let session = authenticator.login_with_password(email, password).await?;

    Ok((session, user))
}

pub async fn login(
    authenticator: &Authenticator,
    email: &str,
    password: &str,
) -> Result<(AuthSession, User), ServiceError> {
    let session = authenticator.login_with_password(email, password).await?;
    let user = authenticator.user_profile(session.user_id).await?;

    Ok((session, user))
}
