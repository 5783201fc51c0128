use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::{AuthResponse, LoginRequest, PublicUser, RegisterRequest},
    jwt::JwtKeys,
    password::{hash_password, verify_password},
    repo_types::User,
};
use crate::{
    error::{is_unique_violation, AppError, AppResult},
    state::AppState,
};

const MIN_PASSWORD_LEN: usize = 8;
const USERNAME_LEN: std::ops::RangeInclusive<usize> = 3..=32;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Trims the username, lowercases the email and checks both with the password.
pub fn validate_registration(mut req: RegisterRequest) -> AppResult<RegisterRequest> {
    req.username = req.username.trim().to_string();
    req.email = req.email.trim().to_lowercase();

    if !USERNAME_LEN.contains(&req.username.chars().count()) {
        return Err(AppError::validation("Username must be 3 to 32 characters"));
    }
    if !is_valid_email(&req.email) {
        return Err(AppError::validation("Invalid email"));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::validation("Password too short"));
    }
    Ok(req)
}

fn issue_tokens(keys: &JwtKeys, user: User) -> AppResult<AuthResponse> {
    Ok(AuthResponse {
        access_token: keys.sign_access(user.id)?,
        refresh_token: keys.sign_refresh(user.id)?,
        user: PublicUser::from(user),
    })
}

pub async fn register(
    state: &AppState,
    keys: &JwtKeys,
    req: RegisterRequest,
) -> AppResult<AuthResponse> {
    let req = validate_registration(req)?;
    let hash = hash_password(&req.password)?;

    let user = match User::create(&state.db, &req.username, &req.email, &hash).await {
        Ok(user) => user,
        Err(e) if is_unique_violation(&e) => {
            warn!(email = %req.email, "username or email already registered");
            return Err(AppError::Conflict("User already exists".into()));
        }
        Err(e) => return Err(e.into()),
    };

    info!(user_id = %user.id, username = %user.username, "user registered");
    issue_tokens(keys, user)
}

pub async fn login(state: &AppState, keys: &JwtKeys, req: LoginRequest) -> AppResult<AuthResponse> {
    let email = req.email.trim().to_lowercase();
    let invalid = || AppError::Unauthorized("Invalid credentials".into());

    let Some(user) = User::find_by_email(&state.db, &email).await? else {
        warn!(%email, "login unknown email");
        return Err(invalid());
    };
    if !verify_password(&req.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(invalid());
    }

    info!(user_id = %user.id, "user logged in");
    issue_tokens(keys, user)
}

pub async fn refresh(state: &AppState, keys: &JwtKeys, token: &str) -> AppResult<AuthResponse> {
    let claims = keys.verify_refresh(token).map_err(|e| {
        warn!(error = %e, "refresh rejected");
        AppError::Unauthorized("Invalid or expired token".into())
    })?;
    let user = current_user(state, claims.sub).await?;
    issue_tokens(keys, user)
}

pub async fn current_user(state: &AppState, user_id: Uuid) -> AppResult<User> {
    User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(username: &str, email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    #[test]
    fn email_shape() {
        assert!(is_valid_email("ada@example.com"));
        assert!(!is_valid_email("ada@example"));
        assert!(!is_valid_email("ada example@x.io"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn registration_normalises_input() {
        let req = validate_registration(request("  ada ", " Ada@Example.COM ", "longenough")).unwrap();
        assert_eq!(req.username, "ada");
        assert_eq!(req.email, "ada@example.com");
    }

    #[test]
    fn registration_rejects_bad_fields() {
        for req in [
            request("ab", "ada@example.com", "longenough"),
            request(&"x".repeat(33), "ada@example.com", "longenough"),
            request("ada", "not-an-email", "longenough"),
            request("ada", "ada@example.com", "short"),
        ] {
            assert!(matches!(validate_registration(req), Err(AppError::Validation(_))));
        }
    }
}
