use lazy_static::lazy_static;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{LoginRequest, RegisterRequest},
        jwt::JwtKeys,
        password::{hash_password, verify_password},
    },
    error::{AppError, AppResult},
    users::{
        repo::UserStore,
        repo_types::{Role, User},
        services::{create_user, normalize_email},
    },
};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

lazy_static! {
    // Unknown emails are checked against this so both failure paths cost one argon2 run.
    static ref DUMMY_HASH: String = hash_password("no-such-account").unwrap_or_default();
}

/// Verifies `password` against the user's hash, or against a throwaway hash when
/// there is no such user.
fn password_matches(password: &str, user: Option<&User>) -> AppResult<bool> {
    match user {
        Some(user) => Ok(verify_password(password, &user.password_hash)?),
        None => {
            let _ = verify_password(password, &DUMMY_HASH);
            Ok(false)
        }
    }
}

/// Creates a `user`-role account and signs a token for it.
pub async fn register(
    store: &dyn UserStore,
    keys: &JwtKeys,
    payload: RegisterRequest,
) -> AppResult<(String, User)> {
    let user = create_user(store, payload, Role::User).await?;
    let token = keys.sign(&user)?;
    info!(user_id = %user.id, "user registered");
    Ok((token, user))
}

/// Checks credentials, stamps the login time and signs a token.
pub async fn login(
    store: &dyn UserStore,
    keys: &JwtKeys,
    payload: LoginRequest,
) -> AppResult<(String, User)> {
    let (Some(email), Some(password)) = (
        payload.email.filter(|e| !e.trim().is_empty()),
        payload.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(AppError::Validation(
            "Email and password are required".into(),
        ));
    };
    let email = normalize_email(&email);

    let found = store.find_by_email(&email).await?;
    let matches = password_matches(&password, found.as_ref())?;
    let user = match found {
        Some(user) if matches => user,
        Some(user) => {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.into()));
        }
        None => {
            warn!(email = %email, "login unknown email");
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.into()));
        }
    };

    // Only reported after the password matched, so it reveals nothing to a guesser.
    if !user.is_active {
        warn!(user_id = %user.id, "login to inactive account");
        return Err(AppError::Forbidden("User account is inactive".into()));
    }

    let user = store
        .record_login(user.id)
        .await?
        .ok_or_else(|| AppError::Unauthorized(INVALID_CREDENTIALS.into()))?;
    let token = keys.sign(&user)?;
    info!(user_id = %user.id, "user logged in");
    Ok((token, user))
}

pub async fn profile(store: &dyn UserStore, user_id: Uuid) -> AppResult<User> {
    store
        .find_by_id(user_id)
        .await?
        .ok_or_else(AppError::user_not_found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::users::{
        dto::NewUserFields,
        memory::MemoryUserStore,
        repo_types::{Gender, UserChanges},
    };

    fn keys() -> JwtKeys {
        JwtKeys::from(&test_config().jwt)
    }

    fn registration(email: &str, password: &str) -> RegisterRequest {
        NewUserFields {
            name: Some("Alan".into()),
            email: Some(email.into()),
            password: Some(password.into()),
            age: Some(41),
            gender: Some(Gender::Male),
        }
    }

    fn credentials(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: Some(email.into()),
            password: Some(password.into()),
        }
    }

    #[tokio::test]
    async fn register_issues_token_for_default_role() {
        let store = MemoryUserStore::new();
        let keys = keys();
        let (token, user) = register(&store, &keys, registration("a@x.com", "pw-123456"))
            .await
            .unwrap();
        assert_eq!(user.role, Role::User);
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.email, "a@x.com");
        assert_eq!(claims.role, Role::User);
    }

    #[tokio::test]
    async fn register_twice_conflicts() {
        let store = MemoryUserStore::new();
        register(&store, &keys(), registration("a@x.com", "pw")).await.unwrap();
        let err = register(&store, &keys(), registration("A@x.COM", "other"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref m) if m == "Email already registered"));
    }

    #[tokio::test]
    async fn login_requires_both_fields() {
        let store = MemoryUserStore::new();
        let err = login(&store, &keys(), LoginRequest { email: Some("a@x.com".into()), password: None })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == "Email and password are required"));
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_look_identical() {
        let store = MemoryUserStore::new();
        register(&store, &keys(), registration("a@x.com", "right")).await.unwrap();

        let unknown = login(&store, &keys(), credentials("b@x.com", "right")).await.unwrap_err();
        let wrong = login(&store, &keys(), credentials("a@x.com", "wrong")).await.unwrap_err();
        assert_eq!(unknown.status(), wrong.status());
        assert_eq!(unknown.to_string(), INVALID_CREDENTIALS);
        assert_eq!(wrong.to_string(), INVALID_CREDENTIALS);
    }

    #[test]
    fn unknown_user_still_pays_for_a_full_hash_check() {
        let reference = hash_password("whatever").unwrap();
        let dummy = argon2::PasswordHash::new(&DUMMY_HASH).expect("dummy hash parses");
        let real = argon2::PasswordHash::new(&reference).unwrap();
        assert_eq!(dummy.algorithm, real.algorithm);
        assert_eq!(dummy.params, real.params);
        assert!(!verify_password("no-such-account-guess", &DUMMY_HASH).unwrap());
        assert!(!password_matches("no-such-account", None).unwrap());
    }

    #[tokio::test]
    async fn inactive_account_is_forbidden_only_with_correct_password() {
        let store = MemoryUserStore::new();
        let (_, user) = register(&store, &keys(), registration("a@x.com", "right")).await.unwrap();
        store
            .update(user.id, UserChanges { is_active: Some(false), ..Default::default() })
            .await
            .unwrap();

        let err = login(&store, &keys(), credentials("a@x.com", "wrong")).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let err = login(&store, &keys(), credentials("a@x.com", "right")).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(ref m) if m == "User account is inactive"));
    }

    #[tokio::test]
    async fn login_stamps_last_login_and_accepts_any_email_case() {
        let store = MemoryUserStore::new();
        let (_, registered) = register(&store, &keys(), registration("a@x.com", "right")).await.unwrap();
        assert!(registered.last_login.is_none());

        let (token, user) = login(&store, &keys(), credentials(" A@X.com", "right")).await.unwrap();
        assert!(user.last_login.is_some());
        assert_eq!(keys().verify(&token).unwrap().sub, registered.id);
    }

    #[tokio::test]
    async fn profile_of_deleted_user_is_not_found() {
        let store = MemoryUserStore::new();
        let (_, user) = register(&store, &keys(), registration("a@x.com", "pw")).await.unwrap();
        assert_eq!(profile(&store, user.id).await.unwrap().id, user.id);
        store.delete(user.id).await.unwrap();
        assert!(matches!(profile(&store, user.id).await, Err(AppError::NotFound(_))));
    }
}
