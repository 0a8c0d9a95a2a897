use std::marker::PhantomData;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use tracing::warn;

use super::{claims::Identity, jwt::JwtKeys};
use crate::{error::AppError, users::repo_types::Role};

/// Resolves the `Authorization: Bearer <token>` header to a verified identity.
pub fn authenticate(headers: &HeaderMap, keys: &JwtKeys) -> Result<Identity, AppError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("No token provided. Please login first.".into()))?;

    let claims = keys.verify(token).map_err(|e| {
        warn!(error = %e, "invalid or expired token");
        AppError::Unauthorized("Invalid or expired token".into())
    })?;

    Ok(claims.into())
}

/// A fixed set of roles allowed past a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RolePolicy {
    allowed: &'static [Role],
}

impl RolePolicy {
    pub const ADMIN: RolePolicy = RolePolicy::new(&[Role::Admin]);

    pub const fn new(allowed: &'static [Role]) -> Self {
        Self { allowed }
    }

    pub fn allows(&self, role: Role) -> bool {
        self.allowed.contains(&role)
    }

    pub fn evaluate<'a>(&self, identity: Option<&'a Identity>) -> Result<&'a Identity, AppError> {
        let identity =
            identity.ok_or_else(|| AppError::Unauthorized("Authentication required".into()))?;
        if !self.allows(identity.role) {
            let required = self
                .allowed
                .iter()
                .map(Role::as_str)
                .collect::<Vec<_>>()
                .join(" or ");
            warn!(user_id = %identity.id, role = %identity.role, "access denied");
            return Err(AppError::Forbidden(format!(
                "Access denied. Required role: {required}"
            )));
        }
        Ok(identity)
    }
}

/// Type-level selector for the policy an [`Authorized`] extractor enforces.
pub trait Policy {
    const POLICY: RolePolicy;
}

pub struct AdminOnly;

impl Policy for AdminOnly {
    const POLICY: RolePolicy = RolePolicy::ADMIN;
}

/// Any caller holding a valid token.
pub struct AuthUser(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        authenticate(&parts.headers, &keys).map(AuthUser)
    }
}

/// A caller holding a valid token whose role satisfies `P`.
pub struct Authorized<P> {
    pub identity: Identity,
    _policy: PhantomData<P>,
}

#[async_trait]
impl<S, P> FromRequestParts<S> for Authorized<P>
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
    P: Policy + Send,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthUser(identity) = AuthUser::from_request_parts(parts, state).await?;
        P::POLICY.evaluate(Some(&identity))?;
        Ok(Self {
            identity,
            _policy: PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::users::repo_types::{Gender, User};
    use axum::http::HeaderValue;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn keys() -> JwtKeys {
        JwtKeys::from(&test_config().jwt)
    }

    fn token_for(role: Role) -> (Uuid, String) {
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            name: "Linus".into(),
            email: "linus@example.com".into(),
            password_hash: "hash".into(),
            age: 30,
            gender: Gender::Male,
            role,
            is_active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        };
        (user.id, keys().sign(&user).unwrap())
    }

    fn headers(value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        h
    }

    fn message(err: AppError) -> String {
        err.to_string()
    }

    #[test]
    fn missing_or_non_bearer_header_means_no_token() {
        let expected = "No token provided. Please login first.";
        assert_eq!(message(authenticate(&HeaderMap::new(), &keys()).unwrap_err()), expected);
        assert_eq!(message(authenticate(&headers("Basic abc"), &keys()).unwrap_err()), expected);
        assert_eq!(message(authenticate(&headers("Bearer "), &keys()).unwrap_err()), expected);
    }

    #[test]
    fn bad_token_is_invalid_or_expired() {
        let err = authenticate(&headers("Bearer garbage.token.value"), &keys()).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(ref m) if m == "Invalid or expired token"));
    }

    #[test]
    fn valid_token_yields_identity() {
        let (id, token) = token_for(Role::Moderator);
        let identity = authenticate(&headers(&format!("Bearer {token}")), &keys()).unwrap();
        assert_eq!(identity.id, id);
        assert_eq!(identity.email, "linus@example.com");
        assert_eq!(identity.role, Role::Moderator);
    }

    #[test]
    fn policy_requires_identity() {
        let err = RolePolicy::ADMIN.evaluate(None).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(ref m) if m == "Authentication required"));
    }

    #[test]
    fn policy_rejects_roles_outside_the_set() {
        let identity = Identity {
            id: Uuid::new_v4(),
            email: "u@example.com".into(),
            role: Role::User,
        };
        let err = RolePolicy::ADMIN.evaluate(Some(&identity)).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(ref m) if m == "Access denied. Required role: admin"));

        let staff = RolePolicy::new(&[Role::Admin, Role::Moderator]);
        let err = staff.evaluate(Some(&identity)).unwrap_err();
        assert_eq!(message(err), "Access denied. Required role: admin or moderator");
    }

    #[test]
    fn policy_admits_allowed_roles() {
        let identity = Identity {
            id: Uuid::new_v4(),
            email: "a@example.com".into(),
            role: Role::Admin,
        };
        assert_eq!(RolePolicy::ADMIN.evaluate(Some(&identity)).unwrap(), &identity);
        assert!(AdminOnly::POLICY.allows(Role::Admin));
        assert!(!AdminOnly::POLICY.allows(Role::Moderator));
    }
}
