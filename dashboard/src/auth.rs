//! Identities, sessions and the role model.

use argon2::Argon2;
use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
};
use async_graphql::Enum;
use chrono::{Duration, Utc};
use entity::{identity, profile, profile::Role, session};
use platform_api::{ApiError, ApiResult};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "bizdash_session";
pub const MIN_PASSWORD_LEN: usize = 8;

/// Role as it appears on the wire (GraphQL enum and JSON label).
#[derive(Enum, Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UserRole {
    #[serde(rename = "Admin", alias = "ADMIN")]
    Admin,
    #[serde(rename = "GM")]
    Gm,
    #[serde(rename = "Sales", alias = "SALES")]
    Sales,
    #[serde(rename = "Presales", alias = "PRESALES")]
    Presales,
    #[serde(rename = "Engineer", alias = "ENGINEER")]
    Engineer,
    #[serde(rename = "Project Manager", alias = "PROJECT_MANAGER")]
    ProjectManager,
}

impl UserRole {
    pub const ALL: [UserRole; 6] = [
        UserRole::Admin,
        UserRole::Gm,
        UserRole::Sales,
        UserRole::Presales,
        UserRole::Engineer,
        UserRole::ProjectManager,
    ];

    pub fn label(self) -> &'static str {
        match self {
            UserRole::Admin => "Admin",
            UserRole::Gm => "GM",
            UserRole::Sales => "Sales",
            UserRole::Presales => "Presales",
            UserRole::Engineer => "Engineer",
            UserRole::ProjectManager => "Project Manager",
        }
    }
}

impl From<Role> for UserRole {
    fn from(value: Role) -> Self {
        match value {
            Role::Admin => UserRole::Admin,
            Role::Gm => UserRole::Gm,
            Role::Sales => UserRole::Sales,
            Role::Presales => UserRole::Presales,
            Role::Engineer => UserRole::Engineer,
            Role::ProjectManager => UserRole::ProjectManager,
        }
    }
}

impl From<UserRole> for Role {
    fn from(value: UserRole) -> Self {
        match value {
            UserRole::Admin => Role::Admin,
            UserRole::Gm => Role::Gm,
            UserRole::Sales => Role::Sales,
            UserRole::Presales => Role::Presales,
            UserRole::Engineer => Role::Engineer,
            UserRole::ProjectManager => Role::ProjectManager,
        }
    }
}

/// Role together with the fields only that role carries. The flat
/// `gm_id`/`department` profile columns are written from this type only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoleProfile {
    Admin,
    Gm { department: Option<String> },
    Sales { gm_id: Option<Uuid> },
    Presales,
    Engineer,
    ProjectManager,
}

impl RoleProfile {
    /// Build from loosely shaped input, dropping fields the role does not own.
    pub fn from_parts(role: UserRole, gm_id: Option<Uuid>, department: Option<String>) -> Self {
        match role {
            UserRole::Admin => RoleProfile::Admin,
            UserRole::Gm => RoleProfile::Gm {
                department: department
                    .map(|d| d.trim().to_string())
                    .filter(|d| !d.is_empty()),
            },
            UserRole::Sales => RoleProfile::Sales { gm_id },
            UserRole::Presales => RoleProfile::Presales,
            UserRole::Engineer => RoleProfile::Engineer,
            UserRole::ProjectManager => RoleProfile::ProjectManager,
        }
    }

    pub fn of(model: &profile::Model) -> Self {
        Self::from_parts(model.role.into(), model.gm_id, model.department.clone())
    }

    pub fn role(&self) -> UserRole {
        match self {
            RoleProfile::Admin => UserRole::Admin,
            RoleProfile::Gm { .. } => UserRole::Gm,
            RoleProfile::Sales { .. } => UserRole::Sales,
            RoleProfile::Presales => UserRole::Presales,
            RoleProfile::Engineer => UserRole::Engineer,
            RoleProfile::ProjectManager => UserRole::ProjectManager,
        }
    }

    pub fn gm_id(&self) -> Option<Uuid> {
        match self {
            RoleProfile::Sales { gm_id } => *gm_id,
            _ => None,
        }
    }

    pub fn department(&self) -> Option<String> {
        match self {
            RoleProfile::Gm { department } => department.clone(),
            _ => None,
        }
    }
}

/// The signed-in caller, resolved from a session.
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: UserRole,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn require(&self, allowed: &[UserRole]) -> ApiResult<()> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(ApiError::forbidden("insufficient permissions"))
        }
    }

    pub fn require_admin(&self) -> ApiResult<()> {
        self.require(&[UserRole::Admin])
    }
}

pub fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| ApiError::internal(anyhow::anyhow!("hash error: {err}")))
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(err) => {
            warn!(error = %err, "stored password hash is malformed");
            false
        }
    }
}

pub fn normalize_email(value: &str) -> ApiResult<String> {
    let trimmed = value.trim().to_lowercase();
    match trimmed.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(trimmed),
        _ => Err(ApiError::invalid("invalid email address")),
    }
}

pub fn validate_password(value: &str) -> ApiResult<()> {
    if value.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::invalid(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

pub async fn open_session<C>(conn: &C, user_id: Uuid, ttl: Duration) -> ApiResult<session::Model>
where
    C: ConnectionTrait,
{
    let now = Utc::now();
    let expires_at: DateTimeWithTimeZone = (now + ttl).into();
    let model = session::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        created_at: Set(now.into()),
        expires_at: Set(expires_at),
    }
    .insert(conn)
    .await?;
    Ok(model)
}

/// Resolve a session id into the caller. Missing or expired sessions are
/// `Unauthenticated`; expired rows are removed on the way out.
#[instrument(skip(db))]
pub async fn resolve_session(db: &DatabaseConnection, session_id: Uuid) -> ApiResult<CurrentUser> {
    let session = session::Entity::find_by_id(session_id)
        .one(db)
        .await?
        .ok_or(ApiError::Unauthenticated)?;
    if session.expires_at.with_timezone(&Utc) <= Utc::now() {
        session::Entity::delete_by_id(session_id).exec(db).await?;
        return Err(ApiError::Unauthenticated);
    }
    let profile = profile::Entity::find_by_id(session.user_id)
        .one(db)
        .await?
        .ok_or(ApiError::Unauthenticated)?;
    if !profile.is_active {
        return Err(ApiError::forbidden("account disabled"));
    }
    Ok(CurrentUser {
        user_id: profile.id,
        session_id,
        email: profile.email,
        full_name: profile.full_name,
        role: profile.role.into(),
    })
}

pub async fn close_session(db: &DatabaseConnection, session_id: Uuid) -> ApiResult<()> {
    session::Entity::delete_by_id(session_id).exec(db).await?;
    Ok(())
}

#[instrument(skip(db, password))]
pub async fn login(
    db: &DatabaseConnection,
    email: &str,
    password: &str,
    ttl: Duration,
) -> ApiResult<(session::Model, CurrentUser)> {
    let email = normalize_email(email)?;
    let rejected = || ApiError::invalid("invalid email or password");
    let identity = identity::Entity::find()
        .filter(identity::Column::Email.eq(email.clone()))
        .one(db)
        .await?
        .ok_or_else(rejected)?;
    if !verify_password(&identity.password_hash, password) {
        return Err(rejected());
    }
    let profile = profile::Entity::find_by_id(identity.id)
        .one(db)
        .await?
        .ok_or_else(rejected)?;
    if !profile.is_active {
        return Err(ApiError::forbidden("account disabled"));
    }
    let session = open_session(db, identity.id, ttl).await?;
    info!(user_id = %identity.id, "session opened");
    let user = CurrentUser {
        user_id: profile.id,
        session_id: session.id,
        email: profile.email,
        full_name: profile.full_name,
        role: profile.role.into(),
    };
    Ok((session, user))
}

/// Replace the caller's password and revoke their other sessions.
#[instrument(skip(db, user, current, new), fields(user_id = %user.user_id))]
pub async fn change_password(
    db: &DatabaseConnection,
    user: &CurrentUser,
    current: &str,
    new: &str,
) -> ApiResult<()> {
    validate_password(new)?;
    let identity = identity::Entity::find_by_id(user.user_id)
        .one(db)
        .await?
        .ok_or_else(|| ApiError::not_found("user"))?;
    if !verify_password(&identity.password_hash, current) {
        return Err(ApiError::invalid("current password is incorrect"));
    }
    let hash = hash_password(new)?;
    let txn = db.begin().await?;
    let mut active: identity::ActiveModel = identity.into();
    active.password_hash = Set(hash);
    active.update(&txn).await?;
    session::Entity::delete_many()
        .filter(session::Column::UserId.eq(user.user_id))
        .filter(session::Column::Id.ne(user.session_id))
        .exec(&txn)
        .await?;
    txn.commit().await?;
    info!("password changed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_profile_drops_foreign_fields() {
        let gm = Uuid::new_v4();
        let sales = RoleProfile::from_parts(UserRole::Sales, Some(gm), Some("Retail".into()));
        assert_eq!(sales.gm_id(), Some(gm));
        assert_eq!(sales.department(), None);

        let head = RoleProfile::from_parts(UserRole::Gm, Some(gm), Some(" Retail ".into()));
        assert_eq!(head.gm_id(), None);
        assert_eq!(head.department().as_deref(), Some("Retail"));

        let admin = RoleProfile::from_parts(UserRole::Admin, Some(gm), Some("Retail".into()));
        assert_eq!(admin, RoleProfile::Admin);
    }

    #[test]
    fn roles_convert_both_ways() {
        for role in UserRole::ALL {
            let stored: Role = role.into();
            assert_eq!(UserRole::from(stored), role);
        }
    }

    #[test]
    fn role_labels_match_json_names() {
        let json = serde_json::to_string(&UserRole::ProjectManager).unwrap();
        assert_eq!(json, "\"Project Manager\"");
        let parsed: UserRole = serde_json::from_str("\"GM\"").unwrap();
        assert_eq!(parsed, UserRole::Gm);
        assert_eq!(UserRole::Gm.label(), "GM");
    }

    #[test]
    fn email_is_lowercased_and_checked() {
        assert_eq!(
            normalize_email("  Ada@Example.COM ").unwrap(),
            "ada@example.com"
        );
        assert!(normalize_email("nobody").is_err());
        assert!(normalize_email("@example.com").is_err());
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password(&hash, "correct horse"));
        assert!(!verify_password(&hash, "wrong horse"));
        assert!(!verify_password("not-a-phc-string", "anything"));
    }
}
