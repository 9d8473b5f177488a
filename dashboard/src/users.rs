//! User administration: admin-only account creation, profile edits,
//! deletion and the users page.

use std::collections::HashMap;

use async_graphql::{InputObject, SimpleObject};
use chrono::Utc;
use entity::{identity, profile, profile::Role};
use platform_api::{ApiError, ApiResult};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::{
    CurrentUser, RoleProfile, UserRole, hash_password, normalize_email, validate_password,
};
use crate::catalog::{LinkKind, RecordKind, required_text};
use crate::links::{dedupe, load_ids, sync_ids};
use crate::listing::{self, ListFilter, Listable};
use crate::records::{RefItem, ensure_exist, names_by_id};

/// Compact reference to a person, used wherever a user is shown next to
/// something else.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, SimpleObject)]
pub struct PersonRef {
    pub id: Uuid,
    pub full_name: String,
    pub role: UserRole,
    pub avatar_url: Option<String>,
}

impl From<&profile::Model> for PersonRef {
    fn from(model: &profile::Model) -> Self {
        Self {
            id: model.id,
            full_name: model.full_name.clone(),
            role: model.role.into(),
            avatar_url: model.avatar_url.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize, SimpleObject)]
#[graphql(name = "User")]
pub struct UserView {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: UserRole,
    pub gm_id: Option<Uuid>,
    pub department: Option<String>,
    pub is_active: bool,
    pub avatar_url: Option<String>,
    pub manager: Option<PersonRef>,
    pub certificates: Vec<RefItem>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

impl Listable for UserView {
    fn id(&self) -> Uuid {
        self.id
    }

    fn sort_name(&self) -> &str {
        &self.full_name
    }

    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.full_name.as_str(), self.email.as_str(), self.role.label()];
        fields.extend(self.department.as_deref());
        fields.extend(self.manager.as_ref().map(|m| m.full_name.as_str()));
        fields
    }

    fn created_at(&self) -> DateTimeWithTimeZone {
        self.created_at
    }

    fn is_active(&self) -> bool {
        self.is_active
    }

    fn role(&self) -> Option<UserRole> {
        Some(self.role)
    }
}

#[derive(Clone, Debug, SimpleObject)]
pub struct RoleCount {
    pub role: UserRole,
    pub count: u64,
}

#[derive(Clone, Debug, SimpleObject)]
pub struct UserSummary {
    pub total: u64,
    pub active: u64,
    pub per_role: Vec<RoleCount>,
}

#[derive(Clone, Debug, SimpleObject)]
pub struct UserPage {
    pub items: Vec<UserView>,
    pub summary: UserSummary,
}

/// Body of the admin create-user endpoint.
#[derive(Clone, Debug, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub role: UserRole,
    #[serde(default)]
    pub gm_id: Option<Uuid>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub certificate_ids: Option<Vec<Uuid>>,
}

/// Full state of the user edit dialog.
#[derive(Clone, Debug, InputObject)]
pub struct UserUpdate {
    pub full_name: String,
    pub role: UserRole,
    pub gm_id: Option<Uuid>,
    pub department: Option<String>,
    pub is_active: bool,
    pub certificate_ids: Vec<Uuid>,
}

/// A Sales user's GM must be an existing GM other than the user.
async fn ensure_manager<C: ConnectionTrait>(
    conn: &C,
    role: &RoleProfile,
    user_id: Option<Uuid>,
) -> ApiResult<()> {
    let Some(gm_id) = role.gm_id() else {
        return Ok(());
    };
    if Some(gm_id) == user_id {
        return Err(ApiError::invalid("a user cannot report to themselves"));
    }
    let manager = profile::Entity::find_by_id(gm_id).one(conn).await?;
    match manager {
        Some(m) if m.role == Role::Gm => Ok(()),
        Some(_) => Err(ApiError::invalid("gm_id must reference a GM")),
        None => Err(ApiError::invalid("gm_id references an unknown user")),
    }
}

/// Attach manager and certificates to profiles with a fixed number of queries.
pub async fn build_user_views<C: ConnectionTrait>(
    conn: &C,
    profiles: Vec<profile::Model>,
) -> ApiResult<Vec<UserView>> {
    let ids: Vec<Uuid> = profiles.iter().map(|p| p.id).collect();
    let manager_ids = dedupe(profiles.iter().filter_map(|p| p.gm_id));
    let managers = load_people(conn, manager_ids).await?;
    let certificate_links = load_ids(conn, LinkKind::UserCertificates, &ids).await?;
    let certificate_names = names_by_id(
        conn,
        RecordKind::Certificate,
        certificate_links.values().flatten().copied().collect(),
    )
    .await?;

    Ok(profiles
        .into_iter()
        .map(|model| {
            let mut certificates: Vec<RefItem> = certificate_links
                .get(&model.id)
                .into_iter()
                .flatten()
                .filter_map(|id| {
                    certificate_names.get(id).map(|name| RefItem {
                        id: *id,
                        name: name.clone(),
                    })
                })
                .collect();
            certificates.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
            UserView {
                manager: model.gm_id.and_then(|id| managers.get(&id).cloned()),
                certificates,
                id: model.id,
                email: model.email,
                full_name: model.full_name,
                role: model.role.into(),
                gm_id: model.gm_id,
                department: model.department,
                is_active: model.is_active,
                avatar_url: model.avatar_url,
                created_at: model.created_at,
                updated_at: model.updated_at,
            }
        })
        .collect())
}

/// Profiles by id as [`PersonRef`]s.
pub async fn load_people<C: ConnectionTrait>(
    conn: &C,
    ids: Vec<Uuid>,
) -> ApiResult<HashMap<Uuid, PersonRef>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = profile::Entity::find()
        .filter(profile::Column::Id.is_in(ids))
        .all(conn)
        .await?;
    Ok(rows.iter().map(|p| (p.id, PersonRef::from(p))).collect())
}

/// Active people holding `role`, plus anyone in `keep`.
pub async fn people_options<C: ConnectionTrait>(
    conn: &C,
    role: Role,
    keep: Vec<Uuid>,
) -> ApiResult<Vec<PersonRef>> {
    let rows = profile::Entity::find()
        .filter(profile::Column::Role.eq(role))
        .filter(
            Condition::any()
                .add(profile::Column::IsActive.eq(true))
                .add(profile::Column::Id.is_in(keep)),
        )
        .order_by_asc(profile::Column::FullName)
        .all(conn)
        .await?;
    Ok(rows.iter().map(PersonRef::from).collect())
}

pub async fn load_user_view<C: ConnectionTrait>(conn: &C, id: Uuid) -> ApiResult<UserView> {
    let model = profile::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| ApiError::not_found("user"))?;
    build_user_views(conn, vec![model])
        .await?
        .pop()
        .ok_or_else(|| ApiError::not_found("user"))
}

pub async fn me(db: &DatabaseConnection, user: &CurrentUser) -> ApiResult<UserView> {
    load_user_view(db, user.user_id).await
}

/// Create identity, profile and certificate links in one transaction.
/// Role-specific fields not owned by the chosen role are dropped.
#[instrument(skip(db, caller, input), fields(caller = %caller.user_id))]
pub async fn create_user(
    db: &DatabaseConnection,
    caller: &CurrentUser,
    input: NewUser,
) -> ApiResult<UserView> {
    caller.require_admin()?;
    let email = normalize_email(&input.email)?;
    validate_password(&input.password)?;
    let full_name = required_text("full_name", &input.full_name)?;
    let role = RoleProfile::from_parts(input.role, input.gm_id, input.department);
    let certificates = dedupe(input.certificate_ids.unwrap_or_default());
    let password_hash = hash_password(&input.password)?;
    let now: DateTimeWithTimeZone = Utc::now().into();

    let txn = db.begin().await?;
    let taken = identity::Entity::find()
        .filter(identity::Column::Email.eq(email.clone()))
        .count(&txn)
        .await?;
    if taken > 0 {
        return Err(ApiError::Conflict("email already registered".into()));
    }
    ensure_manager(&txn, &role, None).await?;
    ensure_exist(&txn, RecordKind::Certificate, &certificates).await?;

    let id = Uuid::new_v4();
    identity::ActiveModel {
        id: Set(id),
        email: Set(email.clone()),
        password_hash: Set(password_hash),
        created_at: Set(now),
    }
    .insert(&txn)
    .await?;
    profile::ActiveModel {
        id: Set(id),
        email: Set(email),
        full_name: Set(full_name),
        role: Set(role.role().into()),
        gm_id: Set(role.gm_id()),
        department: Set(role.department()),
        is_active: Set(input.is_active.unwrap_or(true)),
        avatar_url: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&txn)
    .await?;
    sync_ids(&txn, LinkKind::UserCertificates, id, &certificates).await?;
    let view = load_user_view(&txn, id).await?;
    txn.commit().await?;

    info!(user_id = %id, role = role.role().label(), "user created");
    Ok(view)
}

#[instrument(skip(db, caller, input), fields(caller = %caller.user_id))]
pub async fn update_user(
    db: &DatabaseConnection,
    caller: &CurrentUser,
    id: Uuid,
    input: UserUpdate,
) -> ApiResult<UserView> {
    caller.require_admin()?;
    let full_name = required_text("full_name", &input.full_name)?;
    let role = RoleProfile::from_parts(input.role, input.gm_id, input.department);
    let certificates = dedupe(input.certificate_ids);

    let txn = db.begin().await?;
    let existing = profile::Entity::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or_else(|| ApiError::not_found("user"))?;
    ensure_manager(&txn, &role, Some(id)).await?;
    ensure_exist(&txn, RecordKind::Certificate, &certificates).await?;

    let mut active: profile::ActiveModel = existing.into();
    active.full_name = Set(full_name);
    active.role = Set(role.role().into());
    active.gm_id = Set(role.gm_id());
    active.department = Set(role.department());
    active.is_active = Set(input.is_active);
    active.updated_at = Set(Utc::now().into());
    active.update(&txn).await?;
    sync_ids(&txn, LinkKind::UserCertificates, id, &certificates).await?;
    let view = load_user_view(&txn, id).await?;
    txn.commit().await?;

    info!(user_id = %id, "user updated");
    Ok(view)
}

/// Remove the identity; profile, sessions and links cascade.
#[instrument(skip(db, caller), fields(caller = %caller.user_id))]
pub async fn delete_user(db: &DatabaseConnection, caller: &CurrentUser, id: Uuid) -> ApiResult<()> {
    caller.require_admin()?;
    if caller.user_id == id {
        return Err(ApiError::invalid("you cannot delete your own account"));
    }
    let result = identity::Entity::delete_by_id(id).exec(db).await?;
    if result.rows_affected == 0 {
        return Err(ApiError::not_found("user"));
    }
    info!(user_id = %id, "user deleted");
    Ok(())
}

#[instrument(skip(db, caller, filter), fields(caller = %caller.user_id))]
pub async fn list_users(
    db: &DatabaseConnection,
    caller: &CurrentUser,
    filter: &ListFilter,
) -> ApiResult<UserPage> {
    caller.require(&[UserRole::Admin, UserRole::Gm])?;
    let profiles = profile::Entity::find()
        .order_by_asc(profile::Column::FullName)
        .all(db)
        .await?;
    let views = build_user_views(db, profiles).await?;

    let total = views.len() as u64;
    let active = views.iter().filter(|v| v.is_active).count() as u64;
    let per_role = UserRole::ALL
        .iter()
        .map(|role| RoleCount {
            role: *role,
            count: views.iter().filter(|v| v.role == *role).count() as u64,
        })
        .collect();

    Ok(UserPage {
        items: listing::apply(views, filter),
        summary: UserSummary {
            total,
            active,
            per_role,
        },
    })
}

/// Point the profile at a new avatar URL, returning the previous one.
pub async fn replace_avatar_url(
    db: &DatabaseConnection,
    id: Uuid,
    url: Option<String>,
) -> ApiResult<(Option<String>, UserView)> {
    let existing = profile::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| ApiError::not_found("user"))?;
    let previous = existing.avatar_url.clone();
    let mut active: profile::ActiveModel = existing.into();
    active.avatar_url = Set(url);
    active.updated_at = Set(Utc::now().into());
    active.update(db).await?;
    Ok((previous, load_user_view(db, id).await?))
}
