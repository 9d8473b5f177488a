#![allow(dead_code)]

use std::collections::BTreeMap;

use dashboard::auth::{CurrentUser, UserRole};
use dashboard::catalog::{RecordDraft, RecordKind};
use dashboard::users::{self, NewUser, UserView};
use dashboard::records;
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use uuid::Uuid;

pub const PASSWORD: &str = "correct horse battery";

/// Fresh in-memory database with every migration applied.
pub async fn setup() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    db
}

pub fn actor(user_id: Uuid, role: UserRole) -> CurrentUser {
    CurrentUser {
        user_id,
        session_id: Uuid::new_v4(),
        email: format!("{user_id}@example.com"),
        full_name: "Test Actor".into(),
        role,
    }
}

pub fn admin() -> CurrentUser {
    actor(Uuid::new_v4(), UserRole::Admin)
}

pub fn as_actor(user: &UserView) -> CurrentUser {
    actor(user.id, user.role)
}

pub async fn record(
    db: &DatabaseConnection,
    kind: RecordKind,
    name: &str,
    parent_id: Option<Uuid>,
) -> Uuid {
    record_with(db, kind, name, parent_id, &[]).await
}

pub async fn record_with(
    db: &DatabaseConnection,
    kind: RecordKind,
    name: &str,
    parent_id: Option<Uuid>,
    associations: &[(&str, Vec<Uuid>)],
) -> Uuid {
    let draft = RecordDraft {
        name: name.into(),
        parent_id,
        associations: associations
            .iter()
            .map(|(name, ids)| (name.to_string(), ids.clone()))
            .collect::<BTreeMap<_, _>>(),
        ..RecordDraft::default()
    };
    records::save_record(db, kind, None, draft)
        .await
        .unwrap()
        .row
        .id
}

pub fn new_user(email: &str, role: UserRole) -> NewUser {
    NewUser {
        email: email.into(),
        password: PASSWORD.into(),
        full_name: email.split('@').next().unwrap_or(email).into(),
        role,
        gm_id: None,
        department: None,
        is_active: None,
        certificate_ids: None,
    }
}

pub async fn user(db: &DatabaseConnection, email: &str, role: UserRole) -> UserView {
    users::create_user(db, &admin(), new_user(email, role))
        .await
        .unwrap()
}
