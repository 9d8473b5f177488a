mod common;

use chrono::Duration;
use common::{PASSWORD, admin, as_actor, new_user, record, setup, user};
use dashboard::ApiError;
use dashboard::auth::{self, UserRole};
use dashboard::catalog::RecordKind;
use dashboard::listing::ListFilter;
use dashboard::storage::{self, AvatarStore};
use dashboard::users::{self, NewUser, UserUpdate};
use entity::{identity, profile, session, user_certificate};
use sea_orm::{EntityTrait, PaginatorTrait};

#[tokio::test]
async fn role_specific_fields_follow_the_role() {
    let db = setup().await;
    let gm = users::create_user(
        &db,
        &admin(),
        NewUser {
            department: Some("Enterprise".into()),
            gm_id: Some(uuid::Uuid::new_v4()),
            ..new_user("gm@example.com", UserRole::Gm)
        },
    )
    .await
    .unwrap();
    assert_eq!(gm.department.as_deref(), Some("Enterprise"));
    assert_eq!(gm.gm_id, None);

    let sales = users::create_user(
        &db,
        &admin(),
        NewUser {
            gm_id: Some(gm.id),
            department: Some("Should be dropped".into()),
            ..new_user("sales@example.com", UserRole::Sales)
        },
    )
    .await
    .unwrap();
    assert_eq!(sales.gm_id, Some(gm.id));
    assert_eq!(sales.manager.as_ref().map(|m| m.id), Some(gm.id));

    let stored = profile::Entity::find_by_id(sales.id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.department, None);
    assert_eq!(stored.role, profile::Role::Sales);
}

#[tokio::test]
async fn sales_manager_must_be_a_gm() {
    let db = setup().await;
    let engineer = user(&db, "eng@example.com", UserRole::Engineer).await;
    let err = users::create_user(
        &db,
        &admin(),
        NewUser {
            gm_id: Some(engineer.id),
            ..new_user("sales@example.com", UserRole::Sales)
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::InvalidInput(_)), "{err:?}");
    // nothing half-written
    assert_eq!(identity::Entity::find().count(&db).await.unwrap(), 1);
}

#[tokio::test]
async fn duplicate_email_is_a_conflict() {
    let db = setup().await;
    user(&db, "dup@example.com", UserRole::Presales).await;
    let err = users::create_user(&db, &admin(), new_user(" DUP@example.com ", UserRole::Sales))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)), "{err:?}");
    assert_eq!(err.status().as_u16(), 409);
}

#[tokio::test]
async fn only_admins_manage_users() {
    let db = setup().await;
    let gm = user(&db, "gm@example.com", UserRole::Gm).await;
    let err = users::create_user(&db, &as_actor(&gm), new_user("x@example.com", UserRole::Sales))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));

    // GM may read the users page, Sales may not
    let page = users::list_users(&db, &as_actor(&gm), &ListFilter::default())
        .await
        .unwrap();
    assert_eq!(page.summary.total, 1);
    let sales = user(&db, "sales@example.com", UserRole::Sales).await;
    let err = users::list_users(&db, &as_actor(&sales), &ListFilter::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));
}

#[tokio::test]
async fn update_rewrites_certificates_and_role_profile() {
    let db = setup().await;
    let c1 = record(&db, RecordKind::Certificate, "CCNA", None).await;
    let c2 = record(&db, RecordKind::Certificate, "CCNP", None).await;
    let gm = user(&db, "gm@example.com", UserRole::Gm).await;
    let person = user(&db, "person@example.com", UserRole::Engineer).await;

    let updated = users::update_user(
        &db,
        &admin(),
        person.id,
        UserUpdate {
            full_name: "Person Promoted".into(),
            role: UserRole::Sales,
            gm_id: Some(gm.id),
            department: Some("ignored".into()),
            is_active: true,
            certificate_ids: vec![c1, c2, c1],
        },
    )
    .await
    .unwrap();
    assert_eq!(updated.role, UserRole::Sales);
    assert_eq!(updated.department, None);
    assert_eq!(updated.certificates.len(), 2);

    let updated = users::update_user(
        &db,
        &admin(),
        person.id,
        UserUpdate {
            full_name: "Person Promoted".into(),
            role: UserRole::Gm,
            gm_id: Some(gm.id),
            department: Some("Public Sector".into()),
            is_active: false,
            certificate_ids: vec![c2],
        },
    )
    .await
    .unwrap();
    assert_eq!(updated.gm_id, None);
    assert_eq!(updated.department.as_deref(), Some("Public Sector"));
    assert!(!updated.is_active);
    assert_eq!(
        updated.certificates.iter().map(|c| c.id).collect::<Vec<_>>(),
        vec![c2]
    );
}

#[tokio::test]
async fn deleting_a_user_cascades_sessions_and_links() {
    let db = setup().await;
    let cert = record(&db, RecordKind::Certificate, "CCNA", None).await;
    let person = users::create_user(
        &db,
        &admin(),
        NewUser {
            certificate_ids: Some(vec![cert]),
            ..new_user("leaver@example.com", UserRole::Engineer)
        },
    )
    .await
    .unwrap();
    auth::login(&db, "leaver@example.com", PASSWORD, Duration::hours(1))
        .await
        .unwrap();

    users::delete_user(&db, &admin(), person.id).await.unwrap();

    assert_eq!(profile::Entity::find().count(&db).await.unwrap(), 0);
    assert_eq!(session::Entity::find().count(&db).await.unwrap(), 0);
    assert_eq!(user_certificate::Entity::find().count(&db).await.unwrap(), 0);
}

#[tokio::test]
async fn admins_cannot_delete_themselves() {
    let db = setup().await;
    let boss = user(&db, "boss@example.com", UserRole::Admin).await;
    let err = users::delete_user(&db, &as_actor(&boss), boss.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidInput(_)));
}

#[tokio::test]
async fn login_session_and_password_change() {
    let db = setup().await;
    let person = user(&db, "Someone@Example.com", UserRole::Presales).await;
    assert_eq!(person.email, "someone@example.com");

    let err = auth::login(&db, "someone@example.com", "wrong password", Duration::hours(1))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidInput(_)));

    let (first, caller) = auth::login(&db, "SOMEONE@example.com", PASSWORD, Duration::hours(1))
        .await
        .unwrap();
    let (second, _) = auth::login(&db, "someone@example.com", PASSWORD, Duration::hours(1))
        .await
        .unwrap();
    let resolved = auth::resolve_session(&db, first.id).await.unwrap();
    assert_eq!(resolved.user_id, person.id);
    assert_eq!(resolved.role, UserRole::Presales);

    auth::change_password(&db, &caller, PASSWORD, "a brand new secret")
        .await
        .unwrap();
    assert!(auth::resolve_session(&db, first.id).await.is_ok());
    assert!(matches!(
        auth::resolve_session(&db, second.id).await,
        Err(ApiError::Unauthenticated)
    ));
    assert!(
        auth::login(&db, "someone@example.com", "a brand new secret", Duration::hours(1))
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn expired_sessions_are_rejected_and_removed() {
    let db = setup().await;
    user(&db, "late@example.com", UserRole::Engineer).await;
    let (session, _) = auth::login(&db, "late@example.com", PASSWORD, Duration::seconds(-1))
        .await
        .unwrap();
    assert!(matches!(
        auth::resolve_session(&db, session.id).await,
        Err(ApiError::Unauthenticated)
    ));
    assert_eq!(session::Entity::find().count(&db).await.unwrap(), 0);
}

#[tokio::test]
async fn seeding_twice_skips_existing_accounts() {
    use dashboard::seed::{SEED_ACCOUNTS, SeedStatus, seed_accounts};

    let db = setup().await;
    let first = seed_accounts(&db, PASSWORD).await.unwrap();
    assert!(first.iter().all(|o| o.status == SeedStatus::Created));
    let second = seed_accounts(&db, PASSWORD).await.unwrap();
    assert!(second.iter().all(|o| o.status == SeedStatus::Skipped));
    assert_eq!(
        profile::Entity::find().count(&db).await.unwrap(),
        SEED_ACCOUNTS.len() as u64
    );

    let sales = profile::Entity::find()
        .all(&db)
        .await
        .unwrap()
        .into_iter()
        .find(|p| p.role == profile::Role::Sales)
        .unwrap();
    assert!(sales.gm_id.is_some());
}

#[tokio::test]
async fn avatars_replace_and_remove_their_objects() {
    let db = setup().await;
    let bucket = tempfile::tempdir().unwrap();
    let store = AvatarStore::new(bucket.path(), "http://localhost:8080/storage");
    let owner = user(&db, "owner@example.com", UserRole::Sales).await;
    let other = user(&db, "other@example.com", UserRole::Sales).await;

    let first = storage::upload_avatar(
        &db,
        &store,
        &as_actor(&owner),
        owner.id,
        "image/png",
        b"one",
    )
    .await
    .unwrap();
    let first_url = first.avatar_url.clone().unwrap();
    let first_path = bucket.path().join(store.key_of(&first_url).unwrap());
    assert_eq!(std::fs::read(&first_path).unwrap(), b"one");

    // an admin may replace it; the old object goes away
    let second = storage::upload_avatar(&db, &store, &admin(), owner.id, "image/webp", b"two")
        .await
        .unwrap();
    let second_url = second.avatar_url.clone().unwrap();
    assert!(second_url.ends_with(".webp"));
    assert!(!first_path.exists());

    let err = storage::upload_avatar(&db, &store, &as_actor(&other), owner.id, "image/png", b"x")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));
    let err = storage::upload_avatar(&db, &store, &as_actor(&owner), owner.id, "text/plain", b"x")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidInput(_)));

    let cleared = storage::remove_avatar(&db, &store, &as_actor(&owner), owner.id)
        .await
        .unwrap();
    assert_eq!(cleared.avatar_url, None);
    assert!(!bucket.path().join(store.key_of(&second_url).unwrap()).exists());
}
