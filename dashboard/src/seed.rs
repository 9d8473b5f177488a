//! Fixed test accounts, one per role, for local environments.

use std::fmt;

use chrono::Utc;
use entity::{identity, profile};
use platform_api::ApiResult;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    QueryFilter, TransactionTrait,
};
use tracing::info;
use uuid::Uuid;

use crate::auth::{RoleProfile, UserRole, hash_password, validate_password};

pub struct SeedAccount {
    pub email: &'static str,
    pub full_name: &'static str,
    pub role: UserRole,
}

/// Created in order; the GM comes before the sales account that reports to it.
pub const SEED_ACCOUNTS: [SeedAccount; 6] = [
    SeedAccount {
        email: "admin@bizdash.test",
        full_name: "Alex Admin",
        role: UserRole::Admin,
    },
    SeedAccount {
        email: "gm@bizdash.test",
        full_name: "Grace Manager",
        role: UserRole::Gm,
    },
    SeedAccount {
        email: "sales@bizdash.test",
        full_name: "Sam Sales",
        role: UserRole::Sales,
    },
    SeedAccount {
        email: "presales@bizdash.test",
        full_name: "Priya Presales",
        role: UserRole::Presales,
    },
    SeedAccount {
        email: "engineer@bizdash.test",
        full_name: "Eli Engineer",
        role: UserRole::Engineer,
    },
    SeedAccount {
        email: "pm@bizdash.test",
        full_name: "Pat Projects",
        role: UserRole::ProjectManager,
    },
];

const SEED_DEPARTMENT: &str = "Enterprise";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeedStatus {
    Created,
    Skipped,
}

impl fmt::Display for SeedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SeedStatus::Created => "created",
            SeedStatus::Skipped => "exists",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedOutcome {
    pub email: String,
    pub role: UserRole,
    pub status: SeedStatus,
}

/// Create the accounts in [`SEED_ACCOUNTS`] that do not exist yet, all with
/// `password`. Existing emails are left untouched.
pub async fn seed_accounts(db: &DatabaseConnection, password: &str) -> ApiResult<Vec<SeedOutcome>> {
    validate_password(password)?;
    let password_hash = hash_password(password)?;
    let mut gm_id: Option<Uuid> = None;
    let mut outcomes = Vec::with_capacity(SEED_ACCOUNTS.len());

    for account in &SEED_ACCOUNTS {
        let existing = profile::Entity::find()
            .filter(profile::Column::Email.eq(account.email))
            .one(db)
            .await?;
        let (id, status) = match existing {
            Some(found) => (found.id, SeedStatus::Skipped),
            None => {
                let profile_kind = RoleProfile::from_parts(
                    account.role,
                    gm_id,
                    Some(SEED_DEPARTMENT.to_string()),
                );
                let id = insert_account(db, account, &profile_kind, &password_hash).await?;
                info!(email = account.email, role = account.role.label(), "seed account created");
                (id, SeedStatus::Created)
            }
        };
        if account.role == UserRole::Gm {
            gm_id = Some(id);
        }
        outcomes.push(SeedOutcome {
            email: account.email.to_string(),
            role: account.role,
            status,
        });
    }
    Ok(outcomes)
}

async fn insert_account(
    db: &DatabaseConnection,
    account: &SeedAccount,
    role: &RoleProfile,
    password_hash: &str,
) -> ApiResult<Uuid> {
    let now: DateTimeWithTimeZone = Utc::now().into();
    let id = Uuid::new_v4();
    let txn = db.begin().await?;
    identity::ActiveModel {
        id: Set(id),
        email: Set(account.email.to_string()),
        password_hash: Set(password_hash.to_string()),
        created_at: Set(now),
    }
    .insert(&txn)
    .await?;
    profile::ActiveModel {
        id: Set(id),
        email: Set(account.email.to_string()),
        full_name: Set(account.full_name.to_string()),
        role: Set(role.role().into()),
        gm_id: Set(role.gm_id()),
        department: Set(role.department()),
        is_active: Set(true),
        avatar_url: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;
    Ok(id)
}

/// Plain-text table of seed results for the CLI.
pub fn summary_table(outcomes: &[SeedOutcome]) -> String {
    let email_width = outcomes
        .iter()
        .map(|o| o.email.len())
        .chain(["email".len()])
        .max()
        .unwrap_or_default();
    let role_width = outcomes
        .iter()
        .map(|o| o.role.label().len())
        .chain(["role".len()])
        .max()
        .unwrap_or_default();
    let mut out = format!("{:<email_width$}  {:<role_width$}  status\n", "email", "role");
    out.push_str(&format!(
        "{}  {}  ------\n",
        "-".repeat(email_width),
        "-".repeat(role_width)
    ));
    for outcome in outcomes {
        out.push_str(&format!(
            "{:<email_width$}  {:<role_width$}  {}\n",
            outcome.email,
            outcome.role.label(),
            outcome.status
        ));
    }
    out
}
