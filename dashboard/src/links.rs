//! Association sets stored in join tables.
//!
//! Editing an association set computes the difference between what is stored
//! and what was submitted, then deletes and inserts only that difference. The
//! caller runs it inside the same transaction as the owning row's write.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use async_graphql::{InputObject, SimpleObject};
use entity::{
    brand_partnership, distributor_product, product_certificate, project_engineer,
    project_presales, project_product, user_certificate,
};
use platform_api::{ApiError, ApiResult};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait, EntityTrait,
    IntoActiveModel, QueryFilter,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::LinkKind;

/// Outcome of comparing a stored association set with a submitted one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkDiff<T> {
    pub added: Vec<T>,
    pub removed: Vec<T>,
}

impl<T> LinkDiff<T> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Drop repeated items, keeping the first occurrence of each.
pub fn dedupe<T: Clone + Eq + Hash>(items: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

pub fn diff<T: Clone + Eq + Hash>(existing: &[T], desired: &[T]) -> LinkDiff<T> {
    let existing = dedupe(existing.iter().cloned());
    let desired = dedupe(desired.iter().cloned());
    let stored: HashSet<&T> = existing.iter().collect();
    let wanted: HashSet<&T> = desired.iter().collect();
    LinkDiff {
        added: desired
            .iter()
            .filter(|item| !stored.contains(item))
            .cloned()
            .collect(),
        removed: existing
            .iter()
            .filter(|item| !wanted.contains(item))
            .cloned()
            .collect(),
    }
}

/// A join table keyed by an owner id.
pub trait LinkTable: EntityTrait {
    type Active: ActiveModelTrait<Entity = Self> + Send + Sync;
    type Target: Clone + Eq + Hash + Send + Sync;

    fn owner_column() -> Self::Column;
    fn owner(model: &Self::Model) -> Uuid;
    fn target(model: &Self::Model) -> Self::Target;
    fn link(owner: Uuid, target: &Self::Target) -> Self::Active;
    /// Condition selecting the row for `target` under a fixed owner.
    fn matches(target: &Self::Target) -> Condition;
}

pub async fn load_targets<L, C>(conn: &C, owner: Uuid) -> ApiResult<Vec<L::Target>>
where
    L: LinkTable,
    C: ConnectionTrait,
{
    let rows = L::find()
        .filter(L::owner_column().eq(owner))
        .all(conn)
        .await?;
    Ok(rows.iter().map(L::target).collect())
}

/// Batch-load association sets for many owners in one query.
pub async fn load_for_owners<L, C>(
    conn: &C,
    owners: &[Uuid],
) -> ApiResult<HashMap<Uuid, Vec<L::Target>>>
where
    L: LinkTable,
    C: ConnectionTrait,
{
    if owners.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = L::find()
        .filter(L::owner_column().is_in(owners.to_vec()))
        .all(conn)
        .await?;
    let mut map: HashMap<Uuid, Vec<L::Target>> = HashMap::new();
    for row in &rows {
        map.entry(L::owner(row)).or_default().push(L::target(row));
    }
    Ok(map)
}

/// Rewrite one owner's association set to `desired`.
pub async fn sync_links<L, C>(
    conn: &C,
    owner: Uuid,
    desired: &[L::Target],
) -> ApiResult<LinkDiff<L::Target>>
where
    L: LinkTable,
    L::Model: IntoActiveModel<L::Active>,
    C: ConnectionTrait,
{
    let existing = load_targets::<L, C>(conn, owner).await?;
    let changes = diff(&existing, desired);
    if !changes.removed.is_empty() {
        let stale = changes
            .removed
            .iter()
            .fold(Condition::any(), |cond, target| cond.add(L::matches(target)));
        L::delete_many()
            .filter(L::owner_column().eq(owner))
            .filter(stale)
            .exec(conn)
            .await?;
    }
    if !changes.added.is_empty() {
        let rows = changes.added.iter().map(|target| L::link(owner, target));
        L::insert_many(rows).exec_without_returning(conn).await?;
    }
    Ok(changes)
}

/// Rewrite an id-keyed association set chosen at runtime.
pub async fn sync_ids<C>(conn: &C, link: LinkKind, owner: Uuid, ids: &[Uuid]) -> ApiResult<()>
where
    C: ConnectionTrait,
{
    match link {
        LinkKind::BrandPartnerships => {
            sync_links::<brand_partnership::Entity, C>(conn, owner, ids).await?;
        }
        LinkKind::ProductCertificates => {
            sync_links::<product_certificate::Entity, C>(conn, owner, ids).await?;
        }
        LinkKind::CertificateProducts => sync_certified_products(conn, owner, ids).await?,
        LinkKind::DistributorProducts => {
            sync_links::<distributor_product::Entity, C>(conn, owner, ids).await?;
        }
        LinkKind::UserCertificates => {
            sync_links::<user_certificate::Entity, C>(conn, owner, ids).await?;
        }
        LinkKind::ProjectPresales => {
            sync_links::<project_presales::Entity, C>(conn, owner, ids).await?;
        }
        LinkKind::ProjectEngineers => {
            sync_links::<project_engineer::Entity, C>(conn, owner, ids).await?;
        }
        LinkKind::ProjectProducts => return Err(usage_keyed()),
    }
    Ok(())
}

/// Batch-load an id-keyed association set chosen at runtime.
pub async fn load_ids<C>(
    conn: &C,
    link: LinkKind,
    owners: &[Uuid],
) -> ApiResult<HashMap<Uuid, Vec<Uuid>>>
where
    C: ConnectionTrait,
{
    match link {
        LinkKind::BrandPartnerships => {
            load_for_owners::<brand_partnership::Entity, C>(conn, owners).await
        }
        LinkKind::ProductCertificates => {
            load_for_owners::<product_certificate::Entity, C>(conn, owners).await
        }
        LinkKind::CertificateProducts => load_certified_products(conn, owners).await,
        LinkKind::DistributorProducts => {
            load_for_owners::<distributor_product::Entity, C>(conn, owners).await
        }
        LinkKind::UserCertificates => {
            load_for_owners::<user_certificate::Entity, C>(conn, owners).await
        }
        LinkKind::ProjectPresales => {
            load_for_owners::<project_presales::Entity, C>(conn, owners).await
        }
        LinkKind::ProjectEngineers => {
            load_for_owners::<project_engineer::Entity, C>(conn, owners).await
        }
        LinkKind::ProjectProducts => Err(usage_keyed()),
    }
}

/// Products carrying each certificate; the reverse of
/// `LinkKind::ProductCertificates` over the same rows.
async fn load_certified_products<C: ConnectionTrait>(
    conn: &C,
    certificates: &[Uuid],
) -> ApiResult<HashMap<Uuid, Vec<Uuid>>> {
    if certificates.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = product_certificate::Entity::find()
        .filter(product_certificate::Column::CertificateId.is_in(certificates.to_vec()))
        .all(conn)
        .await?;
    let mut map: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for row in rows {
        map.entry(row.certificate_id).or_default().push(row.product_id);
    }
    Ok(map)
}

async fn sync_certified_products<C: ConnectionTrait>(
    conn: &C,
    certificate: Uuid,
    products: &[Uuid],
) -> ApiResult<()> {
    let existing = load_certified_products(conn, &[certificate])
        .await?
        .remove(&certificate)
        .unwrap_or_default();
    let changes = diff(&existing, products);
    if !changes.removed.is_empty() {
        product_certificate::Entity::delete_many()
            .filter(product_certificate::Column::CertificateId.eq(certificate))
            .filter(product_certificate::Column::ProductId.is_in(changes.removed))
            .exec(conn)
            .await?;
    }
    if !changes.added.is_empty() {
        let rows = changes
            .added
            .into_iter()
            .map(|product| product_certificate::ActiveModel {
                product_id: Set(product),
                certificate_id: Set(certificate),
            });
        product_certificate::Entity::insert_many(rows)
            .exec_without_returning(conn)
            .await?;
    }
    Ok(())
}

fn usage_keyed() -> ApiError {
    ApiError::internal(anyhow::anyhow!(
        "project products are keyed by usage, not by id"
    ))
}

macro_rules! id_link_table {
    ($module:ident, $owner:ident => $owner_field:ident, $target:ident => $target_field:ident) => {
        impl LinkTable for $module::Entity {
            type Active = $module::ActiveModel;
            type Target = Uuid;

            fn owner_column() -> Self::Column {
                $module::Column::$owner
            }

            fn owner(model: &Self::Model) -> Uuid {
                model.$owner_field
            }

            fn target(model: &Self::Model) -> Uuid {
                model.$target_field
            }

            fn link(owner: Uuid, target: &Uuid) -> Self::Active {
                $module::ActiveModel {
                    $owner_field: Set(owner),
                    $target_field: Set(*target),
                }
            }

            fn matches(target: &Uuid) -> Condition {
                Condition::all().add($module::Column::$target.eq(*target))
            }
        }
    };
}

id_link_table!(brand_partnership, BrandId => brand_id, PartnershipId => partnership_id);
id_link_table!(product_certificate, ProductId => product_id, CertificateId => certificate_id);
id_link_table!(distributor_product, DistributorId => distributor_id, ProductId => product_id);
id_link_table!(user_certificate, UserId => user_id, CertificateId => certificate_id);
id_link_table!(project_presales, ProjectId => project_id, UserId => user_id);
id_link_table!(project_engineer, ProjectId => project_id, UserId => user_id);

/// One product used by a project, with where it is sourced and what it is for.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, SimpleObject, InputObject, Serialize, Deserialize,
)]
#[graphql(input_name = "ProductUsageInput")]
pub struct ProductUsage {
    pub product_id: Uuid,
    pub distributor_id: Option<Uuid>,
    pub project_type_id: Option<Uuid>,
}

impl LinkTable for project_product::Entity {
    type Active = project_product::ActiveModel;
    type Target = ProductUsage;

    fn owner_column() -> Self::Column {
        project_product::Column::ProjectId
    }

    fn owner(model: &Self::Model) -> Uuid {
        model.project_id
    }

    fn target(model: &Self::Model) -> ProductUsage {
        ProductUsage {
            product_id: model.product_id,
            distributor_id: model.distributor_id,
            project_type_id: model.project_type_id,
        }
    }

    fn link(owner: Uuid, target: &ProductUsage) -> Self::Active {
        project_product::ActiveModel {
            id: Set(Uuid::new_v4()),
            project_id: Set(owner),
            product_id: Set(target.product_id),
            distributor_id: Set(target.distributor_id),
            project_type_id: Set(target.project_type_id),
        }
    }

    fn matches(target: &ProductUsage) -> Condition {
        let distributor = match target.distributor_id {
            Some(id) => project_product::Column::DistributorId.eq(id),
            None => project_product::Column::DistributorId.is_null(),
        };
        let project_type = match target.project_type_id {
            Some(id) => project_product::Column::ProjectTypeId.eq(id),
            None => project_product::Column::ProjectTypeId.is_null(),
        };
        Condition::all()
            .add(project_product::Column::ProductId.eq(target.product_id))
            .add(distributor)
            .add(project_type)
    }
}
