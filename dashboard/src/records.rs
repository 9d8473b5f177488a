//! Generic create/read/update/delete over the master-data tables.
//!
//! Every table implements [`MasterTable`]; [`for_kind!`] picks the concrete
//! entity for a runtime [`RecordKind`] so the services below are written once.

use std::collections::HashMap;

use async_graphql::SimpleObject;
use chrono::Utc;
use entity::{
    brand, category, certificate, customer, distributor, partnership, product, project_type,
    readiness, sub_category,
};
use platform_api::{ApiError, ApiResult};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait,
    ActiveValue::{NotSet, Set},
    ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::catalog::{RecordDraft, RecordKind, SchemaView, ValidRecord};
use crate::links::{dedupe, load_ids, sync_ids};
use crate::listing::{self, ListFilter, Listable};

/// One master-data row, whatever table it came from.
#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "RecordRow")]
pub struct RecordRow {
    pub id: Uuid,
    pub kind: RecordKind,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub parent_id: Option<Uuid>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

/// Id and display name; used for dropdown options, badges and lineage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, SimpleObject)]
pub struct RefItem {
    pub id: Uuid,
    pub name: String,
}

#[derive(Clone, Debug, SimpleObject)]
pub struct AssociationView {
    pub name: String,
    pub label: String,
    pub items: Vec<RefItem>,
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "Record")]
pub struct RecordView {
    pub row: RecordRow,
    /// Ancestors from the root down to the direct parent.
    pub lineage: Vec<RefItem>,
    pub associations: Vec<AssociationView>,
}

#[derive(Clone, Copy, Debug, Default, SimpleObject)]
pub struct RecordSummary {
    pub total: u64,
    pub active: u64,
    pub inactive: u64,
}

#[derive(Clone, Debug, SimpleObject)]
pub struct RecordPage {
    pub kind: RecordKind,
    pub items: Vec<RecordView>,
    pub summary: RecordSummary,
}

#[derive(Clone, Debug, SimpleObject)]
pub struct AssociationOptions {
    pub name: String,
    pub label: String,
    pub options: Vec<RefItem>,
}

/// Everything the edit dialog needs, loaded fresh on every open.
#[derive(Clone, Debug, SimpleObject)]
pub struct RecordForm {
    pub schema: SchemaView,
    pub record: Option<RecordView>,
    pub parent_options: Vec<RefItem>,
    pub association_options: Vec<AssociationOptions>,
}

impl Listable for RecordView {
    fn id(&self) -> Uuid {
        self.row.id
    }

    fn sort_name(&self) -> &str {
        &self.row.name
    }

    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.row.name.as_str()];
        fields.extend(self.row.description.as_deref());
        fields.extend(self.lineage.iter().map(|step| step.name.as_str()));
        fields
    }

    fn created_at(&self) -> DateTimeWithTimeZone {
        self.row.created_at
    }

    fn is_active(&self) -> bool {
        self.row.is_active
    }
}

/// A master-data table with the shared `id, name, description, is_active`
/// shape and an optional parent column.
pub trait MasterTable: EntityTrait {
    type Active: ActiveModelTrait<Entity = Self> + Send + Sync;
    const KIND: RecordKind;

    fn id_column() -> Self::Column;
    fn name_column() -> Self::Column;
    fn active_column() -> Self::Column;
    fn to_row(model: &Self::Model) -> RecordRow;
    /// Fully populated row for an insert.
    fn fresh(id: Uuid, record: &ValidRecord, now: DateTimeWithTimeZone) -> Self::Active;
    /// Editable columns only; id and `created_at` stay untouched, as does
    /// `is_active` when the draft leaves it out.
    fn revise(record: &ValidRecord, now: DateTimeWithTimeZone) -> Self::Active;
}

macro_rules! master_table {
    (@impl $module:ident, $kind:ident, $parent_of:expr, $set_parent:expr) => {
        impl MasterTable for $module::Entity {
            type Active = $module::ActiveModel;
            const KIND: RecordKind = RecordKind::$kind;

            fn id_column() -> Self::Column {
                $module::Column::Id
            }

            fn name_column() -> Self::Column {
                $module::Column::Name
            }

            fn active_column() -> Self::Column {
                $module::Column::IsActive
            }

            fn to_row(model: &$module::Model) -> RecordRow {
                let parent_of = $parent_of;
                RecordRow {
                    id: model.id,
                    kind: RecordKind::$kind,
                    name: model.name.clone(),
                    description: model.description.clone(),
                    is_active: model.is_active,
                    parent_id: parent_of(model),
                    created_at: model.created_at,
                    updated_at: model.updated_at,
                }
            }

            fn fresh(id: Uuid, record: &ValidRecord, now: DateTimeWithTimeZone) -> Self::Active {
                let mut active = Self::revise(record, now);
                active.id = Set(id);
                active.is_active = Set(record.is_active.unwrap_or(true));
                active.created_at = Set(now);
                active
            }

            fn revise(record: &ValidRecord, now: DateTimeWithTimeZone) -> Self::Active {
                let set_parent = $set_parent;
                let mut active = $module::ActiveModel {
                    name: Set(record.name.clone()),
                    description: Set(record.description.clone()),
                    is_active: record.is_active.map_or(NotSet, Set),
                    updated_at: Set(now),
                    ..Default::default()
                };
                set_parent(record, &mut active);
                active
            }
        }
    };
    ($module:ident, $kind:ident) => {
        master_table!(@impl $module, $kind, |_m| None, |_r, _a| {});
    };
    ($module:ident, $kind:ident, $parent:ident) => {
        master_table!(
            @impl $module,
            $kind,
            |m: &$module::Model| Some(m.$parent),
            |r: &ValidRecord, a: &mut $module::ActiveModel| {
                if let Some(parent) = r.parent_id {
                    a.$parent = Set(parent);
                }
            }
        );
    };
}

master_table!(customer, Customer);
master_table!(distributor, Distributor);
master_table!(partnership, Partnership);
master_table!(certificate, Certificate);
master_table!(category, Category);
master_table!(sub_category, SubCategory, category_id);
master_table!(brand, Brand, sub_category_id);
master_table!(product, Product, brand_id);
master_table!(readiness, Readiness);
master_table!(project_type, ProjectType);

/// Run `$body` with `$E` bound to the entity behind `$kind`.
macro_rules! for_kind {
    ($kind:expr, $E:ident => $body:expr) => {
        match $kind {
            RecordKind::Customer => {
                type $E = customer::Entity;
                $body
            }
            RecordKind::Distributor => {
                type $E = distributor::Entity;
                $body
            }
            RecordKind::Partnership => {
                type $E = partnership::Entity;
                $body
            }
            RecordKind::Certificate => {
                type $E = certificate::Entity;
                $body
            }
            RecordKind::Category => {
                type $E = category::Entity;
                $body
            }
            RecordKind::SubCategory => {
                type $E = sub_category::Entity;
                $body
            }
            RecordKind::Brand => {
                type $E = brand::Entity;
                $body
            }
            RecordKind::Product => {
                type $E = product::Entity;
                $body
            }
            RecordKind::Readiness => {
                type $E = readiness::Entity;
                $body
            }
            RecordKind::ProjectType => {
                type $E = project_type::Entity;
                $body
            }
        }
    };
}

async fn all_rows<E, C>(conn: &C) -> ApiResult<Vec<RecordRow>>
where
    E: MasterTable,
    C: ConnectionTrait,
{
    let models = E::find().order_by_asc(E::name_column()).all(conn).await?;
    Ok(models.iter().map(E::to_row).collect())
}

async fn rows_by_ids<E, C>(conn: &C, ids: Vec<Uuid>) -> ApiResult<Vec<RecordRow>>
where
    E: MasterTable,
    C: ConnectionTrait,
{
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let models = E::find()
        .filter(E::id_column().is_in(ids))
        .order_by_asc(E::name_column())
        .all(conn)
        .await?;
    Ok(models.iter().map(E::to_row).collect())
}

/// Active rows plus any row in `keep`, so existing selections stay visible.
async fn option_rows<E, C>(conn: &C, keep: Vec<Uuid>) -> ApiResult<Vec<RecordRow>>
where
    E: MasterTable,
    C: ConnectionTrait,
{
    let models = E::find()
        .filter(
            Condition::any()
                .add(E::active_column().eq(true))
                .add(E::id_column().is_in(keep)),
        )
        .order_by_asc(E::name_column())
        .all(conn)
        .await?;
    Ok(models.iter().map(E::to_row).collect())
}

async fn insert_row<E, C>(
    conn: &C,
    id: Uuid,
    record: &ValidRecord,
    now: DateTimeWithTimeZone,
) -> ApiResult<()>
where
    E: MasterTable,
    E::Model: IntoActiveModel<E::Active>,
    C: ConnectionTrait,
{
    E::insert(E::fresh(id, record, now))
        .exec_without_returning(conn)
        .await?;
    Ok(())
}

async fn update_row<E, C>(
    conn: &C,
    id: Uuid,
    record: &ValidRecord,
    now: DateTimeWithTimeZone,
) -> ApiResult<()>
where
    E: MasterTable,
    C: ConnectionTrait,
{
    let result = E::update_many()
        .set(E::revise(record, now))
        .filter(E::id_column().eq(id))
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        return Err(ApiError::not_found(E::KIND.schema().label));
    }
    Ok(())
}

async fn delete_row<E, C>(conn: &C, id: Uuid) -> ApiResult<u64>
where
    E: MasterTable,
    C: ConnectionTrait,
{
    let result = E::delete_many()
        .filter(E::id_column().eq(id))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

pub async fn load_rows<C: ConnectionTrait>(
    conn: &C,
    kind: RecordKind,
) -> ApiResult<Vec<RecordRow>> {
    for_kind!(kind, E => all_rows::<E, C>(conn).await)
}

pub async fn load_rows_by_ids<C: ConnectionTrait>(
    conn: &C,
    kind: RecordKind,
    ids: Vec<Uuid>,
) -> ApiResult<Vec<RecordRow>> {
    for_kind!(kind, E => rows_by_ids::<E, C>(conn, ids).await)
}

pub async fn load_options<C: ConnectionTrait>(
    conn: &C,
    kind: RecordKind,
    keep: Vec<Uuid>,
) -> ApiResult<Vec<RefItem>> {
    let rows = for_kind!(kind, E => option_rows::<E, C>(conn, keep).await)?;
    Ok(rows.iter().map(RefItem::from).collect())
}

/// Names for a set of ids of one kind, keyed by id.
pub async fn names_by_id<C: ConnectionTrait>(
    conn: &C,
    kind: RecordKind,
    ids: Vec<Uuid>,
) -> ApiResult<HashMap<Uuid, String>> {
    let rows = load_rows_by_ids(conn, kind, dedupe(ids)).await?;
    Ok(rows.into_iter().map(|row| (row.id, row.name)).collect())
}

/// Fail with `VALIDATION` unless every id exists in `kind`'s table.
pub async fn ensure_exist<C: ConnectionTrait>(
    conn: &C,
    kind: RecordKind,
    ids: &[Uuid],
) -> ApiResult<()> {
    let unique = dedupe(ids.iter().copied());
    if unique.is_empty() {
        return Ok(());
    }
    let expected = unique.len();
    let found = load_rows_by_ids(conn, kind, unique).await?.len();
    if found != expected {
        return Err(ApiError::invalid(format!(
            "unknown {} selected",
            kind.schema().label.to_lowercase()
        )));
    }
    Ok(())
}

impl From<&RecordRow> for RefItem {
    fn from(row: &RecordRow) -> Self {
        Self {
            id: row.id,
            name: row.name.clone(),
        }
    }
}

/// Parent chains for many rows of one kind, one query per ancestor level.
async fn load_lineage<C: ConnectionTrait>(
    conn: &C,
    kind: RecordKind,
    rows: &[RecordRow],
) -> ApiResult<HashMap<Uuid, Vec<RefItem>>> {
    let mut chains: HashMap<Uuid, Vec<RefItem>> = HashMap::new();
    let mut pending: Vec<(Uuid, Uuid)> = rows
        .iter()
        .filter_map(|row| row.parent_id.map(|parent| (row.id, parent)))
        .collect();
    let mut level = kind.parent_kind();
    while let Some(parent_kind) = level {
        if pending.is_empty() {
            break;
        }
        let ids = dedupe(pending.iter().map(|(_, parent)| *parent));
        let parents: HashMap<Uuid, RecordRow> = load_rows_by_ids(conn, parent_kind, ids)
            .await?
            .into_iter()
            .map(|row| (row.id, row))
            .collect();
        let mut next = Vec::new();
        for (owner, parent_id) in pending {
            if let Some(parent) = parents.get(&parent_id) {
                chains.entry(owner).or_default().push(RefItem::from(parent));
                if let Some(grand) = parent.parent_id {
                    next.push((owner, grand));
                }
            }
        }
        pending = next;
        level = parent_kind.parent_kind();
    }
    for chain in chains.values_mut() {
        chain.reverse();
    }
    Ok(chains)
}

/// Attach lineage and association badges to loaded rows.
pub async fn build_views<C: ConnectionTrait>(
    conn: &C,
    kind: RecordKind,
    rows: Vec<RecordRow>,
) -> ApiResult<Vec<RecordView>> {
    let schema = kind.schema();
    let owners: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
    let mut lineage = load_lineage(conn, kind, &rows).await?;

    let mut per_association = Vec::with_capacity(schema.associations.len());
    for spec in schema.associations {
        let links = load_ids(conn, spec.link, &owners).await?;
        let target_ids: Vec<Uuid> = links.values().flatten().copied().collect();
        let names = names_by_id(conn, spec.target, target_ids).await?;
        per_association.push((spec, links, names));
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let associations = per_association
                .iter()
                .map(|(spec, links, names)| AssociationView {
                    name: spec.name.to_string(),
                    label: spec.label.to_string(),
                    items: ref_items(links.get(&row.id), names),
                })
                .collect();
            RecordView {
                lineage: lineage.remove(&row.id).unwrap_or_default(),
                associations,
                row,
            }
        })
        .collect())
}

fn ref_items(ids: Option<&Vec<Uuid>>, names: &HashMap<Uuid, String>) -> Vec<RefItem> {
    let mut items: Vec<RefItem> = ids
        .into_iter()
        .flatten()
        .filter_map(|id| {
            names.get(id).map(|name| RefItem {
                id: *id,
                name: name.clone(),
            })
        })
        .collect();
    items.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    items
}

pub async fn load_view<C: ConnectionTrait>(
    conn: &C,
    kind: RecordKind,
    id: Uuid,
) -> ApiResult<Option<RecordView>> {
    let rows = load_rows_by_ids(conn, kind, vec![id]).await?;
    Ok(build_views(conn, kind, rows).await?.into_iter().next())
}

#[instrument(skip(db, filter))]
pub async fn list_records(
    db: &DatabaseConnection,
    kind: RecordKind,
    filter: &ListFilter,
) -> ApiResult<RecordPage> {
    let rows = load_rows(db, kind).await?;
    let total = rows.len() as u64;
    let active = rows.iter().filter(|row| row.is_active).count() as u64;
    let views = build_views(db, kind, rows).await?;
    Ok(RecordPage {
        kind,
        items: listing::apply(views, filter),
        summary: RecordSummary {
            total,
            active,
            inactive: total - active,
        },
    })
}

pub async fn get_record(
    db: &DatabaseConnection,
    kind: RecordKind,
    id: Uuid,
) -> ApiResult<RecordView> {
    load_view(db, kind, id)
        .await?
        .ok_or_else(|| ApiError::not_found(kind.schema().label))
}

#[instrument(skip(db))]
pub async fn record_form(
    db: &DatabaseConnection,
    kind: RecordKind,
    id: Option<Uuid>,
) -> ApiResult<RecordForm> {
    let schema = kind.schema();
    let record = match id {
        Some(id) => Some(get_record(db, kind, id).await?),
        None => None,
    };

    let parent_options = match schema.parent.as_ref() {
        Some(parent) => {
            let keep = record
                .as_ref()
                .and_then(|r| r.row.parent_id)
                .into_iter()
                .collect();
            load_options(db, parent.kind, keep).await?
        }
        None => Vec::new(),
    };

    let mut association_options = Vec::with_capacity(schema.associations.len());
    for spec in schema.associations {
        let keep = record
            .as_ref()
            .and_then(|r| r.associations.iter().find(|a| a.name == spec.name))
            .map(|a| a.items.iter().map(|item| item.id).collect())
            .unwrap_or_default();
        association_options.push(AssociationOptions {
            name: spec.name.to_string(),
            label: spec.label.to_string(),
            options: load_options(db, spec.target, keep).await?,
        });
    }

    Ok(RecordForm {
        schema: SchemaView::from(schema),
        record,
        parent_options,
        association_options,
    })
}

/// Validate, then write the row and its association diff in one
/// transaction and return the re-read record.
#[instrument(skip(db, draft))]
pub async fn save_record(
    db: &DatabaseConnection,
    kind: RecordKind,
    id: Option<Uuid>,
    draft: RecordDraft,
) -> ApiResult<RecordView> {
    let schema = kind.schema();
    let record = schema.validate(draft)?;
    let now: DateTimeWithTimeZone = Utc::now().into();

    let txn = db.begin().await?;
    if let (Some(parent), Some(parent_id)) = (schema.parent.as_ref(), record.parent_id) {
        ensure_exist(&txn, parent.kind, &[parent_id]).await?;
    }
    for (spec, ids) in &record.associations {
        ensure_exist(&txn, spec.target, ids).await?;
    }

    let id = match id {
        Some(id) => {
            for_kind!(kind, E => update_row::<E, _>(&txn, id, &record, now).await)?;
            id
        }
        None => {
            let id = Uuid::new_v4();
            for_kind!(kind, E => insert_row::<E, _>(&txn, id, &record, now).await)?;
            id
        }
    };
    for (spec, ids) in &record.associations {
        sync_ids(&txn, spec.link, id, ids).await?;
    }
    let view = load_view(&txn, kind, id)
        .await?
        .ok_or_else(|| ApiError::not_found(schema.label))?;
    txn.commit().await?;

    info!(%id, kind = schema.table, "record saved");
    Ok(view)
}

/// Hard delete; children and join rows go with it through the foreign keys.
#[instrument(skip(db))]
pub async fn delete_record(db: &DatabaseConnection, kind: RecordKind, id: Uuid) -> ApiResult<()> {
    let removed = for_kind!(kind, E => delete_row::<E, _>(db, id).await)?;
    if removed == 0 {
        return Err(ApiError::not_found(kind.schema().label));
    }
    info!(%id, kind = kind.schema().table, "record deleted");
    Ok(())
}

/// Row counts for a handful of kinds, used by the overview cards.
pub async fn count_rows<C: ConnectionTrait>(conn: &C, kind: RecordKind) -> ApiResult<u64> {
    Ok(for_kind!(kind, E => E::find().count(conn).await)?)
}

