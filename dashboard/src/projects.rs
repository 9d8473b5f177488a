//! Projects: role-scoped listing, the edit dialog and saves that rewrite the
//! product, presales and engineer sets alongside the project row.

use std::collections::HashMap;

use async_graphql::{InputObject, SimpleObject};
use chrono::{NaiveDate, Utc};
use entity::{profile, profile::Role, project, project_engineer, project_presales, project_product};
use platform_api::{ApiError, ApiResult};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::Query;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::{CurrentUser, UserRole};
use crate::catalog::{LinkKind, RecordKind, optional_text, required_text};
use crate::links::{ProductUsage, dedupe, load_for_owners, load_ids, sync_ids, sync_links};
use crate::listing::{self, ListFilter, Listable};
use crate::records::{RefItem, ensure_exist, load_options, names_by_id};
use crate::stats::total_cents;
use crate::users::{PersonRef, load_people, people_options};

#[derive(Clone, Debug, SimpleObject)]
pub struct ProductUsageView {
    pub product: RefItem,
    pub distributor: Option<RefItem>,
    pub project_type: Option<RefItem>,
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "Project")]
pub struct ProjectView {
    pub id: Uuid,
    pub code: String,
    pub value_cents: i64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub customer: Option<RefItem>,
    pub sales: Option<PersonRef>,
    pub project_manager: Option<PersonRef>,
    pub products: Vec<ProductUsageView>,
    pub presales: Vec<PersonRef>,
    pub engineers: Vec<PersonRef>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

impl Listable for ProjectView {
    fn id(&self) -> Uuid {
        self.id
    }

    fn sort_name(&self) -> &str {
        &self.code
    }

    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.code.as_str()];
        fields.extend(self.description.as_deref());
        fields.extend(self.customer.as_ref().map(|c| c.name.as_str()));
        fields.extend(self.sales.as_ref().map(|s| s.full_name.as_str()));
        fields.extend(self.products.iter().map(|p| p.product.name.as_str()));
        fields
    }

    fn created_at(&self) -> DateTimeWithTimeZone {
        self.created_at
    }

    fn value(&self) -> i64 {
        self.value_cents
    }
}

#[derive(Clone, Copy, Debug, Default, SimpleObject)]
pub struct ProjectSummary {
    pub count: u64,
    pub total_value_cents: i64,
    pub average_value_cents: i64,
}

impl ProjectSummary {
    pub fn of(items: &[ProjectView]) -> Self {
        let count = items.len() as u64;
        let total_value_cents = total_cents(items.iter().map(|p| p.value_cents));
        let average_value_cents = if count == 0 {
            0
        } else {
            total_value_cents / count as i64
        };
        Self {
            count,
            total_value_cents,
            average_value_cents,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
pub struct ProjectPage {
    pub items: Vec<ProjectView>,
    pub summary: ProjectSummary,
}

#[derive(Clone, Debug, SimpleObject)]
pub struct ProjectForm {
    pub project: Option<ProjectView>,
    pub customers: Vec<RefItem>,
    pub products: Vec<RefItem>,
    pub distributors: Vec<RefItem>,
    pub project_types: Vec<RefItem>,
    pub sales_users: Vec<PersonRef>,
    pub project_managers: Vec<PersonRef>,
    pub presales_users: Vec<PersonRef>,
    pub engineers: Vec<PersonRef>,
}

/// Project dialog input. `None` association lists leave the stored set alone.
#[derive(Clone, Debug, Default, InputObject)]
#[graphql(name = "ProjectInput")]
pub struct ProjectDraft {
    pub code: String,
    #[graphql(default)]
    pub value_cents: i64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub customer_id: Uuid,
    pub sales_id: Option<Uuid>,
    pub pm_id: Option<Uuid>,
    pub products: Option<Vec<ProductUsage>>,
    pub presales_ids: Option<Vec<Uuid>>,
    pub engineer_ids: Option<Vec<Uuid>>,
}

/// Roles allowed to create, edit and delete projects. Sales and project
/// managers are further limited to the projects they can see.
pub const EDITORS: [UserRole; 4] = [
    UserRole::Admin,
    UserRole::Gm,
    UserRole::Sales,
    UserRole::ProjectManager,
];

/// Restriction on which projects a caller sees. Admin and GM see all; sales
/// and project managers see the projects they own; presales and engineers see
/// the projects they are assigned to.
pub fn visibility(user: &CurrentUser) -> Option<Condition> {
    let me = user.user_id;
    match user.role {
        UserRole::Admin | UserRole::Gm => None,
        UserRole::Sales => Some(Condition::all().add(project::Column::SalesId.eq(me))),
        UserRole::ProjectManager => Some(Condition::all().add(project::Column::PmId.eq(me))),
        UserRole::Presales => Some(
            Condition::all().add(
                project::Column::Id.in_subquery(
                    Query::select()
                        .column(project_presales::Column::ProjectId)
                        .from(project_presales::Entity)
                        .and_where(project_presales::Column::UserId.eq(me))
                        .to_owned(),
                ),
            ),
        ),
        UserRole::Engineer => Some(
            Condition::all().add(
                project::Column::Id.in_subquery(
                    Query::select()
                        .column(project_engineer::Column::ProjectId)
                        .from(project_engineer::Entity)
                        .and_where(project_engineer::Column::UserId.eq(me))
                        .to_owned(),
                ),
            ),
        ),
    }
}

/// Projects the caller may see, newest first.
pub async fn scoped_projects<C: ConnectionTrait>(
    conn: &C,
    user: &CurrentUser,
) -> ApiResult<Vec<project::Model>> {
    let mut query = project::Entity::find().order_by_desc(project::Column::CreatedAt);
    if let Some(scope) = visibility(user) {
        query = query.filter(scope);
    }
    Ok(query.all(conn).await?)
}

/// One project by id, as long as the caller can see it. Projects outside the
/// caller's scope read as missing.
async fn find_visible<C: ConnectionTrait>(
    conn: &C,
    user: &CurrentUser,
    id: Uuid,
) -> ApiResult<project::Model> {
    let mut query = project::Entity::find_by_id(id);
    if let Some(scope) = visibility(user) {
        query = query.filter(scope);
    }
    query
        .one(conn)
        .await?
        .ok_or_else(|| ApiError::not_found("project"))
}

/// Attach customer, people and product usages with a fixed number of queries.
pub async fn build_project_views<C: ConnectionTrait>(
    conn: &C,
    projects: Vec<project::Model>,
) -> ApiResult<Vec<ProjectView>> {
    let ids: Vec<Uuid> = projects.iter().map(|p| p.id).collect();

    let customers = names_by_id(
        conn,
        RecordKind::Customer,
        projects.iter().map(|p| p.customer_id).collect(),
    )
    .await?;
    let usages = load_for_owners::<project_product::Entity, C>(conn, &ids).await?;
    let presales = load_ids(conn, LinkKind::ProjectPresales, &ids).await?;
    let engineers = load_ids(conn, LinkKind::ProjectEngineers, &ids).await?;

    let all_usages: Vec<&ProductUsage> = usages.values().flatten().collect();
    let products = names_by_id(
        conn,
        RecordKind::Product,
        all_usages.iter().map(|u| u.product_id).collect(),
    )
    .await?;
    let distributors = names_by_id(
        conn,
        RecordKind::Distributor,
        all_usages.iter().filter_map(|u| u.distributor_id).collect(),
    )
    .await?;
    let project_types = names_by_id(
        conn,
        RecordKind::ProjectType,
        all_usages.iter().filter_map(|u| u.project_type_id).collect(),
    )
    .await?;

    let person_ids = dedupe(
        projects
            .iter()
            .flat_map(|p| [p.sales_id, p.pm_id])
            .flatten()
            .chain(presales.values().flatten().copied())
            .chain(engineers.values().flatten().copied()),
    );
    let people = load_people(conn, person_ids).await?;

    let reference = |names: &HashMap<Uuid, String>, id: Uuid| {
        names.get(&id).map(|name| RefItem {
            id,
            name: name.clone(),
        })
    };
    let persons = |ids: Option<&Vec<Uuid>>| -> Vec<PersonRef> {
        let mut list: Vec<PersonRef> = ids
            .into_iter()
            .flatten()
            .filter_map(|id| people.get(id).cloned())
            .collect();
        list.sort_by(|a, b| a.full_name.to_lowercase().cmp(&b.full_name.to_lowercase()));
        list
    };

    Ok(projects
        .into_iter()
        .map(|model| {
            let products_used = usages
                .get(&model.id)
                .into_iter()
                .flatten()
                .filter_map(|usage| {
                    Some(ProductUsageView {
                        product: reference(&products, usage.product_id)?,
                        distributor: usage
                            .distributor_id
                            .and_then(|id| reference(&distributors, id)),
                        project_type: usage
                            .project_type_id
                            .and_then(|id| reference(&project_types, id)),
                    })
                })
                .collect();
            ProjectView {
                customer: reference(&customers, model.customer_id),
                sales: model.sales_id.and_then(|id| people.get(&id).cloned()),
                project_manager: model.pm_id.and_then(|id| people.get(&id).cloned()),
                products: products_used,
                presales: persons(presales.get(&model.id)),
                engineers: persons(engineers.get(&model.id)),
                id: model.id,
                code: model.code,
                value_cents: model.value_cents,
                start_date: model.start_date,
                end_date: model.end_date,
                description: model.description,
                created_at: model.created_at,
                updated_at: model.updated_at,
            }
        })
        .collect())
}

async fn load_project_view<C: ConnectionTrait>(conn: &C, id: Uuid) -> ApiResult<ProjectView> {
    let model = project::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| ApiError::not_found("project"))?;
    build_project_views(conn, vec![model])
        .await?
        .pop()
        .ok_or_else(|| ApiError::not_found("project"))
}

#[instrument(skip(db, user, filter), fields(user_id = %user.user_id))]
pub async fn list_projects(
    db: &DatabaseConnection,
    user: &CurrentUser,
    filter: &ListFilter,
) -> ApiResult<ProjectPage> {
    let projects = scoped_projects(db, user).await?;
    let views = build_project_views(db, projects).await?;
    let items = listing::apply(views, filter);
    Ok(ProjectPage {
        summary: ProjectSummary::of(&items),
        items,
    })
}

/// A single project, subject to the same visibility as the list.
pub async fn get_project(
    db: &DatabaseConnection,
    user: &CurrentUser,
    id: Uuid,
) -> ApiResult<ProjectView> {
    let model = find_visible(db, user, id).await?;
    build_project_views(db, vec![model])
        .await?
        .pop()
        .ok_or_else(|| ApiError::not_found("project"))
}

#[instrument(skip(db, user), fields(user_id = %user.user_id))]
pub async fn project_form(
    db: &DatabaseConnection,
    user: &CurrentUser,
    id: Option<Uuid>,
) -> ApiResult<ProjectForm> {
    user.require(&EDITORS)?;
    let project = match id {
        Some(id) => Some(get_project(db, user, id).await?),
        None => None,
    };
    let current = project.as_ref();

    Ok(ProjectForm {
        customers: load_options(
            db,
            RecordKind::Customer,
            selected(current, |p| p.customer.iter().map(|c| c.id).collect()),
        )
        .await?,
        products: load_options(
            db,
            RecordKind::Product,
            selected(current, |p| p.products.iter().map(|u| u.product.id).collect()),
        )
        .await?,
        distributors: load_options(
            db,
            RecordKind::Distributor,
            selected(current, |p| {
                p.products
                    .iter()
                    .filter_map(|u| u.distributor.as_ref().map(|d| d.id))
                    .collect()
            }),
        )
        .await?,
        project_types: load_options(
            db,
            RecordKind::ProjectType,
            selected(current, |p| {
                p.products
                    .iter()
                    .filter_map(|u| u.project_type.as_ref().map(|t| t.id))
                    .collect()
            }),
        )
        .await?,
        sales_users: people_options(
            db,
            Role::Sales,
            selected(current, |p| p.sales.iter().map(|s| s.id).collect()),
        )
        .await?,
        project_managers: people_options(
            db,
            Role::ProjectManager,
            selected(current, |p| p.project_manager.iter().map(|m| m.id).collect()),
        )
        .await?,
        presales_users: people_options(
            db,
            Role::Presales,
            selected(current, |p| p.presales.iter().map(|s| s.id).collect()),
        )
        .await?,
        engineers: people_options(
            db,
            Role::Engineer,
            selected(current, |p| p.engineers.iter().map(|e| e.id).collect()),
        )
        .await?,
        project,
    })
}

/// Ids already chosen on the project being edited, kept in the dropdowns even
/// when the referenced row has since been deactivated.
fn selected<F>(project: Option<&ProjectView>, pick: F) -> Vec<Uuid>
where
    F: Fn(&ProjectView) -> Vec<Uuid>,
{
    project.map(pick).unwrap_or_default()
}

/// Fail with `VALIDATION` unless every id is a profile holding `role`.
async fn ensure_people<C: ConnectionTrait>(conn: &C, ids: &[Uuid], role: Role) -> ApiResult<()> {
    let unique = dedupe(ids.iter().copied());
    if unique.is_empty() {
        return Ok(());
    }
    let found = profile::Entity::find()
        .filter(profile::Column::Id.is_in(unique.clone()))
        .filter(profile::Column::Role.eq(role))
        .all(conn)
        .await?;
    if found.len() != unique.len() {
        return Err(ApiError::invalid(format!(
            "selected users must hold the {} role",
            UserRole::from(role).label()
        )));
    }
    Ok(())
}

struct ValidProject {
    code: String,
    value_cents: i64,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    description: Option<String>,
    customer_id: Uuid,
    sales_id: Option<Uuid>,
    pm_id: Option<Uuid>,
    products: Option<Vec<ProductUsage>>,
    presales_ids: Option<Vec<Uuid>>,
    engineer_ids: Option<Vec<Uuid>>,
}

fn validate(draft: ProjectDraft) -> ApiResult<ValidProject> {
    let code = required_text("code", &draft.code)?;
    if draft.value_cents < 0 {
        return Err(ApiError::invalid("value must not be negative"));
    }
    if let (Some(start), Some(end)) = (draft.start_date, draft.end_date) {
        if end < start {
            return Err(ApiError::invalid("end date is before start date"));
        }
    }
    Ok(ValidProject {
        code,
        value_cents: draft.value_cents,
        start_date: draft.start_date,
        end_date: draft.end_date,
        description: optional_text(draft.description),
        customer_id: draft.customer_id,
        sales_id: draft.sales_id,
        pm_id: draft.pm_id,
        products: draft.products.map(dedupe),
        presales_ids: draft.presales_ids.map(dedupe),
        engineer_ids: draft.engineer_ids.map(dedupe),
    })
}

async fn ensure_references<C: ConnectionTrait>(conn: &C, project: &ValidProject) -> ApiResult<()> {
    ensure_exist(conn, RecordKind::Customer, &[project.customer_id]).await?;
    ensure_people(conn, &project.sales_id.into_iter().collect::<Vec<_>>(), Role::Sales).await?;
    ensure_people(
        conn,
        &project.pm_id.into_iter().collect::<Vec<_>>(),
        Role::ProjectManager,
    )
    .await?;
    if let Some(ids) = &project.presales_ids {
        ensure_people(conn, ids, Role::Presales).await?;
    }
    if let Some(ids) = &project.engineer_ids {
        ensure_people(conn, ids, Role::Engineer).await?;
    }
    if let Some(usages) = &project.products {
        let products: Vec<Uuid> = usages.iter().map(|u| u.product_id).collect();
        let distributors: Vec<Uuid> = usages.iter().filter_map(|u| u.distributor_id).collect();
        let types: Vec<Uuid> = usages.iter().filter_map(|u| u.project_type_id).collect();
        ensure_exist(conn, RecordKind::Product, &products).await?;
        ensure_exist(conn, RecordKind::Distributor, &distributors).await?;
        ensure_exist(conn, RecordKind::ProjectType, &types).await?;
    }
    Ok(())
}

/// Sales and project managers only save projects they own: a missing owner
/// becomes the caller, anyone else is refused.
fn keep_in_scope(user: &CurrentUser, valid: &mut ValidProject) -> ApiResult<()> {
    let (owner, field) = match user.role {
        UserRole::Sales => (&mut valid.sales_id, "sales"),
        UserRole::ProjectManager => (&mut valid.pm_id, "project manager"),
        _ => return Ok(()),
    };
    match *owner {
        None => *owner = Some(user.user_id),
        Some(id) if id == user.user_id => {}
        Some(_) => return Err(ApiError::forbidden(format!("{field} must be yourself"))),
    }
    Ok(())
}

/// Validate, then write the project and its three association sets in one
/// transaction and return the re-read project.
#[instrument(skip(db, user, draft), fields(user_id = %user.user_id))]
pub async fn save_project(
    db: &DatabaseConnection,
    user: &CurrentUser,
    id: Option<Uuid>,
    draft: ProjectDraft,
) -> ApiResult<ProjectView> {
    user.require(&EDITORS)?;
    let mut valid = validate(draft)?;
    keep_in_scope(user, &mut valid)?;
    let now: DateTimeWithTimeZone = Utc::now().into();

    let txn = db.begin().await?;
    ensure_references(&txn, &valid).await?;
    let id = match id {
        Some(id) => {
            let existing = find_visible(&txn, user, id).await?;
            let mut active: project::ActiveModel = existing.into();
            active.code = Set(valid.code.clone());
            active.value_cents = Set(valid.value_cents);
            active.start_date = Set(valid.start_date);
            active.end_date = Set(valid.end_date);
            active.description = Set(valid.description.clone());
            active.customer_id = Set(valid.customer_id);
            active.sales_id = Set(valid.sales_id);
            active.pm_id = Set(valid.pm_id);
            active.updated_at = Set(now);
            active.update(&txn).await?;
            id
        }
        None => {
            let id = Uuid::new_v4();
            project::ActiveModel {
                id: Set(id),
                code: Set(valid.code.clone()),
                value_cents: Set(valid.value_cents),
                start_date: Set(valid.start_date),
                end_date: Set(valid.end_date),
                description: Set(valid.description.clone()),
                customer_id: Set(valid.customer_id),
                sales_id: Set(valid.sales_id),
                pm_id: Set(valid.pm_id),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(&txn)
            .await?;
            id
        }
    };

    if let Some(usages) = &valid.products {
        sync_links::<project_product::Entity, _>(&txn, id, usages).await?;
    }
    if let Some(ids) = &valid.presales_ids {
        sync_ids(&txn, LinkKind::ProjectPresales, id, ids).await?;
    }
    if let Some(ids) = &valid.engineer_ids {
        sync_ids(&txn, LinkKind::ProjectEngineers, id, ids).await?;
    }
    let view = load_project_view(&txn, id).await?;
    txn.commit().await?;

    info!(project_id = %id, code = %view.code, "project saved");
    Ok(view)
}

#[instrument(skip(db, user), fields(user_id = %user.user_id))]
pub async fn delete_project(
    db: &DatabaseConnection,
    user: &CurrentUser,
    id: Uuid,
) -> ApiResult<()> {
    user.require(&EDITORS)?;
    let existing = find_visible(db, user, id).await?;
    project::Entity::delete_by_id(existing.id).exec(db).await?;
    info!(project_id = %id, "project deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> ProjectDraft {
        ProjectDraft {
            code: " PRJ-001 ".into(),
            value_cents: 125_000,
            customer_id: Uuid::new_v4(),
            ..ProjectDraft::default()
        }
    }

    fn caller(role: UserRole) -> CurrentUser {
        CurrentUser {
            user_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            email: "someone@example.com".into(),
            full_name: "Someone".into(),
            role,
        }
    }

    #[test]
    fn code_is_trimmed_and_required() {
        assert_eq!(validate(draft()).unwrap().code, "PRJ-001");
        let blank = ProjectDraft {
            code: "  ".into(),
            ..draft()
        };
        assert!(validate(blank).is_err());
    }

    #[test]
    fn negative_values_and_inverted_dates_are_rejected() {
        let negative = ProjectDraft {
            value_cents: -1,
            ..draft()
        };
        assert!(validate(negative).is_err());
        let inverted = ProjectDraft {
            start_date: NaiveDate::from_ymd_opt(2026, 5, 1),
            end_date: NaiveDate::from_ymd_opt(2026, 4, 1),
            ..draft()
        };
        assert!(validate(inverted).is_err());
    }

    #[test]
    fn association_lists_are_deduplicated() {
        let engineer = Uuid::new_v4();
        let valid = validate(ProjectDraft {
            engineer_ids: Some(vec![engineer, engineer]),
            ..draft()
        })
        .unwrap();
        assert_eq!(valid.engineer_ids, Some(vec![engineer]));
        assert!(valid.products.is_none());
    }

    #[test]
    fn sales_and_managers_keep_projects_in_their_scope() {
        let sales = caller(UserRole::Sales);
        let mut valid = validate(draft()).unwrap();
        keep_in_scope(&sales, &mut valid).unwrap();
        assert_eq!(valid.sales_id, Some(sales.user_id));

        let mut handed_away = validate(ProjectDraft {
            sales_id: Some(Uuid::new_v4()),
            ..draft()
        })
        .unwrap();
        let err = keep_in_scope(&sales, &mut handed_away).unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");

        let pm = caller(UserRole::ProjectManager);
        let mut valid = validate(ProjectDraft {
            pm_id: Some(pm.user_id),
            sales_id: Some(Uuid::new_v4()),
            ..draft()
        })
        .unwrap();
        keep_in_scope(&pm, &mut valid).unwrap();
        assert_eq!(valid.pm_id, Some(pm.user_id));

        let gm = caller(UserRole::Gm);
        let mut valid = validate(draft()).unwrap();
        keep_in_scope(&gm, &mut valid).unwrap();
        assert_eq!(valid.sales_id, None);
    }

    #[test]
    fn admins_and_gms_are_unscoped() {
        assert!(visibility(&caller(UserRole::Admin)).is_none());
        assert!(visibility(&caller(UserRole::Gm)).is_none());
        for role in [
            UserRole::Sales,
            UserRole::Presales,
            UserRole::Engineer,
            UserRole::ProjectManager,
        ] {
            assert!(visibility(&caller(role)).is_some(), "{role:?}");
        }
    }

    #[test]
    fn summary_averages_whole_cents() {
        assert_eq!(ProjectSummary::of(&[]).average_value_cents, 0);
    }
}
