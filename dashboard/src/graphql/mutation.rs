use async_graphql::{Context, InputObject, Object, ResultExt};
use tracing::instrument;
use uuid::Uuid;

use super::{current_user, database};
use crate::auth::UserRole;
use crate::catalog::{RecordDraft, RecordKind};
use crate::layout::{self, Widget};
use crate::projects::{self, ProjectDraft, ProjectView};
use crate::records::{self, RecordView};
use crate::users::{self, UserUpdate, UserView};

/// Roles allowed to change master data.
pub const CATALOG_EDITORS: [UserRole; 2] = [UserRole::Admin, UserRole::Gm];

#[derive(Clone, Debug, InputObject)]
pub struct AssociationInput {
    pub name: String,
    pub ids: Vec<Uuid>,
}

#[derive(Clone, Debug, InputObject)]
pub struct RecordInput {
    pub name: String,
    pub description: Option<String>,
    pub is_active: Option<bool>,
    pub parent_id: Option<Uuid>,
    /// Sets to replace; associations not listed keep their links.
    #[graphql(default)]
    pub associations: Vec<AssociationInput>,
}

impl From<RecordInput> for RecordDraft {
    fn from(input: RecordInput) -> Self {
        let mut associations = std::collections::BTreeMap::new();
        for set in input.associations {
            associations
                .entry(set.name)
                .or_insert_with(Vec::new)
                .extend(set.ids);
        }
        RecordDraft {
            name: input.name,
            description: input.description,
            is_active: input.is_active,
            parent_id: input.parent_id,
            associations,
        }
    }
}

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    #[instrument(name = "graphql.save_record", skip_all)]
    async fn save_record(
        &self,
        ctx: &Context<'_>,
        kind: RecordKind,
        id: Option<Uuid>,
        input: RecordInput,
    ) -> async_graphql::Result<RecordView> {
        let user = current_user(ctx)?;
        user.require(&CATALOG_EDITORS).extend()?;
        let db = database(ctx)?;
        records::save_record(&db, kind, id, input.into())
            .await
            .extend()
    }

    #[instrument(name = "graphql.delete_record", skip_all)]
    async fn delete_record(
        &self,
        ctx: &Context<'_>,
        kind: RecordKind,
        id: Uuid,
    ) -> async_graphql::Result<bool> {
        let user = current_user(ctx)?;
        user.require(&CATALOG_EDITORS).extend()?;
        let db = database(ctx)?;
        records::delete_record(&db, kind, id).await.extend()?;
        Ok(true)
    }

    #[instrument(name = "graphql.save_project", skip_all)]
    async fn save_project(
        &self,
        ctx: &Context<'_>,
        id: Option<Uuid>,
        input: ProjectDraft,
    ) -> async_graphql::Result<ProjectView> {
        let user = current_user(ctx)?;
        let db = database(ctx)?;
        projects::save_project(&db, &user, id, input).await.extend()
    }

    #[instrument(name = "graphql.delete_project", skip_all)]
    async fn delete_project(&self, ctx: &Context<'_>, id: Uuid) -> async_graphql::Result<bool> {
        let user = current_user(ctx)?;
        let db = database(ctx)?;
        projects::delete_project(&db, &user, id).await.extend()?;
        Ok(true)
    }

    #[instrument(name = "graphql.update_user", skip_all)]
    async fn update_user(
        &self,
        ctx: &Context<'_>,
        id: Uuid,
        input: UserUpdate,
    ) -> async_graphql::Result<UserView> {
        let user = current_user(ctx)?;
        let db = database(ctx)?;
        users::update_user(&db, &user, id, input).await.extend()
    }

    #[instrument(name = "graphql.delete_user", skip_all)]
    async fn delete_user(&self, ctx: &Context<'_>, id: Uuid) -> async_graphql::Result<bool> {
        let user = current_user(ctx)?;
        let db = database(ctx)?;
        users::delete_user(&db, &user, id).await.extend()?;
        Ok(true)
    }

    #[instrument(name = "graphql.save_dashboard_layout", skip_all)]
    async fn save_dashboard_layout(
        &self,
        ctx: &Context<'_>,
        widgets: Vec<Widget>,
    ) -> async_graphql::Result<Vec<Widget>> {
        let user = current_user(ctx)?;
        let db = database(ctx)?;
        layout::save_layout(db.as_ref(), user.user_id, widgets)
            .await
            .extend()
    }
}
