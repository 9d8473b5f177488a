use async_graphql::{Context, Object, ResultExt};
use tracing::instrument;
use uuid::Uuid;

use super::{current_user, database};
use crate::catalog::{RecordKind, SchemaView};
use crate::listing::ListFilter;
use crate::overview::{self, Dashboard};
use crate::projects::{self, ProjectForm, ProjectPage, ProjectView};
use crate::records::{self, RecordForm, RecordPage, RecordView};
use crate::users::{self, UserPage, UserView};

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// Form descriptions for every master-data kind.
    async fn schemas(&self) -> Vec<SchemaView> {
        RecordKind::ALL
            .iter()
            .map(|kind| SchemaView::from(kind.schema()))
            .collect()
    }

    #[instrument(name = "graphql.me", skip_all)]
    async fn me(&self, ctx: &Context<'_>) -> async_graphql::Result<UserView> {
        let user = current_user(ctx)?;
        let db = database(ctx)?;
        users::me(&db, &user).await.extend()
    }

    #[instrument(name = "graphql.dashboard", skip_all)]
    async fn dashboard(&self, ctx: &Context<'_>) -> async_graphql::Result<Dashboard> {
        let user = current_user(ctx)?;
        let db = database(ctx)?;
        overview::load_dashboard(&db, &user).await.extend()
    }

    #[instrument(name = "graphql.records", skip_all)]
    async fn records(
        &self,
        ctx: &Context<'_>,
        kind: RecordKind,
        #[graphql(default)] filter: ListFilter,
    ) -> async_graphql::Result<RecordPage> {
        current_user(ctx)?;
        let db = database(ctx)?;
        records::list_records(&db, kind, &filter).await.extend()
    }

    #[instrument(name = "graphql.record", skip_all)]
    async fn record(
        &self,
        ctx: &Context<'_>,
        kind: RecordKind,
        id: Uuid,
    ) -> async_graphql::Result<RecordView> {
        current_user(ctx)?;
        let db = database(ctx)?;
        records::get_record(&db, kind, id).await.extend()
    }

    #[instrument(name = "graphql.record_form", skip_all)]
    async fn record_form(
        &self,
        ctx: &Context<'_>,
        kind: RecordKind,
        id: Option<Uuid>,
    ) -> async_graphql::Result<RecordForm> {
        current_user(ctx)?;
        let db = database(ctx)?;
        records::record_form(&db, kind, id).await.extend()
    }

    #[instrument(name = "graphql.projects", skip_all)]
    async fn projects(
        &self,
        ctx: &Context<'_>,
        #[graphql(default)] filter: ListFilter,
    ) -> async_graphql::Result<ProjectPage> {
        let user = current_user(ctx)?;
        let db = database(ctx)?;
        projects::list_projects(&db, &user, &filter).await.extend()
    }

    #[instrument(name = "graphql.project", skip_all)]
    async fn project(&self, ctx: &Context<'_>, id: Uuid) -> async_graphql::Result<ProjectView> {
        let user = current_user(ctx)?;
        let db = database(ctx)?;
        projects::get_project(&db, &user, id).await.extend()
    }

    #[instrument(name = "graphql.project_form", skip_all)]
    async fn project_form(
        &self,
        ctx: &Context<'_>,
        id: Option<Uuid>,
    ) -> async_graphql::Result<ProjectForm> {
        let user = current_user(ctx)?;
        let db = database(ctx)?;
        projects::project_form(&db, &user, id).await.extend()
    }

    #[instrument(name = "graphql.users", skip_all)]
    async fn users(
        &self,
        ctx: &Context<'_>,
        #[graphql(default)] filter: ListFilter,
    ) -> async_graphql::Result<UserPage> {
        let user = current_user(ctx)?;
        let db = database(ctx)?;
        users::list_users(&db, &user, &filter).await.extend()
    }
}
