//! GraphQL surface over the dashboard services.
//!
//! The HTTP layer resolves the session and, when there is one, inserts the
//! [`CurrentUser`] into the request data. Every resolver except `schemas`
//! requires it.

mod mutation;
mod query;

use std::sync::Arc;

use async_graphql::{Context, EmptySubscription, ErrorExtensions, Schema};
use platform_api::ApiError;
use sea_orm::DatabaseConnection;

use crate::auth::CurrentUser;

pub use mutation::{AssociationInput, MutationRoot, RecordInput};
pub use query::QueryRoot;

pub type AppSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

pub fn build_schema(db: Arc<DatabaseConnection>) -> AppSchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(db)
        .finish()
}

/// SDL snapshot written by `schema:print`.
pub fn schema_sdl() -> String {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .finish()
        .sdl()
}

fn database(ctx: &Context<'_>) -> async_graphql::Result<Arc<DatabaseConnection>> {
    ctx.data::<Arc<DatabaseConnection>>()
        .cloned()
        .map_err(|_| ApiError::internal(anyhow::anyhow!("missing database connection")).extend())
}

fn current_user(ctx: &Context<'_>) -> async_graphql::Result<CurrentUser> {
    ctx.data_opt::<CurrentUser>()
        .cloned()
        .ok_or_else(|| ApiError::Unauthenticated.extend())
}
