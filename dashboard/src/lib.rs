//! Domain services behind the business dashboard: authentication, master
//! data records, projects, user administration, aggregation widgets and the
//! GraphQL schema that exposes them.

pub mod auth;
pub mod catalog;
pub mod graphql;
pub mod layout;
pub mod links;
pub mod listing;
pub mod overview;
pub mod projects;
pub mod records;
pub mod seed;
pub mod stats;
pub mod storage;
pub mod users;

pub use platform_api::{ApiError, ApiResult};
