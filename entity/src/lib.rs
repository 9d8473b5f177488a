//! Table models shared by the dashboard service, its migrations' tests and the
//! seeding command.

pub mod brand;
pub mod brand_partnership;
pub mod category;
pub mod certificate;
pub mod customer;
pub mod dashboard_layout;
pub mod distributor;
pub mod distributor_product;
pub mod identity;
pub mod partnership;
pub mod product;
pub mod product_certificate;
pub mod profile;
pub mod project;
pub mod project_engineer;
pub mod project_presales;
pub mod project_product;
pub mod project_type;
pub mod readiness;
pub mod session;
pub mod sub_category;
pub mod user_certificate;
