pub use sea_orm_migration::prelude::*;

mod m20260301_000001_accounts;
mod m20260301_000002_master_data;
mod m20260301_000003_projects;
mod m20260301_000004_dashboard_layouts;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_accounts::Migration),
            Box::new(m20260301_000002_master_data::Migration),
            Box::new(m20260301_000003_projects::Migration),
            Box::new(m20260301_000004_dashboard_layouts::Migration),
        ]
    }
}
