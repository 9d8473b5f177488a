use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum Projects {
    Table,
    Id,
    Code,
    ValueCents,
    StartDate,
    EndDate,
    Description,
    CustomerId,
    SalesId,
    PmId,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ProjectProducts {
    Table,
    Id,
    ProjectId,
    ProductId,
    DistributorId,
    ProjectTypeId,
}

#[derive(DeriveIden)]
enum ProjectPresales {
    Table,
    ProjectId,
    UserId,
}

#[derive(DeriveIden)]
enum ProjectEngineers {
    Table,
    ProjectId,
    UserId,
}

#[derive(DeriveIden)]
enum Customers {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Profiles {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Products {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Distributors {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum ProjectTypes {
    Table,
    Id,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Projects::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Projects::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Projects::Code).string_len(64).not_null())
                    .col(
                        ColumnDef::new(Projects::ValueCents)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Projects::StartDate).date())
                    .col(ColumnDef::new(Projects::EndDate).date())
                    .col(ColumnDef::new(Projects::Description).text())
                    .col(ColumnDef::new(Projects::CustomerId).uuid().not_null())
                    .col(ColumnDef::new(Projects::SalesId).uuid())
                    .col(ColumnDef::new(Projects::PmId).uuid())
                    .col(
                        ColumnDef::new(Projects::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Projects::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_projects_customer")
                            .from(Projects::Table, Projects::CustomerId)
                            .to(Customers::Table, Customers::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_projects_sales")
                            .from(Projects::Table, Projects::SalesId)
                            .to(Profiles::Table, Profiles::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_projects_pm")
                            .from(Projects::Table, Projects::PmId)
                            .to(Profiles::Table, Profiles::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        for (name, column) in [
            ("idx_projects_customer", Projects::CustomerId),
            ("idx_projects_sales", Projects::SalesId),
            ("idx_projects_code", Projects::Code),
        ] {
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name(name)
                        .table(Projects::Table)
                        .col(column)
                        .to_owned(),
                )
                .await?;
        }

        manager
            .create_table(
                Table::create()
                    .table(ProjectProducts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProjectProducts::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProjectProducts::ProjectId).uuid().not_null())
                    .col(ColumnDef::new(ProjectProducts::ProductId).uuid().not_null())
                    .col(ColumnDef::new(ProjectProducts::DistributorId).uuid())
                    .col(ColumnDef::new(ProjectProducts::ProjectTypeId).uuid())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_project_products_project")
                            .from(ProjectProducts::Table, ProjectProducts::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_project_products_product")
                            .from(ProjectProducts::Table, ProjectProducts::ProductId)
                            .to(Products::Table, Products::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_project_products_distributor")
                            .from(ProjectProducts::Table, ProjectProducts::DistributorId)
                            .to(Distributors::Table, Distributors::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_project_products_project_type")
                            .from(ProjectProducts::Table, ProjectProducts::ProjectTypeId)
                            .to(ProjectTypes::Table, ProjectTypes::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_project_products_project")
                    .table(ProjectProducts::Table)
                    .col(ProjectProducts::ProjectId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ProjectPresales::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(ProjectPresales::ProjectId).uuid().not_null())
                    .col(ColumnDef::new(ProjectPresales::UserId).uuid().not_null())
                    .primary_key(
                        Index::create()
                            .name("pk_project_presales")
                            .col(ProjectPresales::ProjectId)
                            .col(ProjectPresales::UserId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_project_presales_project")
                            .from(ProjectPresales::Table, ProjectPresales::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_project_presales_user")
                            .from(ProjectPresales::Table, ProjectPresales::UserId)
                            .to(Profiles::Table, Profiles::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ProjectEngineers::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(ProjectEngineers::ProjectId).uuid().not_null())
                    .col(ColumnDef::new(ProjectEngineers::UserId).uuid().not_null())
                    .primary_key(
                        Index::create()
                            .name("pk_project_engineers")
                            .col(ProjectEngineers::ProjectId)
                            .col(ProjectEngineers::UserId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_project_engineers_project")
                            .from(ProjectEngineers::Table, ProjectEngineers::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_project_engineers_user")
                            .from(ProjectEngineers::Table, ProjectEngineers::UserId)
                            .to(Profiles::Table, Profiles::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(ProjectEngineers::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(ProjectPresales::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(ProjectProducts::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(Projects::Table).if_exists().to_owned())
            .await?;
        Ok(())
    }
}
