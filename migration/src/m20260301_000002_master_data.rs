use sea_orm_migration::prelude::*;

/// Columns shared by every master-data table.
#[derive(DeriveIden)]
enum Master {
    Id,
    Name,
    Description,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

const PLAIN_TABLES: [&str; 7] = [
    "customers",
    "distributors",
    "partnerships",
    "certificates",
    "categories",
    "readiness",
    "project_types",
];

/// `(table, parent column, parent table)`, in creation order.
const CHILD_TABLES: [(&str, &str, &str); 3] = [
    ("sub_categories", "category_id", "categories"),
    ("brands", "sub_category_id", "sub_categories"),
    ("products", "brand_id", "brands"),
];

/// `(table, (owner column, owner table), (target column, target table))`.
const LINK_TABLES: [(&str, (&str, &str), (&str, &str)); 4] = [
    (
        "brand_partnerships",
        ("brand_id", "brands"),
        ("partnership_id", "partnerships"),
    ),
    (
        "product_certificates",
        ("product_id", "products"),
        ("certificate_id", "certificates"),
    ),
    (
        "distributor_products",
        ("distributor_id", "distributors"),
        ("product_id", "products"),
    ),
    (
        "user_certificates",
        ("user_id", "profiles"),
        ("certificate_id", "certificates"),
    ),
];

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in PLAIN_TABLES {
            manager.create_table(master_table(table, None)).await?;
        }
        for (table, column, parent) in CHILD_TABLES {
            manager
                .create_table(master_table(table, Some((column, parent))))
                .await?;
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name(format!("idx_{table}_{column}"))
                        .table(Alias::new(table))
                        .col(Alias::new(column))
                        .to_owned(),
                )
                .await?;
        }
        for (table, owner, target) in LINK_TABLES {
            manager.create_table(link_table(table, owner, target)).await?;
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name(format!("idx_{table}_{}", target.0))
                        .table(Alias::new(table))
                        .col(Alias::new(target.0))
                        .to_owned(),
                )
                .await?;
        }
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let children = CHILD_TABLES.iter().rev().map(|(table, _, _)| *table);
        let links = LINK_TABLES.iter().map(|(table, _, _)| *table);
        for table in links.chain(children).chain(PLAIN_TABLES) {
            manager
                .drop_table(Table::drop().table(Alias::new(table)).if_exists().to_owned())
                .await?;
        }
        Ok(())
    }
}

fn master_table(name: &str, parent: Option<(&str, &str)>) -> TableCreateStatement {
    let mut table = Table::create();
    table
        .table(Alias::new(name))
        .if_not_exists()
        .col(ColumnDef::new(Master::Id).uuid().not_null().primary_key());
    if let Some((column, parent_table)) = parent {
        table
            .col(ColumnDef::new(Alias::new(column)).uuid().not_null())
            .foreign_key(
                ForeignKey::create()
                    .name(format!("fk_{name}_{column}"))
                    .from(Alias::new(name), Alias::new(column))
                    .to(Alias::new(parent_table), Master::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            );
    }
    table
        .col(ColumnDef::new(Master::Name).string_len(200).not_null())
        .col(ColumnDef::new(Master::Description).text())
        .col(
            ColumnDef::new(Master::IsActive)
                .boolean()
                .not_null()
                .default(true),
        )
        .col(
            ColumnDef::new(Master::CreatedAt)
                .timestamp_with_time_zone()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .col(
            ColumnDef::new(Master::UpdatedAt)
                .timestamp_with_time_zone()
                .not_null()
                .default(Expr::current_timestamp()),
        );
    table.to_owned()
}

fn link_table(name: &str, owner: (&str, &str), target: (&str, &str)) -> TableCreateStatement {
    let mut table = Table::create();
    table.table(Alias::new(name)).if_not_exists();
    for (column, _) in [owner, target] {
        table.col(ColumnDef::new(Alias::new(column)).uuid().not_null());
    }
    table.primary_key(
        Index::create()
            .name(format!("pk_{name}"))
            .col(Alias::new(owner.0))
            .col(Alias::new(target.0)),
    );
    for (column, referenced) in [owner, target] {
        table.foreign_key(
            ForeignKey::create()
                .name(format!("fk_{name}_{column}"))
                .from(Alias::new(name), Alias::new(column))
                .to(Alias::new(referenced), Master::Id)
                .on_delete(ForeignKeyAction::Cascade),
        );
    }
    table.to_owned()
}
