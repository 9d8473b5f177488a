use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "projects")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(indexed)]
    pub code: String,
    pub value_cents: i64,
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
    pub description: Option<String>,
    #[sea_orm(indexed)]
    pub customer_id: Uuid,
    #[sea_orm(indexed)]
    pub sales_id: Option<Uuid>,
    pub pm_id: Option<Uuid>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::customer::Entity",
        from = "Column::CustomerId",
        to = "super::customer::Column::Id",
        on_delete = "Cascade"
    )]
    Customer,
    #[sea_orm(
        belongs_to = "super::profile::Entity",
        from = "Column::SalesId",
        to = "super::profile::Column::Id",
        on_delete = "SetNull"
    )]
    Sales,
    #[sea_orm(
        belongs_to = "super::profile::Entity",
        from = "Column::PmId",
        to = "super::profile::Column::Id",
        on_delete = "SetNull"
    )]
    ProjectManager,
    #[sea_orm(has_many = "super::project_product::Entity")]
    ProjectProduct,
    #[sea_orm(has_many = "super::project_presales::Entity")]
    ProjectPresales,
    #[sea_orm(has_many = "super::project_engineer::Entity")]
    ProjectEngineer,
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl Related<super::project_product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProjectProduct.def()
    }
}

impl Related<super::project_presales::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProjectPresales.def()
    }
}

impl Related<super::project_engineer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProjectEngineer.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
