use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(indexed)]
    pub brand_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::brand::Entity",
        from = "Column::BrandId",
        to = "super::brand::Column::Id",
        on_delete = "Cascade"
    )]
    Brand,
    #[sea_orm(has_many = "super::product_certificate::Entity")]
    ProductCertificate,
    #[sea_orm(has_many = "super::distributor_product::Entity")]
    DistributorProduct,
    #[sea_orm(has_many = "super::project_product::Entity")]
    ProjectProduct,
}

impl Related<super::brand::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Brand.def()
    }
}

impl Related<super::product_certificate::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProductCertificate.def()
    }
}

impl Related<super::distributor_product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DistributorProduct.def()
    }
}

impl Related<super::project_product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProjectProduct.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
