use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "certificates")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(indexed)]
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::product_certificate::Entity")]
    ProductCertificate,
    #[sea_orm(has_many = "super::user_certificate::Entity")]
    UserCertificate,
}

impl Related<super::product_certificate::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProductCertificate.def()
    }
}

impl Related<super::user_certificate::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UserCertificate.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
