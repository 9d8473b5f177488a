use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "profiles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub email: String,
    pub full_name: String,
    pub role: Role,
    /// Reporting GM; only ever set for [`Role::Sales`].
    pub gm_id: Option<Uuid>,
    /// Only ever set for [`Role::Gm`].
    pub department: Option<String>,
    pub is_active: bool,
    pub avatar_url: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::identity::Entity",
        from = "Column::Id",
        to = "super::identity::Column::Id",
        on_delete = "Cascade"
    )]
    Identity,
    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::GmId",
        to = "Column::Id",
        on_delete = "SetNull"
    )]
    Manager,
    #[sea_orm(has_many = "super::user_certificate::Entity")]
    UserCertificate,
}

impl Related<super::identity::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Identity.def()
    }
}

impl Related<super::user_certificate::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UserCertificate.def()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveActiveEnum, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[sea_orm(rs_type = "String", db_type = "String(Some(32))")]
pub enum Role {
    #[sea_orm(string_value = "Admin")]
    Admin,
    #[sea_orm(string_value = "GM")]
    Gm,
    #[sea_orm(string_value = "Sales")]
    Sales,
    #[sea_orm(string_value = "Presales")]
    Presales,
    #[sea_orm(string_value = "Engineer")]
    Engineer,
    #[sea_orm(string_value = "Project Manager")]
    ProjectManager,
}

impl ActiveModelBehavior for ActiveModel {}
