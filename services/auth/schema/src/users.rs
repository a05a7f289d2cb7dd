use sea_orm::entity::prelude::*;

/// Minimal user record owned by the auth service.
/// Stores the email used for passcode login and the elevation pointer, which is
/// written in the same transaction as the matching `admin_elevations` row.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub email: String,
    /// Session currently holding admin elevation, if any.
    pub elevated_session_id: Option<Uuid>,
    /// Expiry of that elevation. Inert once in the past, even if never cleared.
    pub elevated_until: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::sessions::Entity")]
    Sessions,
    #[sea_orm(has_many = "super::admin_elevations::Entity")]
    AdminElevations,
}

impl Related<super::sessions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sessions.def()
    }
}

impl Related<super::admin_elevations::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AdminElevations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
