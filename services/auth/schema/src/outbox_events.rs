use sea_orm::entity::prelude::*;

/// Pending outbound message (passcode emails).
/// The mail worker drains rows with `delivered_at IS NULL AND deliver_after <= now()`;
/// this service only inserts.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "outbox_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub kind: String,
    /// Delivery address, kept out of `payload` so the worker can index/redact it.
    pub recipient: String,
    pub payload: Json,
    #[sea_orm(unique)]
    pub idempotency_key: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Messages older than their passcode's expiry are pointless; the worker may drop them.
    pub deliver_after: chrono::DateTime<chrono::Utc>,
    pub discard_after: chrono::DateTime<chrono::Utc>,
    pub delivered_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
