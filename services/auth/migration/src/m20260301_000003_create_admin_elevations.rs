use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AdminElevations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AdminElevations::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AdminElevations::UserId).uuid().not_null())
                    .col(ColumnDef::new(AdminElevations::SessionId).uuid().not_null())
                    .col(
                        ColumnDef::new(AdminElevations::Jti)
                            .uuid()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(AdminElevations::IssuedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AdminElevations::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AdminElevations::RevokedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(AdminElevations::IpAddress).string())
                    .col(ColumnDef::new(AdminElevations::UserAgent).text())
                    .foreign_key(
                        ForeignKey::create()
                            .from(AdminElevations::Table, AdminElevations::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Active-grant lookups filter by (user_id, session_id).
        manager
            .create_index(
                Index::create()
                    .table(AdminElevations::Table)
                    .col(AdminElevations::UserId)
                    .col(AdminElevations::SessionId)
                    .name("idx_admin_elevations_user_session")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AdminElevations::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum AdminElevations {
    Table,
    Id,
    UserId,
    SessionId,
    Jti,
    IssuedAt,
    ExpiresAt,
    RevokedAt,
    IpAddress,
    UserAgent,
}

#[derive(Iden)]
enum Users {
    Table,
    Id,
}
