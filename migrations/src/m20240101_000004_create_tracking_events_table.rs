use sea_orm_migration::prelude::*;

use crate::m20240101_000002_create_orders_table::Orders;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TrackingEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TrackingEvents::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(TrackingEvents::OrderId).uuid().not_null())
                    .col(ColumnDef::new(TrackingEvents::Status).string().not_null())
                    .col(ColumnDef::new(TrackingEvents::Location).string().null())
                    .col(ColumnDef::new(TrackingEvents::BranchId).uuid().null())
                    .col(ColumnDef::new(TrackingEvents::Note).text().null())
                    .col(ColumnDef::new(TrackingEvents::CreatedBy).string().null())
                    .col(
                        ColumnDef::new(TrackingEvents::Timestamp)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TrackingEvents::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tracking_events_order")
                            .from(TrackingEvents::Table, TrackingEvents::OrderId)
                            .to(Orders::Table, Orders::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_tracking_events_order_timestamp")
                    .table(TrackingEvents::Table)
                    .col(TrackingEvents::OrderId)
                    .col(TrackingEvents::Timestamp)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TrackingEvents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum TrackingEvents {
    Table,
    Id,
    OrderId,
    Status,
    Location,
    BranchId,
    Note,
    CreatedBy,
    Timestamp,
    CreatedAt,
}
