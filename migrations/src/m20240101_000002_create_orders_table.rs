use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Orders::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                    .col(
                        ColumnDef::new(Orders::Waybill)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Orders::SenderName).string().not_null())
                    .col(ColumnDef::new(Orders::ReceiverName).string().not_null())
                    .col(ColumnDef::new(Orders::ReceiverPhone).string().not_null())
                    .col(ColumnDef::new(Orders::PickupAddress).text().not_null())
                    .col(ColumnDef::new(Orders::DeliveryAddress).text().not_null())
                    .col(ColumnDef::new(Orders::OriginProvince).string().not_null())
                    .col(ColumnDef::new(Orders::DestProvince).string().not_null())
                    .col(ColumnDef::new(Orders::ServiceTierId).uuid().not_null())
                    .col(ColumnDef::new(Orders::WeightKg).decimal().not_null())
                    .col(
                        ColumnDef::new(Orders::CodValue)
                            .decimal()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Orders::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Orders::SnapshotPricingId).uuid().not_null())
                    .col(ColumnDef::new(Orders::SnapshotBreakdown).json().not_null())
                    .col(ColumnDef::new(Orders::ShippingFee).decimal().not_null())
                    .col(ColumnDef::new(Orders::TotalOrderValue).decimal().not_null())
                    .col(ColumnDef::new(Orders::PaymentMethod).string().null())
                    .col(ColumnDef::new(Orders::DeliveredAt).timestamp().null())
                    .col(
                        ColumnDef::new(Orders::IsDeleted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Orders::DeletedAt).timestamp().null())
                    .col(ColumnDef::new(Orders::DeletedBy).string().null())
                    .col(ColumnDef::new(Orders::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Orders::UpdatedAt).timestamp().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_orders_status")
                    .table(Orders::Table)
                    .col(Orders::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Orders::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Orders {
    Table,
    Id,
    Waybill,
    SenderName,
    ReceiverName,
    ReceiverPhone,
    PickupAddress,
    DeliveryAddress,
    OriginProvince,
    DestProvince,
    ServiceTierId,
    WeightKg,
    CodValue,
    Status,
    SnapshotPricingId,
    SnapshotBreakdown,
    ShippingFee,
    TotalOrderValue,
    PaymentMethod,
    DeliveredAt,
    IsDeleted,
    DeletedAt,
    DeletedBy,
    CreatedAt,
    UpdatedAt,
}
