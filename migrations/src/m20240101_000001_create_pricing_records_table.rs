use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PricingRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PricingRecords::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PricingRecords::ServiceTierId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PricingRecords::BasePrice)
                            .decimal()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(PricingRecords::OverweightThresholdKg)
                            .decimal()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(PricingRecords::OverweightFee)
                            .decimal()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(PricingRecords::CrossRegionFee)
                            .decimal()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(PricingRecords::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(PricingRecords::EffectiveFrom)
                            .timestamp()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PricingRecords::EffectiveTo).timestamp().null())
                    .col(
                        ColumnDef::new(PricingRecords::IsDeleted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(PricingRecords::DeletedAt).timestamp().null())
                    .col(ColumnDef::new(PricingRecords::DeletedBy).string().null())
                    .col(
                        ColumnDef::new(PricingRecords::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PricingRecords::UpdatedAt).timestamp().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_pricing_records_tier_effective")
                    .table(PricingRecords::Table)
                    .col(PricingRecords::ServiceTierId)
                    .col(PricingRecords::EffectiveFrom)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PricingRecords::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum PricingRecords {
    Table,
    Id,
    ServiceTierId,
    BasePrice,
    OverweightThresholdKg,
    OverweightFee,
    CrossRegionFee,
    IsActive,
    EffectiveFrom,
    EffectiveTo,
    IsDeleted,
    DeletedAt,
    DeletedBy,
    CreatedAt,
    UpdatedAt,
}
