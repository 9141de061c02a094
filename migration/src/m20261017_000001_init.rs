use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ========== METERS ==========
        // Owned by the registration collaborator; this service only reads them.
        manager
            .create_table(
                Table::create()
                    .table(Meters::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Meters::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Meters::MeterId).string_len(50).not_null())
                    .col(ColumnDef::new(Meters::Name).string_len(100).not_null())
                    .col(ColumnDef::new(Meters::Location).string_len(200))
                    .col(
                        ColumnDef::new(Meters::MeterType)
                            .string_len(20)
                            .not_null()
                            .default("digital"),
                    )
                    .col(ColumnDef::new(Meters::InstallationDate).date().not_null())
                    .col(
                        ColumnDef::new(Meters::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Meters::OwnerId).big_integer().not_null())
                    .col(
                        ColumnDef::new(Meters::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .extra("DEFAULT NOW()"),
                    )
                    .to_owned(),
            )
            .await?;

        // Device identifiers are unique per owning account
        manager
            .create_index(
                Index::create()
                    .name("idx_meters_owner_meter_id")
                    .table(Meters::Table)
                    .col(Meters::OwnerId)
                    .col(Meters::MeterId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // ========== READINGS ==========
        manager
            .create_table(
                Table::create()
                    .table(Readings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Readings::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Readings::MeterId).uuid().not_null())
                    .col(
                        ColumnDef::new(Readings::RecordedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Readings::Volume).double().not_null())
                    .col(ColumnDef::new(Readings::FlowRate).double().not_null())
                    .col(ColumnDef::new(Readings::Temperature).double())
                    .col(
                        ColumnDef::new(Readings::IsLeak)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_readings_meter")
                            .from(Readings::Table, Readings::MeterId)
                            .to(Meters::Table, Meters::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        let db = manager.get_connection();

        // Range and recent queries walk this index backwards; id breaks timestamp ties
        db.execute_unprepared(
            "CREATE INDEX idx_readings_meter_time ON readings (meter_id, recorded_at DESC, id DESC)",
        )
        .await?;

        db.execute_unprepared(
            "ALTER TABLE readings ADD CONSTRAINT chk_readings_non_negative CHECK (volume >= 0 AND flow_rate >= 0)",
        )
        .await?;

        // ========== ALERTS ==========
        manager
            .create_table(
                Table::create()
                    .table(Alerts::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Alerts::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Alerts::MeterId).uuid().not_null())
                    .col(ColumnDef::new(Alerts::AlertType).string_len(20).not_null())
                    .col(ColumnDef::new(Alerts::Message).text().not_null())
                    .col(
                        ColumnDef::new(Alerts::IsResolved)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Alerts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Alerts::ResolvedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_alerts_meter")
                            .from(Alerts::Table, Alerts::MeterId)
                            .to(Meters::Table, Meters::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // resolved_at is set iff the alert is resolved
        db.execute_unprepared(
            "ALTER TABLE alerts ADD CONSTRAINT chk_alerts_resolution CHECK (is_resolved = (resolved_at IS NOT NULL))",
        )
        .await?;

        // Index for active alert queries
        db.execute_unprepared(
            "CREATE INDEX idx_alerts_open ON alerts (meter_id, created_at DESC) WHERE NOT is_resolved",
        )
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Alerts::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Readings::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Meters::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
pub enum Meters {
    Table,
    Id,
    MeterId,
    Name,
    Location,
    MeterType,
    InstallationDate,
    IsActive,
    OwnerId,
    CreatedAt,
}

#[derive(DeriveIden)]
pub enum Readings {
    Table,
    Id,
    MeterId,
    RecordedAt,
    Volume,
    FlowRate,
    Temperature,
    IsLeak,
}

#[derive(DeriveIden)]
enum Alerts {
    Table,
    Id,
    MeterId,
    AlertType,
    Message,
    IsResolved,
    CreatedAt,
    ResolvedAt,
}
