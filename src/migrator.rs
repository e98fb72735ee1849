use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_catalog_tables::Migration),
            Box::new(m20240301_000002_create_inventory_lots_table::Migration),
            Box::new(m20240301_000003_create_ticket_tables::Migration),
            Box::new(m20240301_000004_create_product_summaries_table::Migration),
        ]
    }
}

mod m20240301_000001_create_catalog_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Products::Id)
                                .string()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Unit).string().null())
                        .col(ColumnDef::new(Products::Packaging).string().null())
                        .col(ColumnDef::new(Products::StorageTemp).string().null())
                        .col(ColumnDef::new(Products::Manufacturer).string().null())
                        .col(ColumnDef::new(Products::Team).string().null())
                        .col(ColumnDef::new(Products::Subgroup).string().null())
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Partners::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Partners::Id)
                                .string()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Partners::Name).string().not_null())
                        .col(ColumnDef::new(Partners::PartnerType).string().not_null())
                        .col(
                            ColumnDef::new(Partners::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Allowlist::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Allowlist::Email)
                                .string()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Allowlist::Role).string().not_null())
                        .col(
                            ColumnDef::new(Allowlist::AddedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Users::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Users::Id).string().primary_key().not_null())
                        .col(ColumnDef::new(Users::Email).string().not_null())
                        .col(ColumnDef::new(Users::Role).string().not_null())
                        .col(ColumnDef::new(Users::DisplayName).string().null())
                        .col(
                            ColumnDef::new(Users::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_users_email")
                        .table(Users::Table)
                        .col(Users::Email)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Users::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Allowlist::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Partners::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
        Name,
        Unit,
        Packaging,
        StorageTemp,
        Manufacturer,
        Team,
        Subgroup,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Partners {
        Table,
        Id,
        Name,
        PartnerType,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Allowlist {
        Table,
        Email,
        Role,
        AddedAt,
    }

    #[derive(DeriveIden)]
    enum Users {
        Table,
        Id,
        Email,
        Role,
        DisplayName,
        CreatedAt,
    }
}

mod m20240301_000002_create_inventory_lots_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_inventory_lots_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // No foreign key to products: orphaned lots are reported, not prevented.
            manager
                .create_table(
                    Table::create()
                        .table(InventoryLots::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryLots::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryLots::ProductId).string().not_null())
                        .col(ColumnDef::new(InventoryLots::LotNumber).string().null())
                        .col(ColumnDef::new(InventoryLots::ExpiryDate).date().null())
                        .col(
                            ColumnDef::new(InventoryLots::QuantityImported)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryLots::QuantityRemaining)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryLots::QuantityAllocated)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryLots::ImportDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryLots::SupplierId).string().null())
                        .col(ColumnDef::new(InventoryLots::Notes).text().null())
                        .col(ColumnDef::new(InventoryLots::Subgroup).string().null())
                        .col(
                            ColumnDef::new(InventoryLots::Version)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryLots::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryLots::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_lots_product_lot_number")
                        .table(InventoryLots::Table)
                        .col(InventoryLots::ProductId)
                        .col(InventoryLots::LotNumber)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_lots_expiry_date")
                        .table(InventoryLots::Table)
                        .col(InventoryLots::ExpiryDate)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InventoryLots::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum InventoryLots {
        Table,
        Id,
        ProductId,
        LotNumber,
        ExpiryDate,
        QuantityImported,
        QuantityRemaining,
        QuantityAllocated,
        ImportDate,
        SupplierId,
        Notes,
        Subgroup,
        Version,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000003_create_ticket_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_ticket_tables"
        }
    }

    fn ticket_table<T: Iden + Copy + 'static>(
        table: T,
        cols: [T; 9],
    ) -> TableCreateStatement {
        let [
            id,
            partner_id,
            description,
            status,
            created_by,
            created_at,
            updated_at,
            completed_at,
            cancelled_at,
        ] = cols;
        Table::create()
            .table(table)
            .if_not_exists()
            .col(ColumnDef::new(id).uuid().primary_key().not_null())
            .col(ColumnDef::new(partner_id).string().not_null())
            .col(ColumnDef::new(description).text().null())
            .col(ColumnDef::new(status).string().not_null())
            .col(ColumnDef::new(created_by).string().null())
            .col(ColumnDef::new(created_at).timestamp_with_time_zone().not_null())
            .col(ColumnDef::new(updated_at).timestamp_with_time_zone().not_null())
            .col(ColumnDef::new(completed_at).timestamp_with_time_zone().null())
            .col(ColumnDef::new(cancelled_at).timestamp_with_time_zone().null())
            .to_owned()
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(ticket_table(
                    ImportTickets::Table,
                    [
                        ImportTickets::Id,
                        ImportTickets::PartnerId,
                        ImportTickets::Description,
                        ImportTickets::Status,
                        ImportTickets::CreatedBy,
                        ImportTickets::CreatedAt,
                        ImportTickets::UpdatedAt,
                        ImportTickets::CompletedAt,
                        ImportTickets::CancelledAt,
                    ],
                ))
                .await?;

            manager
                .create_table(ticket_table(
                    ExportTickets::Table,
                    [
                        ExportTickets::Id,
                        ExportTickets::PartnerId,
                        ExportTickets::Description,
                        ExportTickets::Status,
                        ExportTickets::CreatedBy,
                        ExportTickets::CreatedAt,
                        ExportTickets::UpdatedAt,
                        ExportTickets::CompletedAt,
                        ExportTickets::CancelledAt,
                    ],
                ))
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ImportTicketItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ImportTicketItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ImportTicketItems::TicketId).uuid().not_null())
                        .col(
                            ColumnDef::new(ImportTicketItems::ProductId)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ImportTicketItems::LotNumber).string().null())
                        .col(ColumnDef::new(ImportTicketItems::ExpiryDate).string().null())
                        .col(
                            ColumnDef::new(ImportTicketItems::Quantity)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ImportTicketItems::Notes).text().null())
                        .col(
                            ColumnDef::new(ImportTicketItems::Position)
                                .integer()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_import_ticket_items_ticket")
                                .from(ImportTicketItems::Table, ImportTicketItems::TicketId)
                                .to(ImportTickets::Table, ImportTickets::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ExportTicketItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ExportTicketItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ExportTicketItems::TicketId).uuid().not_null())
                        .col(ColumnDef::new(ExportTicketItems::LotId).uuid().not_null())
                        .col(
                            ColumnDef::new(ExportTicketItems::ProductId)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ExportTicketItems::LotNumber)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ExportTicketItems::ExpiryDate).date().null())
                        .col(
                            ColumnDef::new(ExportTicketItems::Quantity)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ExportTicketItems::Team).string().null())
                        .col(
                            ColumnDef::new(ExportTicketItems::Position)
                                .integer()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_export_ticket_items_ticket")
                                .from(ExportTicketItems::Table, ExportTicketItems::TicketId)
                                .to(ExportTickets::Table, ExportTickets::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_export_ticket_items_lot_id")
                        .table(ExportTicketItems::Table)
                        .col(ExportTicketItems::LotId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_export_tickets_status")
                        .table(ExportTickets::Table)
                        .col(ExportTickets::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ExportTicketItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ImportTicketItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ExportTickets::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ImportTickets::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden, Clone, Copy)]
    enum ImportTickets {
        Table,
        Id,
        PartnerId,
        Description,
        Status,
        CreatedBy,
        CreatedAt,
        UpdatedAt,
        CompletedAt,
        CancelledAt,
    }

    #[derive(DeriveIden, Clone, Copy)]
    enum ExportTickets {
        Table,
        Id,
        PartnerId,
        Description,
        Status,
        CreatedBy,
        CreatedAt,
        UpdatedAt,
        CompletedAt,
        CancelledAt,
    }

    #[derive(DeriveIden)]
    enum ImportTicketItems {
        Table,
        Id,
        TicketId,
        ProductId,
        LotNumber,
        ExpiryDate,
        Quantity,
        Notes,
        Position,
    }

    #[derive(DeriveIden)]
    enum ExportTicketItems {
        Table,
        Id,
        TicketId,
        LotId,
        ProductId,
        LotNumber,
        ExpiryDate,
        Quantity,
        Team,
        Position,
    }
}

mod m20240301_000004_create_product_summaries_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_product_summaries_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ProductSummaries::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProductSummaries::ProductId)
                                .string()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductSummaries::TotalRemaining)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductSummaries::NearestExpiryDate)
                                .date()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ProductSummaries::LotCount)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ProductSummaries::ProductName).string().null())
                        .col(ColumnDef::new(ProductSummaries::Unit).string().null())
                        .col(ColumnDef::new(ProductSummaries::Packaging).string().null())
                        .col(ColumnDef::new(ProductSummaries::StorageTemp).string().null())
                        .col(ColumnDef::new(ProductSummaries::Manufacturer).string().null())
                        .col(ColumnDef::new(ProductSummaries::Team).string().null())
                        .col(ColumnDef::new(ProductSummaries::Subgroup).string().null())
                        .col(
                            ColumnDef::new(ProductSummaries::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ProductSummaries::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum ProductSummaries {
        Table,
        ProductId,
        TotalRemaining,
        NearestExpiryDate,
        LotCount,
        ProductName,
        Unit,
        Packaging,
        StorageTemp,
        Manufacturer,
        Team,
        Subgroup,
        UpdatedAt,
    }
}
