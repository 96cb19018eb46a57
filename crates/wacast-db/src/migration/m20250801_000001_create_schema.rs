use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Organizations table
        manager
            .create_table(
                Table::create()
                    .table(Organizations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Organizations::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Organizations::Name).string().not_null())
                    .col(
                        ColumnDef::new(Organizations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Organizations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Business accounts table
        manager
            .create_table(
                Table::create()
                    .table(BusinessAccounts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BusinessAccounts::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(BusinessAccounts::AccountId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(BusinessAccounts::AccessToken)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BusinessAccounts::WebhookSecret)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BusinessAccounts::OrganizationId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BusinessAccounts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(BusinessAccounts::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_business_accounts_organization")
                            .from(BusinessAccounts::Table, BusinessAccounts::OrganizationId)
                            .to(Organizations::Table, Organizations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Contacts table
        manager
            .create_table(
                Table::create()
                    .table(Contacts::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Contacts::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Contacts::OrganizationId).uuid().not_null())
                    .col(ColumnDef::new(Contacts::Phone).string().not_null())
                    .col(
                        ColumnDef::new(Contacts::Name)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(Contacts::Attributes).json_binary().not_null())
                    .col(
                        ColumnDef::new(Contacts::Status)
                            .string()
                            .not_null()
                            .default("Active"),
                    )
                    .col(
                        ColumnDef::new(Contacts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Contacts::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_contacts_organization")
                            .from(Contacts::Table, Contacts::OrganizationId)
                            .to(Organizations::Table, Organizations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // A phone number is unique within its organization
        manager
            .create_index(
                Index::create()
                    .name("idx_contacts_org_phone")
                    .table(Contacts::Table)
                    .col(Contacts::OrganizationId)
                    .col(Contacts::Phone)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Contact lists table
        manager
            .create_table(
                Table::create()
                    .table(ContactLists::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ContactLists::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ContactLists::OrganizationId).uuid().not_null())
                    .col(ColumnDef::new(ContactLists::Name).string().not_null())
                    .col(
                        ColumnDef::new(ContactLists::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ContactLists::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_contact_lists_organization")
                            .from(ContactLists::Table, ContactLists::OrganizationId)
                            .to(Organizations::Table, Organizations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Contact ↔ list membership
        manager
            .create_table(
                Table::create()
                    .table(ContactListMemberships::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ContactListMemberships::ContactId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ContactListMemberships::ContactListId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ContactListMemberships::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(ContactListMemberships::ContactId)
                            .col(ContactListMemberships::ContactListId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_memberships_contact")
                            .from(
                                ContactListMemberships::Table,
                                ContactListMemberships::ContactId,
                            )
                            .to(Contacts::Table, Contacts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_memberships_contact_list")
                            .from(
                                ContactListMemberships::Table,
                                ContactListMemberships::ContactListId,
                            )
                            .to(ContactLists::Table, ContactLists::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Campaigns table
        manager
            .create_table(
                Table::create()
                    .table(Campaigns::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Campaigns::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Campaigns::OrganizationId).uuid().not_null())
                    .col(
                        ColumnDef::new(Campaigns::BusinessAccountId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Campaigns::PhoneNumberToUse)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Campaigns::TemplateId).string().not_null())
                    .col(ColumnDef::new(Campaigns::ParameterBinding).json_binary())
                    .col(
                        ColumnDef::new(Campaigns::Status)
                            .string()
                            .not_null()
                            .default("Draft"),
                    )
                    .col(
                        ColumnDef::new(Campaigns::SentCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Campaigns::ErrorCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Campaigns::LastContactId).uuid())
                    .col(ColumnDef::new(Campaigns::ScheduledAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Campaigns::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Campaigns::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_campaigns_organization")
                            .from(Campaigns::Table, Campaigns::OrganizationId)
                            .to(Organizations::Table, Organizations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_campaigns_business_account")
                            .from(Campaigns::Table, Campaigns::BusinessAccountId)
                            .to(BusinessAccounts::Table, BusinessAccounts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_campaigns_status")
                    .table(Campaigns::Table)
                    .col(Campaigns::Status)
                    .to_owned(),
            )
            .await?;

        // Campaign ↔ contact list join
        manager
            .create_table(
                Table::create()
                    .table(CampaignLists::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(CampaignLists::CampaignId).uuid().not_null())
                    .col(
                        ColumnDef::new(CampaignLists::ContactListId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CampaignLists::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(CampaignLists::CampaignId)
                            .col(CampaignLists::ContactListId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_campaign_lists_campaign")
                            .from(CampaignLists::Table, CampaignLists::CampaignId)
                            .to(Campaigns::Table, Campaigns::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_campaign_lists_contact_list")
                            .from(CampaignLists::Table, CampaignLists::ContactListId)
                            .to(ContactLists::Table, ContactLists::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Conversations table
        manager
            .create_table(
                Table::create()
                    .table(Conversations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Conversations::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Conversations::OrganizationId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Conversations::ContactId).uuid().not_null())
                    .col(
                        ColumnDef::new(Conversations::PhoneNumberUsed)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Conversations::InitiatedBy)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Conversations::InitiatedByCampaignId).uuid())
                    .col(
                        ColumnDef::new(Conversations::Status)
                            .string()
                            .not_null()
                            .default("Active"),
                    )
                    .col(
                        ColumnDef::new(Conversations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Conversations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_conversations_contact")
                            .from(Conversations::Table, Conversations::ContactId)
                            .to(Contacts::Table, Contacts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_conversations_organization")
                            .from(Conversations::Table, Conversations::OrganizationId)
                            .to(Organizations::Table, Organizations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Partial unique index: one Active conversation per (org, contact).
        // sea_query has no partial-index builder, so this one is raw SQL.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_conversations_one_active \
                 ON conversations (organization_id, contact_id) \
                 WHERE status = 'Active'",
            )
            .await?;

        // Messages table
        manager
            .create_table(
                Table::create()
                    .table(Messages::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Messages::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Messages::OrganizationId).uuid().not_null())
                    .col(ColumnDef::new(Messages::ConversationId).uuid())
                    .col(ColumnDef::new(Messages::ContactId).uuid().not_null())
                    .col(ColumnDef::new(Messages::ProviderMessageId).string())
                    .col(ColumnDef::new(Messages::Direction).string().not_null())
                    .col(ColumnDef::new(Messages::Kind).string().not_null())
                    .col(ColumnDef::new(Messages::Payload).json_binary().not_null())
                    .col(ColumnDef::new(Messages::Status).string().not_null())
                    .col(ColumnDef::new(Messages::RepliedTo).string())
                    .col(ColumnDef::new(Messages::CampaignId).uuid())
                    .col(
                        ColumnDef::new(Messages::PhoneNumberUsed)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Messages::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Messages::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_messages_conversation")
                            .from(Messages::Table, Messages::ConversationId)
                            .to(Conversations::Table, Conversations::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_messages_contact")
                            .from(Messages::Table, Messages::ContactId)
                            .to(Contacts::Table, Contacts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Status callbacks look messages up by provider id
        manager
            .create_index(
                Index::create()
                    .name("idx_messages_provider_id")
                    .table(Messages::Table)
                    .col(Messages::ProviderMessageId)
                    .to_owned(),
            )
            .await?;

        // Conversation attribution reads the newest outbound per contact
        manager
            .create_index(
                Index::create()
                    .name("idx_messages_contact_created")
                    .table(Messages::Table)
                    .col(Messages::ContactId)
                    .col(Messages::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Messages::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(Conversations::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(CampaignLists::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(Campaigns::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(ContactListMemberships::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(ContactLists::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(Contacts::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(BusinessAccounts::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(Organizations::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Organizations {
    Table,
    Id,
    Name,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum BusinessAccounts {
    Table,
    Id,
    AccountId,
    AccessToken,
    WebhookSecret,
    OrganizationId,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Contacts {
    Table,
    Id,
    OrganizationId,
    Phone,
    Name,
    Attributes,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ContactLists {
    Table,
    Id,
    OrganizationId,
    Name,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ContactListMemberships {
    Table,
    ContactId,
    ContactListId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Campaigns {
    Table,
    Id,
    OrganizationId,
    BusinessAccountId,
    PhoneNumberToUse,
    TemplateId,
    ParameterBinding,
    Status,
    SentCount,
    ErrorCount,
    LastContactId,
    ScheduledAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum CampaignLists {
    Table,
    CampaignId,
    ContactListId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Conversations {
    Table,
    Id,
    OrganizationId,
    ContactId,
    PhoneNumberUsed,
    InitiatedBy,
    InitiatedByCampaignId,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Messages {
    Table,
    Id,
    OrganizationId,
    ConversationId,
    ContactId,
    ProviderMessageId,
    Direction,
    Kind,
    Payload,
    Status,
    RepliedTo,
    CampaignId,
    PhoneNumberUsed,
    CreatedAt,
    UpdatedAt,
}
