//! Database configuration module for `TreeGift`.
//!
//! This module handles `SQLite` database connection and table creation using
//! `SeaORM`. Table creation uses `Schema::create_table_from_entity` so the
//! schema always matches the Rust entity definitions without manual SQL.

use crate::entities::{
    BackgroundJob, GiftCard, GiftCardPlot, GiftCardRequest, GiftRequestUser, PlantTypeTemplate,
    Tree, User,
};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};

/// Establishes a connection to the database at the given URL.
pub async fn create_connection(database_url: &str) -> Result<DatabaseConnection> {
    Database::connect(database_url).await.map_err(Into::into)
}

/// Creates all necessary database tables from the entity definitions.
///
/// Statements use `IF NOT EXISTS`, so restarting against an existing
/// database is safe; column migrations for existing deployments are handled
/// outside this crate.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut request_table = schema.create_table_from_entity(GiftCardRequest);
    let mut card_table = schema.create_table_from_entity(GiftCard);
    let mut recipient_table = schema.create_table_from_entity(GiftRequestUser);
    let mut plot_table = schema.create_table_from_entity(GiftCardPlot);
    let mut tree_table = schema.create_table_from_entity(Tree);
    let mut template_table = schema.create_table_from_entity(PlantTypeTemplate);
    let mut user_table = schema.create_table_from_entity(User);
    let mut job_table = schema.create_table_from_entity(BackgroundJob);

    db.execute(builder.build(request_table.if_not_exists())).await?;
    db.execute(builder.build(card_table.if_not_exists())).await?;
    db.execute(builder.build(recipient_table.if_not_exists())).await?;
    db.execute(builder.build(plot_table.if_not_exists())).await?;
    db.execute(builder.build(tree_table.if_not_exists())).await?;
    db.execute(builder.build(template_table.if_not_exists())).await?;
    db.execute(builder.build(user_table.if_not_exists())).await?;
    db.execute(builder.build(job_table.if_not_exists())).await?;

    Ok(())
}
