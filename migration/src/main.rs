//! Schema management CLI for the meters, readings and alerts tables.
//!
//! Reads `DATABASE_URL` from the environment or a `.env` file, e.g.
//! `cargo run -p migration -- up`.

use sea_orm_migration::prelude::*;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    cli::run_cli(migration::Migrator).await;
}
