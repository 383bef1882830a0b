//! Basic AxterDB Client Example
//!
//! Connects to an instance, creates a table, inserts two rows and reads them
//! back three ways.
//!
//! Reads `client.json` from the working directory, falling back to the
//! `AXTERDB_NAME`, `AXTERDB_KEY` and `AXTERDB_HOST` environment variables.
//! Start a local instance with `cargo run -p axterdb-stub` (its default key is
//! `admin` on database `main`).
//!
//! Run with: cargo run --example basic

use axterdb_core::telemetry;
use axterdb_rs::{Client, ClientConfig, Row};

fn load_config() -> ClientConfig {
    ClientConfig::load("client.json").unwrap_or_else(|_| {
        let var = |name: &str, fallback: &str| {
            std::env::var(name).unwrap_or_else(|_| fallback.to_string())
        };
        ClientConfig::new(
            var("AXTERDB_NAME", "main"),
            var("AXTERDB_KEY", "admin"),
            var("AXTERDB_HOST", "127.0.0.1:8000"),
        )
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = telemetry::init_activity_log("./logs")?;
    println!("Basic AxterDB Example\n");

    let client = Client::from_config(load_config());
    client.connect().await?;
    println!("✅ Connected to {} ({:?})\n", client.host(), client.latency());

    if !client.table_exists("test").await? {
        client
            .create_table("test", [("row1", "TEXT"), ("row2", "TEXT")])
            .await?;
        println!("✅ Created table 'test'");
    }

    client
        .insert("test", &Row::new().with("row1", "text 1").with("row2", "text 2"))
        .await?;
    client
        .insert("test", &Row::new().with("row1", "text 3").with("row2", "text4"))
        .await?;
    println!("✅ Inserted 2 rows\n");

    // No filter
    let rows = client.select("test", None, &Row::new()).await?;
    println!("All rows: {rows:?}");

    // Filter by amount
    let rows = client.select("test", Some(1), &Row::new()).await?;
    println!("First row: {rows:?}");

    // Filter by value
    let rows = client
        .select("test", None, &Row::new().with("row1", "text 1"))
        .await?;
    println!("Matching 'text 1': {rows:?}");

    client.close();
    println!("\n✅ Done");
    Ok(())
}
