//! Timeline server - Main entry point
//!
//! All the heavy lifting is done in lib.rs.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    timeline_server::run().await?;
    Ok(())
}
