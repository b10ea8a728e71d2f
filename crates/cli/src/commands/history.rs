//! `promptloom history`: list a caller's stored compositions.

use promptloom_core::{CallerId, CompositionStatus, CompositionStore};
use promptloom_store::SqliteCompositionStore;
use std::path::Path;

use super::sqlite_url;

pub async fn run(db: &Path, caller: &str) -> anyhow::Result<()> {
    let store = SqliteCompositionStore::new(&sqlite_url(db)).await?;
    let records = store.history(&CallerId::from(caller)).await?;

    if records.is_empty() {
        println!("No compositions stored for {caller}");
        return Ok(());
    }

    println!("📜 Compositions for {caller}");
    for record in &records {
        let marker = match record.status {
            CompositionStatus::Active => "●",
            CompositionStatus::Superseded => "○",
        };
        println!(
            "  {marker} {}  {:<10}  {:<12}  {}",
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            record.status.as_str(),
            record.trigger,
            record.id
        );
    }
    Ok(())
}
