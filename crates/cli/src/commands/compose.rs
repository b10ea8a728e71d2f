//! `promptloom compose`: compose one caller's document.

use anyhow::Context;
use chrono::{DateTime, Utc};
use promptloom_composer::{CompositionResult, Composer, RunConfig};
use promptloom_core::CallerId;
use promptloom_store::{Fixture, InMemoryStore, SqliteCompositionStore};
use std::path::Path;
use std::sync::Arc;

use super::{load_config, sqlite_url};

pub struct ComposeArgs<'a> {
    pub config: Option<&'a Path>,
    pub fixture: &'a Path,
    pub caller: &'a str,
    pub json: bool,
    pub save: Option<&'a Path>,
    pub trigger: &'a str,
    pub at: Option<DateTime<Utc>>,
}

pub async fn run(args: ComposeArgs<'_>) -> anyhow::Result<()> {
    let config = load_config(args.config)?;
    let fixture = Fixture::from_file(args.fixture)
        .with_context(|| format!("Failed to read fixture {}", args.fixture.display()))?;
    let composer = Composer::new(config, Arc::new(InMemoryStore::from_fixture(fixture)))?;

    let caller = CallerId::from(args.caller);
    let run = args.at.map(RunConfig::at).unwrap_or_default();

    let result = match args.save {
        Some(db) => {
            let store = SqliteCompositionStore::new(&sqlite_url(db)).await?;
            let (result, record) = composer
                .compose_and_store(&caller, &run, args.trigger, &store)
                .await?;
            eprintln!("Saved composition {} for {}", record.id, record.caller_id);
            result
        }
        None => composer.compose(&caller, &run).await?,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result.document)?);
    } else {
        print_summary(&result);
    }
    Ok(())
}

fn print_summary(result: &CompositionResult) {
    println!("{}", result.summary);
    println!();

    let meta = &result.metadata;
    println!("── {} ──", meta.caller_id);
    println!("  Activated:  {}", meta.activated.join(", "));
    for skipped in &meta.skipped {
        println!("  Skipped:    {} ({})", skipped.id, skipped.reason);
    }
    if !meta.failed_loaders.is_empty() {
        println!("  ⚠️  Loaders defaulted: {}", meta.failed_loaders.join(", "));
    }
    if let Some(base) = &result.specs.identity_base {
        println!("  Archetype:  {base}");
    }
    println!("  Targets:    {} merged", meta.merged_target_count);
    println!("  Timing:     load {}ms, transform {}ms", meta.load_ms, meta.transform_ms);
}
