//! `promptloom config`: configuration management commands.

use promptloom_composer::{ConditionRegistry, SectionPlan, TransformRegistry, plan_definitions};
use promptloom_config::AppConfig;
use std::path::Path;

use super::load_config;

pub fn validate(path: Option<&Path>) -> anyhow::Result<()> {
    println!("🔍 Validating configuration...");

    let config = match load_config(path) {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");
            config
        }
        Err(e) => {
            println!("   ❌ Config error: {e:#}");
            return Err(e);
        }
    };

    let plan = plan_definitions(&config).and_then(|sections| {
        SectionPlan::compile(
            sections,
            &TransformRegistry::builtin(),
            &ConditionRegistry::with_defaults(),
        )
    });
    let plan = match plan {
        Ok(plan) => {
            println!("   ✅ Section plan compiles ({} sections)", plan.len());
            plan
        }
        Err(e) => {
            println!("   ❌ Section plan error: {e}");
            return Err(e.into());
        }
    };

    let mut warnings = Vec::new();
    if config.memory.alpha == 1.0 {
        warnings.push("memory.alpha = 1.0 ranks memories by confidence alone");
    }
    if config.memory.max_total == 0 {
        warnings.push("memory.max_total = 0 leaves the top-memories list empty");
    }
    if config.sessions.history_limit == 0 {
        warnings.push("sessions.history_limit = 0 makes every caller look new");
    }

    if warnings.is_empty() {
        println!("   ✅ All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   ⚠️  {w}");
        }
    }

    let r = &config.review;
    println!();
    println!(
        "   Review:    reintroduce ≥{}d, deep ≥{}d, apply ≥{}d",
        r.reintroduce_days, r.deep_review_days, r.application_days
    );
    println!(
        "   Classify:  high ≥{}, low ≤{}",
        config.classification.high, config.classification.low
    );
    println!("   Memory:    alpha {}", config.memory.alpha);
    println!("   Sections:  {}", plan.order().join(" → "));

    Ok(())
}

pub fn show(path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub fn path() {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
}

pub fn init() {
    println!("{}", AppConfig::default_toml());
}
