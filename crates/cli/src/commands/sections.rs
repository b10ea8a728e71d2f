//! `promptloom sections`: show the compiled section plan.

use promptloom_composer::{ConditionRegistry, SectionPlan, TransformRegistry, plan_definitions};
use std::path::Path;

use super::load_config;

pub fn run(config: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let source = if config.sections.is_empty() {
        "built-in"
    } else {
        "configured"
    };
    let plan = SectionPlan::compile(
        plan_definitions(&config)?,
        &TransformRegistry::builtin(),
        &ConditionRegistry::with_defaults(),
    )?;

    println!("🧩 Section plan ({source}, {} sections)", plan.len());
    for (step, section) in plan.ordered().enumerate() {
        let sources: Vec<&str> = section.sources.iter().map(|s| s.name()).collect();
        let transform = section.transform.names().join(" → ");
        println!(
            "  {:>2}. {:<16} p={:<4} when={:<22} fallback={:?}",
            step + 1,
            section.id,
            section.priority,
            section.condition.name(),
            section.fallback,
        );
        if !sources.is_empty() {
            println!("      sources:    {}", sources.join(", "));
        }
        if !transform.is_empty() {
            println!("      transform:  {transform}");
        }
        if !section.depends_on.is_empty() {
            println!("      after:      {}", section.depends_on.join(", "));
        }
    }
    Ok(())
}
