//! Section plan compilation: validation and execution order.
//!
//! A plan is compiled once at startup against the registries it will run
//! with. Every reference problem (unknown transform, unknown dependency,
//! duplicate id or output key, cycle) surfaces here instead of mid-run.

use promptloom_core::CompositionError;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use tracing::warn;

use crate::section::{Condition, ConditionRegistry, SectionDefinition, TransformRef};
use crate::transform::TransformRegistry;

/// Validated sections plus the order they execute in.
#[derive(Debug, Clone)]
pub struct SectionPlan {
    sections: Vec<SectionDefinition>,
    /// Indices into `sections`
    order: Vec<usize>,
}

impl SectionPlan {
    pub fn compile(
        definitions: Vec<SectionDefinition>,
        transforms: &TransformRegistry,
        conditions: &ConditionRegistry,
    ) -> Result<Self, CompositionError> {
        let (sections, disabled): (Vec<_>, Vec<_>) =
            definitions.into_iter().partition(|s| s.enabled);
        let disabled: HashSet<String> = disabled.into_iter().map(|s| s.id).collect();

        let mut ids = HashSet::new();
        let mut output_keys = HashSet::new();
        for section in &sections {
            if !ids.insert(section.id.as_str()) {
                return Err(CompositionError::DuplicateSectionId(section.id.clone()));
            }
            if !output_keys.insert(section.output_key.as_str()) {
                return Err(CompositionError::DuplicateOutputKey {
                    key: section.output_key.clone(),
                });
            }
        }

        for section in &sections {
            validate_references(section, transforms, conditions)?;
        }

        let index: HashMap<&str, usize> = sections
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.as_str(), i))
            .collect();

        // Edges run dependency → dependent
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); sections.len()];
        let mut in_degree: Vec<usize> = vec![0; sections.len()];
        for (i, section) in sections.iter().enumerate() {
            let mut seen = HashSet::new();
            for dep in section.depends_on.iter().filter(|d| !disabled.contains(*d)) {
                let Some(&d) = index.get(dep.as_str()) else {
                    return Err(CompositionError::UnknownDependency {
                        section: section.id.clone(),
                        dependency: dep.clone(),
                    });
                };
                if seen.insert(d) {
                    dependents[d].push(i);
                    in_degree[i] += 1;
                }
            }
        }

        let mut heap: BinaryHeap<Reverse<(i32, usize)>> = sections
            .iter()
            .enumerate()
            .filter(|(i, _)| in_degree[*i] == 0)
            .map(|(i, s)| Reverse((s.priority, i)))
            .collect();

        let mut order = Vec::with_capacity(sections.len());
        while let Some(Reverse((_, i))) = heap.pop() {
            order.push(i);
            for &next in &dependents[i] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    heap.push(Reverse((sections[next].priority, next)));
                }
            }
        }

        if order.len() < sections.len() {
            let cyclic: Vec<String> = sections
                .iter()
                .enumerate()
                .filter(|(i, _)| in_degree[*i] > 0)
                .map(|(_, s)| s.id.clone())
                .collect();
            warn!(sections = ?cyclic, "Section dependencies form a cycle");
            return Err(CompositionError::DependencyCycle(cyclic));
        }

        Ok(Self { sections, order })
    }

    /// Sections in execution order.
    pub fn ordered(&self) -> impl Iterator<Item = &SectionDefinition> {
        self.order.iter().map(|&i| &self.sections[i])
    }

    /// Section ids in execution order.
    pub fn order(&self) -> Vec<&str> {
        self.ordered().map(|s| s.id.as_str()).collect()
    }

    /// Sections in definition order.
    pub fn sections(&self) -> &[SectionDefinition] {
        &self.sections
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

fn validate_references(
    section: &SectionDefinition,
    transforms: &TransformRegistry,
    conditions: &ConditionRegistry,
) -> Result<(), CompositionError> {
    if let TransformRef::Chain(names) = &section.transform
        && names.is_empty()
    {
        return Err(CompositionError::EmptyTransformChain(section.id.clone()));
    }
    for name in section.transform.names() {
        if !transforms.contains(name) {
            warn!(section = %section.id, transform = name, "Unknown transform");
            return Err(CompositionError::UnknownTransform {
                section: section.id.clone(),
                transform: name.to_string(),
            });
        }
    }
    if let Condition::Custom(name) = &section.condition
        && !conditions.contains(name)
    {
        warn!(section = %section.id, condition = %name, "Unknown condition");
        return Err(CompositionError::UnknownCondition {
            section: section.id.clone(),
            condition: name.clone(),
        });
    }
    Ok(())
}
