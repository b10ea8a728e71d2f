//! Specification resolution and archetype inheritance.
//!
//! Picks the identity, content and voice specification in effect for a
//! caller from their stacked playbooks plus the global catalog, then folds
//! an identity overlay onto the archetype it extends. Works purely on
//! loaded data; no lookups happen here.

use promptloom_config::ResolverConfig;
use promptloom_core::{Playbook, SpecRole, Specification};
use regex_lite::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// The three specification slots tracked per run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolvedSpecs {
    pub identity: Option<Specification>,
    pub content: Option<Specification>,
    pub voice: Option<Specification>,

    /// Slug of the archetype merged into `identity`, when one was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_base: Option<String>,
}

impl ResolvedSpecs {
    pub fn get(&self, role: SpecRole) -> Option<&Specification> {
        match role {
            SpecRole::Identity => self.identity.as_ref(),
            SpecRole::Content => self.content.as_ref(),
            SpecRole::Voice => self.voice.as_ref(),
            SpecRole::Other => None,
        }
    }

    fn slot(&mut self, role: SpecRole) -> Option<&mut Option<Specification>> {
        match role {
            SpecRole::Identity => Some(&mut self.identity),
            SpecRole::Content => Some(&mut self.content),
            SpecRole::Voice => Some(&mut self.voice),
            SpecRole::Other => None,
        }
    }

    /// Fill `role` unless it is already resolved. Returns whether it was filled.
    fn offer(&mut self, role: SpecRole, spec: &Specification) -> bool {
        match self.slot(role) {
            Some(slot) if slot.is_none() => {
                *slot = Some(spec.clone());
                true
            }
            _ => false,
        }
    }

    fn is_complete(&self) -> bool {
        self.identity.is_some() && self.content.is_some() && self.voice.is_some()
    }
}

/// Derive an archetype slug from an `extends` reference:
/// lower-cased, non-alphanumeric runs collapsed to one hyphen, prefixed.
pub fn archetype_slug(prefix: &str, reference: &str) -> String {
    let mut slug = String::with_capacity(reference.len());
    let mut pending_hyphen = false;
    for c in reference.chars() {
        if c.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    if slug.starts_with(prefix.trim_end_matches('-')) && !prefix.is_empty() {
        // Already carries the prefix (e.g. "spec-tutor")
        let bare = prefix.trim_end_matches('-');
        if slug.len() == bare.len() || slug[bare.len()..].starts_with('-') {
            return slug;
        }
    }
    format!("{prefix}{slug}")
}

pub struct SpecResolver {
    voice_slug: Regex,
    archetype_prefix: String,
}

impl SpecResolver {
    pub fn new(config: &ResolverConfig) -> Result<Self, regex_lite::Error> {
        Ok(Self {
            voice_slug: Regex::new(&config.voice_slug_pattern)?,
            archetype_prefix: config.archetype_slug_prefix.clone(),
        })
    }

    /// Resolve the three slots, then apply archetype inheritance to identity.
    pub fn resolve(
        &self,
        playbooks: &[Playbook],
        system_specs: &[Specification],
        library: &[Specification],
    ) -> ResolvedSpecs {
        let mut resolved = self.select(playbooks, system_specs, library);

        if let Some(identity) = resolved.identity.take() {
            if identity.extends.is_some() {
                let (merged, base) = self.merge_identity_spec(&identity, library);
                resolved.identity_base = base;
                resolved.identity = Some(merged);
            } else {
                resolved.identity = Some(identity);
            }
        }
        resolved
    }

    /// First match per role wins: playbooks by ascending priority, then the
    /// global catalog in order, then a voice lookup by slug pattern.
    pub fn select(
        &self,
        playbooks: &[Playbook],
        system_specs: &[Specification],
        library: &[Specification],
    ) -> ResolvedSpecs {
        let mut resolved = ResolvedSpecs::default();

        let mut ordered: Vec<&Playbook> = playbooks.iter().collect();
        ordered.sort_by_key(|p| p.priority);

        'playbooks: for playbook in ordered {
            for item in playbook
                .items
                .iter()
                .filter(|i| i.enabled && i.spec.is_active)
            {
                if resolved.offer(item.effective_role(), &item.spec) {
                    debug!(
                        role = ?item.effective_role(),
                        slug = %item.spec.slug,
                        playbook = %playbook.id,
                        "Resolved specification from playbook"
                    );
                }
                if resolved.is_complete() {
                    break 'playbooks;
                }
            }
        }

        for spec in system_specs.iter().filter(|s| s.is_active) {
            if resolved.is_complete() {
                break;
            }
            if resolved.offer(spec.effective_role(), spec) {
                debug!(role = ?spec.effective_role(), slug = %spec.slug, "Resolved specification from catalog");
            }
        }

        if resolved.voice.is_none() {
            if let Some(spec) = library
                .iter()
                .find(|s| s.is_active && self.voice_slug.is_match(&s.slug))
            {
                debug!(slug = %spec.slug, "Resolved voice specification by slug");
                resolved.voice = Some(spec.clone());
            }
        }

        resolved
    }

    /// Fold `overlay` onto the archetype its `extends` reference names.
    ///
    /// Returns the merged specification and the base slug when a merge
    /// happened. A missing or inactive base yields the overlay unchanged.
    pub fn merge_identity_spec(
        &self,
        overlay: &Specification,
        library: &[Specification],
    ) -> (Specification, Option<String>) {
        let Some(reference) = overlay.extends.as_deref() else {
            return (overlay.clone(), None);
        };
        let slug = archetype_slug(&self.archetype_prefix, reference);

        let base = match library.iter().find(|s| s.slug == slug) {
            Some(base) if base.is_active => base,
            Some(_) => {
                warn!(overlay = %overlay.slug, base = %slug, "Archetype is inactive; using overlay unmerged");
                return (overlay.clone(), None);
            }
            None => {
                warn!(overlay = %overlay.slug, base = %slug, "Archetype not found; using overlay unmerged");
                return (overlay.clone(), None);
            }
        };

        let mut merged = overlay.clone();
        merged.config = merge_config(&base.config, &overlay.config);
        if merged.description.is_none() {
            merged.description = base.description.clone();
        }
        debug!(overlay = %overlay.slug, base = %slug, "Merged identity archetype");
        (merged, Some(slug))
    }
}

fn parameter_id(param: &Value) -> Option<&str> {
    param.get("id").and_then(|v| v.as_str())
}

fn parameters(config: &Value) -> &[Value] {
    config
        .get("parameters")
        .and_then(|p| p.as_array())
        .map(|a| a.as_slice())
        .unwrap_or(&[])
}

fn constraints(config: &Value) -> &[Value] {
    config
        .get("constraints")
        .and_then(|c| c.as_array())
        .map(|a| a.as_slice())
        .unwrap_or(&[])
}

/// Merge two specification configs.
///
/// Parameters are keyed by id: base order first, an overlay entry replaces
/// the base entry whole, overlay-only ids are appended. Each parameter's
/// `config` object is flattened into the top level (base parameters, then
/// overlay parameters; later keys win). Other top-level keys copy base then
/// overlay. Constraints concatenate, base then overlay.
fn merge_config(base: &Value, overlay: &Value) -> Value {
    let base_params = parameters(base);
    let overlay_params = parameters(overlay);

    let mut merged_params: Vec<Value> = Vec::new();
    let mut index_of: Vec<(String, usize)> = Vec::new();
    for param in base_params.iter().chain(overlay_params) {
        match parameter_id(param) {
            Some(id) => match index_of.iter().find(|(known, _)| known == id) {
                Some((_, idx)) => merged_params[*idx] = param.clone(),
                None => {
                    index_of.push((id.to_string(), merged_params.len()));
                    merged_params.push(param.clone());
                }
            },
            None => merged_params.push(param.clone()),
        }
    }

    let mut out = Map::new();
    for param in base_params.iter().chain(overlay_params) {
        if let Some(Value::Object(cfg)) = param.get("config") {
            for (k, v) in cfg {
                out.insert(k.clone(), v.clone());
            }
        }
    }

    for source in [base, overlay] {
        if let Value::Object(map) = source {
            for (k, v) in map {
                if k != "parameters" && k != "constraints" {
                    out.insert(k.clone(), v.clone());
                }
            }
        }
    }

    let had_params = base.get("parameters").is_some() || overlay.get("parameters").is_some();
    if had_params {
        out.insert("parameters".into(), Value::Array(merged_params));
    }

    let had_constraints =
        base.get("constraints").is_some() || overlay.get("constraints").is_some();
    if had_constraints {
        let all: Vec<Value> = constraints(base)
            .iter()
            .chain(constraints(overlay))
            .cloned()
            .collect();
        out.insert("constraints".into(), Value::Array(all));
    }

    Value::Object(out)
}
