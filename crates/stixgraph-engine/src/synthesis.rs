//! Edges derived from references embedded in objects
//!
//! - matrix `tactic_refs` → `ReferencesTactic` (matrix → tactic)
//! - attack-pattern `kill_chain_phases` → `ContainsTechnique` (tactic → pattern)

use crate::error::LoadError;
use crate::loader::{Classified, LoadRun};
use crate::report::LoadStage;
use std::collections::HashMap;
use stixgraph_core::{types, PropertyMap, PropertyValue, StixObject};
use stixgraph_store::{EdgeKey, EdgeOutcome, EdgeWrite, Provenance};
use tracing::{debug, info, warn};

pub const REFERENCES_TACTIC: &str = "ReferencesTactic";
pub const CONTAINS_TECHNIQUE: &str = "ContainsTechnique";

/// Provenance rule names
pub const MATRIX_RULE: &str = "matrix-tactic-refs";
pub const KILL_CHAIN_RULE: &str = "tactic-kill-chain-phases";

/// Tactic shortname → tactic id, built fresh for each load
#[derive(Debug, Clone, Default)]
pub struct TacticIndex {
    by_shortname: HashMap<String, String>,
}

impl TacticIndex {
    /// Index every `x-mitre-tactic` among `objects`. On a duplicate
    /// shortname the last tactic in bundle order wins.
    pub fn build<'o>(objects: impl IntoIterator<Item = &'o StixObject>) -> Self {
        let mut by_shortname: HashMap<String, String> = HashMap::new();
        for object in objects.into_iter().filter(|o| o.is_type(types::MITRE_TACTIC)) {
            let Some(shortname) = object.x_mitre_shortname() else {
                continue;
            };
            let previous = by_shortname.insert(shortname.to_string(), object.id().to_string());
            if let Some(previous) = previous {
                warn!(
                    "Tactic shortname {:?} used by {} and {}, keeping {}",
                    shortname,
                    previous,
                    object.id(),
                    object.id()
                );
            }
        }
        Self { by_shortname }
    }

    pub fn get(&self, shortname: &str) -> Option<&str> {
        self.by_shortname.get(shortname).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_shortname.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_shortname.is_empty()
    }
}

/// An edge to be written by the synthesizer
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedEdge {
    pub rel_type: &'static str,
    pub source: String,
    pub target: String,
    pub properties: PropertyMap,
    pub rule: &'static str,
}

impl DerivedEdge {
    fn new(rel_type: &'static str, source: &str, target: &str, rule: &'static str) -> Self {
        let mut properties = PropertyMap::new();
        properties.insert("relationship_type".into(), PropertyValue::from(rel_type));
        properties.insert("source_ref".into(), PropertyValue::from(source));
        properties.insert("target_ref".into(), PropertyValue::from(target));
        Self {
            rel_type,
            source: source.to_string(),
            target: target.to_string(),
            properties,
            rule,
        }
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey::derived(&self.source, self.rel_type, &self.target)
    }
}

/// Derived edges planned for a set of domain objects
#[derive(Debug, Clone, Default)]
pub struct SynthesisPlan {
    pub edges: Vec<DerivedEdge>,
    /// Kill-chain phases naming a tactic absent from the bundle
    pub unmatched_phases: usize,
}

/// Plan every derived edge: matrix edges first, then technique edges, each in object order
pub fn plan<'o>(objects: impl IntoIterator<Item = &'o StixObject> + Clone) -> SynthesisPlan {
    let index = TacticIndex::build(objects.clone());
    let mut plan = SynthesisPlan::default();

    for matrix in objects.clone().into_iter().filter(|o| o.is_type(types::MITRE_MATRIX)) {
        for tactic in matrix.tactic_refs() {
            plan.edges
                .push(DerivedEdge::new(REFERENCES_TACTIC, matrix.id(), tactic, MATRIX_RULE));
        }
    }

    for pattern in objects.into_iter().filter(|o| o.is_type(types::ATTACK_PATTERN)) {
        for phase in pattern.kill_chain_phases() {
            match index.get(&phase.phase_name) {
                Some(tactic) => {
                    let mut edge =
                        DerivedEdge::new(CONTAINS_TECHNIQUE, tactic, pattern.id(), KILL_CHAIN_RULE);
                    if let Some(chain) = phase.kill_chain_name {
                        edge.properties
                            .insert("kill_chain_name".into(), PropertyValue::Text(chain));
                    }
                    plan.edges.push(edge);
                }
                None => {
                    debug!(
                        "No tactic for phase {:?} of {}",
                        phase.phase_name,
                        pattern.id()
                    );
                    plan.unmatched_phases += 1;
                }
            }
        }
    }

    plan
}

impl<'a> LoadRun<'a> {
    /// Write derived edges for the loaded domain objects
    pub(crate) async fn synthesize(&mut self, domain: &[Classified]) -> Result<(), LoadError> {
        let plan = plan(domain.iter().map(|c| &c.object));
        info!(
            "Synthesizing {} derived edges ({} unmatched phases)",
            plan.edges.len(),
            plan.unmatched_phases
        );
        self.report.unmatched_phases += plan.unmatched_phases;

        for edge in plan.edges {
            let key = edge.key();
            let write = EdgeWrite {
                key: key.clone(),
                rel_type: edge.rel_type.to_string(),
                source: edge.source,
                target: edge.target,
                properties: edge.properties,
                provenance: Provenance::derived(edge.rule),
            };

            match self.session.upsert_edge(write).await? {
                EdgeOutcome::Written(outcome) => {
                    debug!("{:?} derived edge {}", outcome, key);
                    self.report.record_derived(outcome);
                }
                EdgeOutcome::MissingEndpoint(missing) => {
                    self.dangling(&key, missing, LoadStage::Synthesis)?;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MATRIX: &str = "x-mitre-matrix--575f48f4-8897-4468-897b-48bb364af6c7";
    const COLLECTION: &str = "x-mitre-tactic--5e29b093-294e-49e9-a803-dab3d73b77dd";
    const IMPACT: &str = "x-mitre-tactic--ff048bc0-2a8c-4c2c-a1ae-b1b5b4a4b3a0";
    const PATTERN: &str = "attack-pattern--0a3ead4e-6d47-4ccb-854c-a6a4f9d96b22";

    fn tactic(id: &str, shortname: &str) -> StixObject {
        StixObject::from_value(json!({
            "type": "x-mitre-tactic",
            "id": id,
            "x_mitre_shortname": shortname
        }))
        .unwrap()
    }

    fn objects() -> Vec<StixObject> {
        vec![
            StixObject::from_value(json!({
                "type": "x-mitre-matrix",
                "id": MATRIX,
                "tactic_refs": [COLLECTION, IMPACT]
            }))
            .unwrap(),
            tactic(COLLECTION, "collection"),
            tactic(IMPACT, "impact"),
            StixObject::from_value(json!({
                "type": "attack-pattern",
                "id": PATTERN,
                "kill_chain_phases": [
                    {"kill_chain_name": "mitre-ics-attack", "phase_name": "collection"},
                    {"phase_name": "impact"},
                    {"kill_chain_name": "mitre-ics-attack", "phase_name": "evasion"}
                ]
            }))
            .unwrap(),
        ]
    }

    #[test]
    fn test_tactic_index_last_wins() {
        let first = tactic(COLLECTION, "collection");
        let second = tactic(IMPACT, "collection");
        let index = TacticIndex::build([&first, &second]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("collection"), Some(IMPACT));
        assert_eq!(index.get("impact"), None);
    }

    #[test]
    fn test_plan_edges_and_properties() {
        let objects = objects();
        let plan = plan(objects.iter());

        assert_eq!(plan.edges.len(), 4);
        assert_eq!(plan.unmatched_phases, 1);

        let references: Vec<&DerivedEdge> = plan
            .edges
            .iter()
            .filter(|e| e.rel_type == REFERENCES_TACTIC)
            .collect();
        assert_eq!(references.len(), 2);
        assert_eq!(references[0].source, MATRIX);
        assert_eq!(references[0].target, COLLECTION);
        assert_eq!(references[0].properties.len(), 3);

        let contains: Vec<&DerivedEdge> = plan
            .edges
            .iter()
            .filter(|e| e.rel_type == CONTAINS_TECHNIQUE)
            .collect();
        assert_eq!(contains.len(), 2);
        assert_eq!(contains[0].source, COLLECTION);
        assert_eq!(contains[0].target, PATTERN);
        assert_eq!(
            contains[0].properties.get("kill_chain_name"),
            Some(&PropertyValue::from("mitre-ics-attack"))
        );
        // absent kill_chain_name is omitted, not stored as null
        assert!(!contains[1].properties.contains_key("kill_chain_name"));
        assert_eq!(
            contains[1].properties.get("relationship_type"),
            Some(&PropertyValue::from(CONTAINS_TECHNIQUE))
        );
    }

    #[test]
    fn test_derived_key_is_triple() {
        let objects = objects();
        let plan = plan(objects.iter());
        assert_eq!(
            plan.edges[0].key(),
            EdgeKey::derived(MATRIX, REFERENCES_TACTIC, COLLECTION)
        );
    }
}
