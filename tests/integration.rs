// Integration tests for stixgraph components
// These tests run whole bundle loads against every store backend

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;
use stixgraph_core::{Bundle, PropertyValue};
use stixgraph_engine::{
    embed_graph, search, BundleLoader, EmbedError, Embedder, CONTAINS_TECHNIQUE,
    REFERENCES_TACTIC,
};
use stixgraph_store::{EdgeKey, GraphStore, MemoryGraphStore, SqliteGraphStore};

const MATRIX: &str = "x-mitre-matrix--575f48f4-8897-4468-897b-48bb364af6c7";
const INHIBIT: &str = "x-mitre-tactic--b8b6a8b4-6a0c-4f3e-9b7d-2c1e0f9a8b7c";
const IMPAIR: &str = "x-mitre-tactic--c9d8e7f6-a5b4-4c3d-8e2f-1a0b9c8d7e6f";
const BLOCK: &str = "attack-pattern--803ab2b9-2c1d-4e0f-9a8b-7c6d5e4f3a2b";
const MODIFY: &str = "attack-pattern--2aa406ed-81c3-4c1d-ba83-cfbee5a2847a";
const INDUSTROYER: &str = "malware--e401d4fe-f0c9-44f0-98e6-f93487678808";
const SANDWORM: &str = "intrusion-set--381fcf73-60f6-4ab2-9991-6af3cbc35192";
const USES_BLOCK: &str = "relationship--a1b2c3d4-e5f6-4a7b-8c9d-0e1f2a3b4c5d";
const ATTRIBUTED: &str = "relationship--b2c3d4e5-f6a7-4b8c-9d0e-1f2a3b4c5d6e";
const DANGLING: &str = "relationship--c3d4e5f6-a7b8-4c9d-8e1f-2a3b4c5d6e7f";
const UNKNOWN: &str = "tool--d4e5f6a7-b8c9-4d0e-9f1a-2b3c4d5e6f7a";

fn ics_objects(industroyer_description: &str) -> Vec<Value> {
    vec![
        json!({"type": "x-mitre-collection", "id": "x-mitre-collection--90c00720-636b-4485-b342-8751d232bf09",
               "name": "ICS ATT&CK", "x_mitre_contents": [{"object_ref": MATRIX}]}),
        json!({"type": "x-mitre-matrix", "id": MATRIX, "name": "ICS ATT&CK",
               "tactic_refs": [INHIBIT, IMPAIR]}),
        json!({"type": "x-mitre-tactic", "id": INHIBIT, "name": "Inhibit Response Function",
               "x_mitre_shortname": "inhibit-response-function"}),
        json!({"type": "x-mitre-tactic", "id": IMPAIR, "name": "Impair Process Control",
               "x_mitre_shortname": "impair-process-control"}),
        json!({"type": "attack-pattern", "id": BLOCK, "name": "Block Command Message",
               "description": "Adversaries may block a command message from reaching its intended target.",
               "kill_chain_phases": [
                   {"kill_chain_name": "mitre-ics-attack", "phase_name": "inhibit-response-function"}
               ]}),
        json!({"type": "attack-pattern", "id": MODIFY, "name": "Modify Parameter",
               "description": "Adversaries may modify parameters used to instruct industrial control system devices.",
               "kill_chain_phases": [
                   {"kill_chain_name": "mitre-ics-attack", "phase_name": "impair-process-control"},
                   {"kill_chain_name": "mitre-ics-attack", "phase_name": "lateral-movement"}
               ]}),
        json!({"type": "malware", "id": INDUSTROYER, "name": "Industroyer",
               "description": industroyer_description,
               "created": "2021-01-04T20:42:21.997Z", "modified": "2023-03-08T22:03:28.196Z",
               "x_mitre_aliases": ["Industroyer", "CRASHOVERRIDE"]}),
        json!({"type": "intrusion-set", "id": SANDWORM, "name": "Sandworm Team",
               "description": "Sandworm Team is a destructive threat group."}),
        json!({"type": "relationship", "id": USES_BLOCK, "relationship_type": "uses",
               "source_ref": INDUSTROYER, "target_ref": BLOCK}),
        json!({"type": "relationship", "id": ATTRIBUTED, "relationship_type": "uses",
               "source_ref": SANDWORM, "target_ref": INDUSTROYER}),
        json!({"type": "relationship", "id": DANGLING, "relationship_type": "uses",
               "source_ref": SANDWORM, "target_ref": UNKNOWN}),
    ]
}

fn ics_bundle(industroyer_description: &str) -> Bundle {
    Bundle::from_json_str(
        &json!({"type": "bundle", "objects": ics_objects(industroyer_description)}).to_string(),
    )
    .unwrap()
}

async fn sqlite_store(file: &tempfile::NamedTempFile) -> SqliteGraphStore {
    let url = format!("sqlite://{}", file.path().display());
    SqliteGraphStore::connect(&url, "ics-attack").await.unwrap()
}

/// Every edge must join two existing nodes
async fn assert_referentially_complete(store: &dyn GraphStore) {
    let mut session = store.session().await.unwrap();
    let ids: HashSet<String> = session
        .nodes()
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.id)
        .collect();
    for edge in session.edges().await.unwrap() {
        assert!(ids.contains(&edge.source), "dangling source on {}", edge.key);
        assert!(ids.contains(&edge.target), "dangling target on {}", edge.key);
    }
}

async fn check_full_load(store: &dyn GraphStore) {
    let loader = BundleLoader::default();
    let first = loader
        .load(store, &ics_bundle("Industroyer is a sophisticated malware framework."), "ics-attack.json")
        .await
        .unwrap();

    assert_eq!(first.markers_ignored, 1);
    assert_eq!(first.nodes_created, 7);
    assert_eq!(first.edges_created, 2);
    assert_eq!(first.derived_created, 4);
    assert_eq!(first.unmatched_phases, 1);
    assert_eq!(first.skipped.len(), 1);
    assert_eq!(first.skipped[0].id.as_deref(), Some(DANGLING));
    assert_referentially_complete(store).await;

    let before = store.session().await.unwrap().statistics().await.unwrap();
    assert_eq!(before.labels.get("SDO"), Some(&7));
    assert_eq!(before.labels.get("MitreTactic"), Some(&2));
    assert_eq!(before.relationship_types.get(REFERENCES_TACTIC), Some(&2));
    assert_eq!(before.relationship_types.get(CONTAINS_TECHNIQUE), Some(&2));
    assert_eq!(before.relationship_types.get("Uses"), Some(&2));

    // same bundle again changes nothing
    let second = loader
        .load(store, &ics_bundle("Industroyer is a sophisticated malware framework."), "ics-attack.json")
        .await
        .unwrap();
    assert_eq!(second.nodes_created + second.edges_created + second.derived_created, 0);
    let after = store.session().await.unwrap().statistics().await.unwrap();
    assert_eq!(before, after);

    // a revised description is an update in place
    let third = loader
        .load(store, &ics_bundle("Industroyer targets electric grid substations."), "ics-attack-v2.json")
        .await
        .unwrap();
    assert_eq!(third.nodes_created, 0);
    let mut session = store.session().await.unwrap();
    let node = session.node(INDUSTROYER).await.unwrap().unwrap();
    assert_eq!(
        node.text_property("description"),
        Some("Industroyer targets electric grid substations.")
    );
    assert_eq!(
        node.properties.get("x_mitre_aliases"),
        Some(&PropertyValue::from(r#"["Industroyer","CRASHOVERRIDE"]"#))
    );
    assert_eq!(session.statistics().await.unwrap(), after);
    assert_eq!(session.node_count().await.unwrap(), 7);
    assert_eq!(session.edge_count().await.unwrap(), 6);

    let contains = session
        .edge(&EdgeKey::derived(IMPAIR, CONTAINS_TECHNIQUE, MODIFY))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        contains.properties.get("kill_chain_name"),
        Some(&PropertyValue::from("mitre-ics-attack"))
    );
}

#[tokio::test]
async fn test_full_load_memory() {
    let store = MemoryGraphStore::new();
    check_full_load(&store).await;
}

#[tokio::test]
async fn test_full_load_sqlite() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let store = sqlite_store(&file).await;
    check_full_load(&store).await;
}

#[tokio::test]
async fn test_sqlite_load_survives_reconnect() {
    let file = tempfile::NamedTempFile::new().unwrap();
    {
        let store = sqlite_store(&file).await;
        BundleLoader::default()
            .load(&store, &ics_bundle("worm"), "ics-attack.json")
            .await
            .unwrap();
        store.close().await;
    }

    let store = sqlite_store(&file).await;
    let report = BundleLoader::default()
        .load(&store, &ics_bundle("worm"), "ics-attack.json")
        .await
        .unwrap();
    assert_eq!(report.nodes_created, 0);
    assert_eq!(report.nodes_updated, 7);
    assert_eq!(report.derived_updated, 4);
}

/// Vectors from letter frequencies of a few marker words
struct TermEmbedder;

#[async_trait]
impl Embedder for TermEmbedder {
    fn model(&self) -> &str {
        "terms"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let text = text.to_lowercase();
        Ok(["grid", "command", "parameter", "threat"]
            .iter()
            .map(|term| text.matches(term).count() as f32 + 0.01)
            .collect())
    }
}

#[tokio::test]
async fn test_embed_and_search_sqlite() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let store = sqlite_store(&file).await;
    BundleLoader::default()
        .load(&store, &ics_bundle("Industroyer targets electric grid substations."), "ics-attack.json")
        .await
        .unwrap();

    let report = embed_graph(&store, &TermEmbedder).await.unwrap();
    // patterns, malware and intrusion set have a description
    assert_eq!(report.embedded, 4);
    assert!(report.failed.is_empty());

    let hits = search(&store, &TermEmbedder, "grid", 2).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, INDUSTROYER);
    assert_eq!(hits[0].name.as_deref(), Some("Industroyer"));
}
