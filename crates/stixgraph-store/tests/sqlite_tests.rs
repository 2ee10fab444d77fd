//! Tests for the SQLite graph store

use stixgraph_core::{PropertyMap, PropertyValue};
use stixgraph_store::{
    EdgeKey, EdgeOutcome, EdgeWrite, GraphStore, NodeWrite, Provenance, SqliteGraphStore,
    StoreConfig, WriteOutcome,
};

fn sqlite_url(file: &tempfile::NamedTempFile) -> String {
    format!("sqlite://{}", file.path().to_str().unwrap())
}

fn node(id: &str, name: &str, description: &str) -> NodeWrite {
    let mut properties = PropertyMap::new();
    properties.insert("name".into(), PropertyValue::from(name));
    properties.insert("description".into(), PropertyValue::from(description));
    properties.insert("created".into(), PropertyValue::from("2023-10-02T14:00:00.188+02:00"));
    properties.insert("x_mitre_version".into(), PropertyValue::Integer(2));
    NodeWrite {
        id: id.to_string(),
        labels: vec!["SDO".into(), "Malware".into()],
        properties,
        provenance: Provenance::bundle("ics-attack.json"),
    }
}

fn edge(key: EdgeKey, source: &str, target: &str) -> EdgeWrite {
    EdgeWrite {
        key,
        rel_type: "Uses".into(),
        source: source.into(),
        target: target.into(),
        properties: PropertyMap::new(),
        provenance: Provenance::bundle("ics-attack.json"),
    }
}

#[tokio::test]
async fn test_sqlite_node_round_trip() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let store = SqliteGraphStore::connect(&sqlite_url(&file), "ics").await.unwrap();
    let mut session = store.session().await.unwrap();

    let written = node("malware--a", "Stuxnet", "worm");
    assert_eq!(session.upsert_node(written.clone()).await.unwrap(), WriteOutcome::Created);
    assert_eq!(session.upsert_node(written.clone()).await.unwrap(), WriteOutcome::Updated);

    let stored = session.node("malware--a").await.unwrap().unwrap();
    assert_eq!(stored.properties, written.properties);
    assert_eq!(stored.labels, written.labels);
    assert_eq!(stored.provenance, written.provenance);
    assert_eq!(session.statistics().await.unwrap().nodes, 1);
}

#[tokio::test]
async fn test_sqlite_edges_keyed_by_identity() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let store = SqliteGraphStore::connect(&sqlite_url(&file), "ics").await.unwrap();
    let mut session = store.session().await.unwrap();
    session.upsert_node(node("a", "A", "first")).await.unwrap();
    session.upsert_node(node("b", "B", "second")).await.unwrap();

    let explicit = EdgeKey::Explicit("relationship--1".into());
    let derived = EdgeKey::derived("a", "Uses", "b");

    for key in [explicit.clone(), derived.clone()] {
        assert_eq!(
            session.upsert_edge(edge(key.clone(), "a", "b")).await.unwrap(),
            EdgeOutcome::Written(WriteOutcome::Created)
        );
        assert_eq!(
            session.upsert_edge(edge(key, "a", "b")).await.unwrap(),
            EdgeOutcome::Written(WriteOutcome::Updated)
        );
    }

    assert_eq!(
        session.upsert_edge(edge(EdgeKey::Explicit("relationship--2".into()), "a", "zzz")).await.unwrap(),
        EdgeOutcome::MissingEndpoint("zzz".into())
    );

    let stats = session.statistics().await.unwrap();
    assert_eq!(stats.edges, 2);
    assert_eq!(stats.derived_edges, 1);
    assert_eq!(session.edge(&derived).await.unwrap().unwrap().key, derived);
    assert_eq!(session.edge(&explicit).await.unwrap().unwrap().source, "a");

    let documents = session.documents().await.unwrap();
    assert_eq!(documents.len(), 2);
    assert_eq!(documents[0].text(), "A. first. Related to B via Uses. Related to B via Uses");
}

#[tokio::test]
async fn test_sqlite_persists_across_connections() {
    let file = tempfile::NamedTempFile::new().unwrap();
    {
        let store = SqliteGraphStore::connect(&sqlite_url(&file), "enterprise").await.unwrap();
        let mut session = store.session().await.unwrap();
        session.upsert_node(node("a", "A", "first")).await.unwrap();
        assert!(session.put_embedding("a", "nomic-embed-text", &[0.5, 0.25]).await.unwrap());
        drop(session);
        store.close().await;
    }

    let store = SqliteGraphStore::connect(&sqlite_url(&file), "enterprise").await.unwrap();
    let mut session = store.session().await.unwrap();
    assert!(session.node("a").await.unwrap().is_some());
    let embeddings = session.embeddings().await.unwrap();
    assert_eq!(embeddings[0].vector, vec![0.5, 0.25]);
    assert_eq!(embeddings[0].model, "nomic-embed-text");
    drop(session);

    // another graph name sees nothing
    let other = SqliteGraphStore::connect(&sqlite_url(&file), "mobile").await.unwrap();
    let mut session = other.session().await.unwrap();
    assert_eq!(session.statistics().await.unwrap().nodes, 0);
}

#[tokio::test]
async fn test_store_config_opens_sqlite() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let config = StoreConfig {
        database: Some("ics".into()),
        ..StoreConfig::new(sqlite_url(&file))
    };
    let store = config.open().await.unwrap();
    assert_eq!(store.backend_name(), "sqlite");

    let memory = StoreConfig::new("memory://").open().await.unwrap();
    assert_eq!(memory.backend_name(), "memory");
}
