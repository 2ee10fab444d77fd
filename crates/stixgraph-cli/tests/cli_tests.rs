//! Tests for the cli crate

use clap::Parser;
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use stixgraph_cli::commands::{Cli, CommandExecutor, Commands, OutputFormat};
use stixgraph_store::{StoreBackend, StoreConfig, DEFAULT_STORE_URI};

const MALWARE: &str = "malware--088f1d6e-0783-47c6-9923-9c79b2af43d4";

fn bundle_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        "{}",
        json!({"type": "bundle", "objects": [
            {"type": "malware", "id": MALWARE, "name": "Stuxnet", "description": "A worm"},
            {"type": "relationship", "id": "relationship--7c8d9e0f-1a2b-4c3d-8e5f-6a7b8c9d0e1f",
             "relationship_type": "uses", "source_ref": MALWARE,
             "target_ref": "attack-pattern--0a3ead4e-6d47-4ccb-854c-a6a4f9d96b22"}
        ]})
    )
    .unwrap();
    file
}

#[test]
fn test_cli_parsing_info() {
    let args = vec!["stixgraph", "info"];
    let cli = Cli::try_parse_from(args).unwrap();

    match cli.command {
        Commands::Info => {} // Expected
        _ => panic!("Expected Info command"),
    }
}

#[test]
fn test_cli_parsing_load_multiple_files() {
    let args = vec![
        "stixgraph", "load", "--file", "enterprise-attack.json", "ics-attack.json", "--strict",
        "--format", "json",
    ];
    let cli = Cli::try_parse_from(args).unwrap();

    match cli.command {
        Commands::Load { files, strict, format } => {
            assert_eq!(
                files,
                vec![
                    PathBuf::from("enterprise-attack.json"),
                    PathBuf::from("ics-attack.json")
                ]
            );
            assert!(strict);
            assert_eq!(format, OutputFormat::Json);
        }
        _ => panic!("Expected Load command"),
    }
}

#[test]
fn test_cli_parsing_load_requires_file() {
    assert!(Cli::try_parse_from(vec!["stixgraph", "load"]).is_err());
}

#[test]
fn test_cli_parsing_search_defaults() {
    let args = vec!["stixgraph", "search", "--query", "lateral movement"];
    let cli = Cli::try_parse_from(args).unwrap();

    match cli.command {
        Commands::Search { query, top_k, model, format, .. } => {
            assert_eq!(query, "lateral movement");
            assert_eq!(top_k, 10);
            assert_eq!(model, "nomic-embed-text");
            assert_eq!(format, OutputFormat::Text);
        }
        _ => panic!("Expected Search command"),
    }
}

#[test]
fn test_cli_parsing_store_flags() {
    let args = vec![
        "stixgraph", "stats", "--db-uri", "sqlite://graph.db", "--db-name", "ics",
        "--db-password", "secret",
    ];
    let cli = Cli::try_parse_from(args).unwrap();
    let config = cli.store.config();
    assert_eq!(config.uri, "sqlite://graph.db");
    assert_eq!(config.graph(), "ics");
    assert!(!format!("{:?}", config).contains("secret"));
}

#[tokio::test]
async fn test_load_then_stats_in_memory() {
    let file = bundle_file();
    let executor = CommandExecutor::connect(StoreConfig::new("memory://")).await.unwrap();

    let result = executor
        .execute(Commands::Load {
            files: vec![file.path().to_path_buf()],
            strict: false,
            format: OutputFormat::Json,
        })
        .await
        .unwrap();
    assert!(result.success);
    let data = result.data.unwrap();
    assert_eq!(data["loads"][0]["report"]["nodes_created"], 1);
    assert_eq!(data["loads"][0]["report"]["skipped"].as_array().unwrap().len(), 1);

    let result = executor
        .execute(Commands::Stats { format: OutputFormat::Text })
        .await
        .unwrap();
    assert_eq!(result.data.unwrap()["nodes"], 1);
}

#[test]
fn test_default_store_is_persistent() {
    let cli = Cli::try_parse_from(vec!["stixgraph", "stats"]).unwrap();
    let config = cli.store.config();
    assert_eq!(config.uri, DEFAULT_STORE_URI);
    assert!(matches!(
        StoreBackend::from_uri(&config.uri).unwrap(),
        StoreBackend::Sqlite { .. }
    ));
}

#[tokio::test]
async fn test_load_then_stats_across_invocations() {
    let dir = tempfile::tempdir().unwrap();
    let file = bundle_file();
    let cli = Cli::try_parse_from(vec!["stixgraph", "stats"]).unwrap();
    // the default store, relocated into a scratch directory
    let config = StoreConfig {
        uri: format!("sqlite://{}", dir.path().join("stixgraph.db").display()),
        ..cli.store.config()
    };

    {
        let executor = CommandExecutor::connect(config.clone()).await.unwrap();
        let result = executor
            .execute(Commands::Load {
                files: vec![file.path().to_path_buf()],
                strict: false,
                format: OutputFormat::Text,
            })
            .await
            .unwrap();
        assert!(result.success);
    }

    let executor = CommandExecutor::connect(config).await.unwrap();
    let result = executor
        .execute(Commands::Stats { format: OutputFormat::Json })
        .await
        .unwrap();
    let stats = result.data.unwrap();
    assert_eq!(stats["nodes"], 1);
    assert_eq!(stats["edges"], 0);
}

#[tokio::test]
async fn test_strict_load_failure_is_unsuccessful() {
    let file = bundle_file();
    let executor = CommandExecutor::connect(StoreConfig::new("memory://")).await.unwrap();

    let result = executor
        .execute(Commands::Load {
            files: vec![file.path().to_path_buf(), PathBuf::from("/nonexistent/bundle.json")],
            strict: true,
            format: OutputFormat::Text,
        })
        .await
        .unwrap();
    assert!(!result.success);
    let data = result.data.unwrap();
    assert!(data["loads"][0]["error"].as_str().unwrap().contains("missing node"));
    assert!(data["loads"][1]["error"].as_str().unwrap().contains("malformed bundle"));
}

#[tokio::test]
async fn test_info_reports_backend() {
    let executor = CommandExecutor::connect(StoreConfig::new("memory://")).await.unwrap();
    let result = executor.execute(Commands::Info).await.unwrap();
    let info = result.data.unwrap();
    assert_eq!(info["name"], "stixgraph-cli");
    assert_eq!(info["backend"], "memory");
    assert_eq!(info["graph"], "default");
}

#[tokio::test]
async fn test_unsupported_uri_is_rejected() {
    assert!(CommandExecutor::connect(StoreConfig::new("neo4j://localhost:7687"))
        .await
        .is_err());
}
