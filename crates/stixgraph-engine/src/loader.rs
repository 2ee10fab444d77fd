//! Bundle load pipeline
//!
//! Objects are validated and partitioned before a session is opened, then
//! written in three passes over one session: SDOs, SROs, derived edges.

use crate::error::LoadError;
use crate::options::{DanglingPolicy, InvalidObjectPolicy, LoadOptions};
use crate::report::{LoadReport, LoadStage, SkipReason};
use chrono::Utc;
use serde_json::Value;
use std::path::Path;
use stixgraph_core::{
    classify, load_bundle, types, Bundle, CoreError, Label, ObjectKind, StixObject, TypeRegistry,
};
use stixgraph_store::{EdgeKey, GraphSession, GraphStore};
use tracing::{debug, info, warn};

/// Loads STIX bundles into a graph store
#[derive(Debug, Clone)]
pub struct BundleLoader {
    options: LoadOptions,
    registry: TypeRegistry,
}

impl BundleLoader {
    pub fn new(options: LoadOptions) -> Self {
        let registry = options.registry();
        Self { options, registry }
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Read a bundle file and load it
    pub async fn load_path(
        &self,
        store: &dyn GraphStore,
        path: impl AsRef<Path>,
    ) -> Result<LoadReport, LoadError> {
        let path = path.as_ref();
        let bundle = load_bundle(path)?;
        self.load(store, &bundle, &path.display().to_string()).await
    }

    /// Load one bundle. `source` is recorded as provenance on every element written.
    pub async fn load(
        &self,
        store: &dyn GraphStore,
        bundle: &Bundle,
        source: &str,
    ) -> Result<LoadReport, LoadError> {
        let mut report = LoadReport::new(source);
        report.objects_read = bundle.len();
        info!("Loading {} objects from {}", bundle.len(), source);

        let partition = self.partition(&bundle.objects, &mut report)?;
        debug!(
            "Partitioned {}: {} domain, {} relationship, {} marker",
            source,
            partition.domain.len(),
            partition.relationships.len(),
            report.markers_ignored
        );

        let session = store.session().await?;
        let mut run = LoadRun {
            session,
            options: &self.options,
            source: source.to_string(),
            report,
        };

        run.upsert_domain_objects(&partition.domain).await?;
        run.upsert_relationships(&partition.relationships).await?;
        run.synthesize(&partition.domain).await?;

        let mut report = run.finish();
        report.finished_at = Some(Utc::now());
        info!(
            "Loaded {}: {} nodes, {} edges, {} skipped",
            source,
            report.nodes_written(),
            report.edges_written(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// Validate raw records and sort them by dispatch kind, keeping file order
    fn partition(&self, objects: &[Value], report: &mut LoadReport) -> Result<Partition, LoadError> {
        let mut partition = Partition::default();

        for raw in objects {
            let object = match StixObject::from_value(raw.clone()) {
                Ok(object) => object,
                Err(err) => {
                    let id = raw.get("id").and_then(Value::as_str).map(str::to_string);
                    invalid(self.options.invalid_objects, report, id, LoadStage::Parse, err)?;
                    continue;
                }
            };

            match self.registry.kind(object.object_type()) {
                ObjectKind::Marker => {
                    debug!("Ignoring marker object {}", object.id());
                    report.markers_ignored += 1;
                }
                ObjectKind::Domain => {
                    let checked = object
                        .check_required(&self.registry)
                        .and_then(|_| object.label());
                    match checked {
                        Ok(label) => {
                            let malformed = if object.is_type(types::ATTACK_PATTERN) {
                                object.malformed_kill_chain_phases()
                            } else {
                                0
                            };
                            if malformed > 0 {
                                let err = CoreError::InvalidObject {
                                    id: object.id().to_string(),
                                    reason: format!(
                                        "{} kill_chain_phases entries without a string `phase_name`",
                                        malformed
                                    ),
                                };
                                let id = Some(object.id().to_string());
                                invalid(self.options.invalid_objects, report, id, LoadStage::Synthesis, err)?;
                            }
                            partition.domain.push(Classified { object, label });
                        }
                        Err(err) => {
                            let id = Some(object.id().to_string());
                            invalid(self.options.invalid_objects, report, id, LoadStage::Sdo, err)?;
                        }
                    }
                }
                ObjectKind::Relationship => {
                    let checked = object.check_required(&self.registry).and_then(|_| {
                        let (source, target) = endpoints(&object)?;
                        let label = classify(object.relationship_type().unwrap_or_default())?;
                        Ok((label, source, target))
                    });
                    match checked {
                        Ok((label, source, target)) => partition.relationships.push(Relationship {
                            object,
                            label,
                            source,
                            target,
                        }),
                        Err(err) => {
                            let id = Some(object.id().to_string());
                            invalid(self.options.invalid_objects, report, id, LoadStage::Sro, err)?;
                        }
                    }
                }
            }
        }

        Ok(partition)
    }
}

impl Default for BundleLoader {
    fn default() -> Self {
        Self::new(LoadOptions::default())
    }
}

/// A validated domain object with the node label it loads under
#[derive(Debug, Clone)]
pub(crate) struct Classified {
    pub object: StixObject,
    pub label: Label,
}

/// A validated relationship with its edge type and string endpoints
#[derive(Debug, Clone)]
pub(crate) struct Relationship {
    pub object: StixObject,
    pub label: Label,
    pub source: String,
    pub target: String,
}

#[derive(Debug, Default)]
struct Partition {
    domain: Vec<Classified>,
    relationships: Vec<Relationship>,
}

/// `source_ref` and `target_ref` must both be strings
fn endpoints(object: &StixObject) -> Result<(String, String), CoreError> {
    let endpoint = |field: &str, value: Option<&str>| {
        value.map(str::to_string).ok_or_else(|| CoreError::InvalidObject {
            id: object.id().to_string(),
            reason: format!("`{}` is not a string", field),
        })
    };
    Ok((
        endpoint("source_ref", object.source_ref())?,
        endpoint("target_ref", object.target_ref())?,
    ))
}

/// State of one load. Owns the session; dropping the run releases it.
pub(crate) struct LoadRun<'a> {
    pub session: Box<dyn GraphSession + 'a>,
    pub options: &'a LoadOptions,
    pub source: String,
    pub report: LoadReport,
}

impl<'a> LoadRun<'a> {
    /// Apply the dangling policy to an edge with an unmatched endpoint
    pub fn dangling(&mut self, key: &EdgeKey, missing: String, stage: LoadStage) -> Result<(), LoadError> {
        match self.options.dangling {
            DanglingPolicy::Fail => Err(LoadError::DanglingReference {
                edge: key.to_string(),
                missing,
            }),
            DanglingPolicy::Skip => {
                warn!("Skipping edge {}: node {} does not exist", key, missing);
                self.report.skip(
                    Some(key.to_string()),
                    stage,
                    SkipReason::DanglingReference { missing },
                );
                Ok(())
            }
        }
    }

    pub fn finish(self) -> LoadReport {
        self.report
    }
}

/// Apply the invalid-object policy to a validation failure
fn invalid(
    policy: InvalidObjectPolicy,
    report: &mut LoadReport,
    id: Option<String>,
    stage: LoadStage,
    err: CoreError,
) -> Result<(), LoadError> {
    let reason = match &err {
        CoreError::InvalidTypeString(value) => SkipReason::InvalidTypeString {
            value: value.clone(),
        },
        other => SkipReason::InvalidObject {
            detail: other.to_string(),
        },
    };

    match policy {
        InvalidObjectPolicy::Fail => Err(match err {
            CoreError::InvalidTypeString(value) => LoadError::InvalidTypeString {
                id: id.unwrap_or_else(|| "<unknown>".to_string()),
                value,
            },
            other => other.into(),
        }),
        InvalidObjectPolicy::Skip => {
            warn!(
                "Skipping {}: {}",
                id.as_deref().unwrap_or("<no id>"),
                reason
            );
            report.skip(id, stage, reason);
            Ok(())
        }
    }
}
