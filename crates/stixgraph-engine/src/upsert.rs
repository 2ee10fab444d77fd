//! SDO and SRO passes

use crate::error::LoadError;
use crate::loader::{Classified, LoadRun, Relationship};
use crate::report::LoadStage;
use stixgraph_store::{EdgeKey, EdgeOutcome, EdgeWrite, NodeWrite, Provenance, SDO_LABEL};
use tracing::{debug, info};

impl<'a> LoadRun<'a> {
    /// Upsert one node per domain object, replacing labels and properties
    pub(crate) async fn upsert_domain_objects(&mut self, objects: &[Classified]) -> Result<(), LoadError> {
        info!("Upserting {} domain objects", objects.len());

        for Classified { object, label } in objects {
            let write = NodeWrite {
                id: object.id().to_string(),
                labels: vec![SDO_LABEL.to_string(), label.to_string()],
                properties: object.properties(),
                provenance: Provenance::bundle(self.source.clone()),
            };
            let outcome = self.session.upsert_node(write).await?;
            debug!("{:?} {} node {}", outcome, label, object.id());
            self.report.record_node(outcome);
        }

        Ok(())
    }

    /// Upsert one edge per relationship object, keyed by the relationship's id
    pub(crate) async fn upsert_relationships(&mut self, relationships: &[Relationship]) -> Result<(), LoadError> {
        info!("Upserting {} relationships", relationships.len());

        for Relationship { object, label, source, target } in relationships {
            let key = EdgeKey::Explicit(object.id().to_string());
            let write = EdgeWrite {
                key: key.clone(),
                rel_type: label.to_string(),
                source: source.clone(),
                target: target.clone(),
                properties: object.properties(),
                provenance: Provenance::bundle(self.source.clone()),
            };

            match self.session.upsert_edge(write).await? {
                EdgeOutcome::Written(outcome) => {
                    debug!("{:?} {} edge {}", outcome, label, key);
                    self.report.record_edge(outcome);
                }
                EdgeOutcome::MissingEndpoint(missing) => {
                    self.dangling(&key, missing, LoadStage::Sro)?;
                }
            }
        }

        Ok(())
    }
}
