//! Load summaries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use stixgraph_store::WriteOutcome;

/// Pipeline stage an object was skipped in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStage {
    Parse,
    Sdo,
    Sro,
    Synthesis,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    InvalidObject { detail: String },
    InvalidTypeString { value: String },
    DanglingReference { missing: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::InvalidObject { detail } => write!(f, "invalid object: {}", detail),
            SkipReason::InvalidTypeString { value } => write!(f, "invalid type string {:?}", value),
            SkipReason::DanglingReference { missing } => write!(f, "missing node {}", missing),
        }
    }
}

/// An object (or derived edge) that was not written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedObject {
    /// STIX id, or the derived edge description
    pub id: Option<String>,
    pub stage: LoadStage,
    pub reason: SkipReason,
}

/// Summary of one bundle load
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadReport {
    pub source: String,
    pub objects_read: usize,
    pub nodes_created: usize,
    pub nodes_updated: usize,
    pub edges_created: usize,
    pub edges_updated: usize,
    pub derived_created: usize,
    pub derived_updated: usize,
    /// Kill-chain phases with no tactic in this bundle
    pub unmatched_phases: usize,
    pub markers_ignored: usize,
    pub skipped: Vec<SkippedObject>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl LoadReport {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            objects_read: 0,
            nodes_created: 0,
            nodes_updated: 0,
            edges_created: 0,
            edges_updated: 0,
            derived_created: 0,
            derived_updated: 0,
            unmatched_phases: 0,
            markers_ignored: 0,
            skipped: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub(crate) fn record_node(&mut self, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Created => self.nodes_created += 1,
            WriteOutcome::Updated => self.nodes_updated += 1,
        }
    }

    pub(crate) fn record_edge(&mut self, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Created => self.edges_created += 1,
            WriteOutcome::Updated => self.edges_updated += 1,
        }
    }

    pub(crate) fn record_derived(&mut self, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Created => self.derived_created += 1,
            WriteOutcome::Updated => self.derived_updated += 1,
        }
    }

    pub(crate) fn skip(&mut self, id: Option<String>, stage: LoadStage, reason: SkipReason) {
        self.skipped.push(SkippedObject { id, stage, reason });
    }

    pub fn nodes_written(&self) -> usize {
        self.nodes_created + self.nodes_updated
    }

    pub fn edges_written(&self) -> usize {
        self.edges_created + self.edges_updated + self.derived_created + self.derived_updated
    }
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Loaded {} ({} objects)", self.source, self.objects_read)?;
        writeln!(
            f,
            "  nodes:   {} created, {} updated",
            self.nodes_created, self.nodes_updated
        )?;
        writeln!(
            f,
            "  edges:   {} created, {} updated",
            self.edges_created, self.edges_updated
        )?;
        writeln!(
            f,
            "  derived: {} created, {} updated ({} unmatched phases)",
            self.derived_created, self.derived_updated, self.unmatched_phases
        )?;
        write!(f, "  skipped: {}", self.skipped.len())?;
        for skipped in &self.skipped {
            write!(
                f,
                "\n    - {} [{:?}]: {}",
                skipped.id.as_deref().unwrap_or("<no id>"),
                skipped.stage,
                skipped.reason
            )?;
        }
        Ok(())
    }
}
