//! Plan sources
//!
//! The explainer never talks to a database itself. A [`PlanSource`] hands
//! it complete plan records: the plan chosen for a query, and plans captured
//! with some optimizer capabilities switched off.
//!
//! [`DirectoryPlanSource`] serves records captured ahead of time:
//!
//! ```text
//! plans/
//!   primary.json
//!   disable_hashjoin.json
//!   disable_seqscan.json
//!   disable_hashjoin+mergejoin.json
//! ```

pub mod error;

pub use error::{SourceError, SourceResult};

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use tracing::debug;

/// Optimizer capability that can be disabled to obtain a counterfactual plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    HashJoin,
    MergeJoin,
    NestedLoop,
    BitmapScan,
    IndexScan,
    IndexOnlyScan,
    SeqScan,
}

impl Capability {
    /// Join algorithms
    pub const JOINS: [Capability; 3] = [
        Capability::HashJoin,
        Capability::MergeJoin,
        Capability::NestedLoop,
    ];

    /// Scan algorithms
    pub const SCANS: [Capability; 4] = [
        Capability::BitmapScan,
        Capability::IndexScan,
        Capability::IndexOnlyScan,
        Capability::SeqScan,
    ];

    /// Short name used in file names and on the command line
    pub fn key(self) -> &'static str {
        match self {
            Capability::HashJoin => "hashjoin",
            Capability::MergeJoin => "mergejoin",
            Capability::NestedLoop => "nestloop",
            Capability::BitmapScan => "bitmapscan",
            Capability::IndexScan => "indexscan",
            Capability::IndexOnlyScan => "indexonlyscan",
            Capability::SeqScan => "seqscan",
        }
    }

    /// PostgreSQL planner setting controlling this capability
    pub fn setting(self) -> String {
        format!("enable_{}", self.key())
    }

    /// Statement that disables this capability for the session
    pub fn disable_statement(self) -> String {
        format!("SET {} = off", self.setting())
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        let key = key.strip_prefix("enable_").unwrap_or(&key);
        Capability::JOINS
            .iter()
            .chain(Capability::SCANS.iter())
            .copied()
            .find(|c| c.key() == key)
            .ok_or_else(|| format!("unknown capability '{}'", s))
    }
}

/// Set of capabilities disabled together
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn single(capability: Capability) -> Self {
        Self(BTreeSet::from([capability]))
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    /// Each join capability disabled on its own
    pub fn join_alternatives() -> Vec<CapabilitySet> {
        Capability::JOINS.iter().map(|&c| Self::single(c)).collect()
    }

    /// Each scan capability disabled on its own
    pub fn scan_alternatives() -> Vec<CapabilitySet> {
        Capability::SCANS.iter().map(|&c| Self::single(c)).collect()
    }

    /// `SET ... = off` statements for every member
    pub fn disable_statements(&self) -> Vec<String> {
        self.iter().map(Capability::disable_statement).collect()
    }

    /// `hashjoin+mergejoin` style label
    pub fn label(&self) -> String {
        self.iter().map(Capability::key).collect::<Vec<_>>().join("+")
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl FromStr for CapabilitySet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split('+')
            .filter(|part| !part.trim().is_empty())
            .map(Capability::from_str)
            .collect()
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Supplies complete plan records for a query
pub trait PlanSource {
    /// Plan chosen with every capability enabled
    fn primary_plan(&mut self, query: &str) -> SourceResult<Value>;

    /// One plan per entry of `disabled`, in the same order
    fn alternate_plans(&mut self, query: &str, disabled: &[CapabilitySet])
        -> SourceResult<Vec<Value>>;
}

/// Plan source backed by a directory of captured records
#[derive(Debug, Clone)]
pub struct DirectoryPlanSource {
    dir: PathBuf,
}

impl DirectoryPlanSource {
    /// File holding the primary plan
    pub const PRIMARY_FILE: &'static str = "primary.json";

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File holding the plan captured with `disabled` switched off
    pub fn alternate_path(&self, disabled: &CapabilitySet) -> PathBuf {
        self.dir.join(format!("disable_{}.json", disabled.label()))
    }

    fn read(&self, path: &Path, label: &str) -> SourceResult<Value> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SourceError::MissingPlan(label.to_string()))
            }
            Err(source) => {
                return Err(SourceError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        debug!(path = %path.display(), bytes = content.len(), "Read plan record");
        serde_json::from_str(&content).map_err(|source| SourceError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl PlanSource for DirectoryPlanSource {
    fn primary_plan(&mut self, _query: &str) -> SourceResult<Value> {
        let path = self.dir.join(Self::PRIMARY_FILE);
        self.read(&path, "the primary plan")
    }

    fn alternate_plans(
        &mut self,
        _query: &str,
        disabled: &[CapabilitySet],
    ) -> SourceResult<Vec<Value>> {
        disabled
            .iter()
            .map(|set| self.read(&self.alternate_path(set), &format!("disable_{}", set.label())))
            .collect()
    }
}
