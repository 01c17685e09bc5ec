//! Plan explanation
//!
//! Turns a primary plan and its counterfactual alternates into text.
//!
//! ## Pipeline
//!
//! ```text
//! PlanSource
//!   → PlanTreeBuilder::build_envelope() → PlanTree (primary + alternates)
//!   → OperatorJustifier::justify() → Vec<Annotation>
//!   → PlanNarrator::narrate() → Narration
//!   → PlanDiffer::diff() → Vec<PlanDifference>
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use planlens::explain::Explainer;
//! use planlens::source::DirectoryPlanSource;
//!
//! let mut source = DirectoryPlanSource::new("plans/q18");
//! let report = Explainer::default().explain(&mut source, query)?;
//! println!("{}", report);
//! ```

pub mod differ;
pub mod justifier;
pub mod narrator;

pub use differ::{PlanDiffer, PlanDifference};
pub use justifier::{find_common_relations, Annotation, CommonRelations, OperatorJustifier};
pub use narrator::{NarratedPlan, Narration, NarrationContext, NodeNarration, PlanNarrator};

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::ExplainConfig;
use crate::plan::{PlanError, PlanTree, PlanTreeBuilder};
use crate::source::{CapabilitySet, PlanSource, SourceError};

/// Explain pipeline errors
#[derive(Error, Debug)]
pub enum ExplainError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Result type for explain operations
pub type ExplainResult<T> = Result<T, ExplainError>;

/// Differences between the primary plan and one alternate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    /// Label of the disabled capabilities
    pub disabled: String,
    pub differences: Vec<PlanDifference>,
}

/// Everything explained about one query
#[derive(Debug, Clone, Serialize)]
pub struct ExplainReport {
    #[serde(skip)]
    pub primary: PlanTree,
    pub annotations: Vec<Annotation>,
    pub narration: Vec<String>,
    pub comparisons: Vec<Comparison>,
}

impl fmt::Display for ExplainReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Annotations:")?;
        for annotation in &self.annotations {
            writeln!(f, "{}", annotation)?;
        }

        writeln!(f)?;
        writeln!(f, "Narration:")?;
        for line in &self.narration {
            writeln!(f, "{}", line)?;
        }

        for comparison in &self.comparisons {
            writeln!(f)?;
            writeln!(f, "Compared with {} disabled:", comparison.disabled)?;
            if comparison.differences.is_empty() {
                writeln!(f, "  (no structural differences)")?;
            }
            for difference in &comparison.differences {
                writeln!(f, "  - {}", difference.difference)?;
                if !difference.reason.is_empty() {
                    writeln!(f, "    {}", difference.reason)?;
                }
            }
        }
        Ok(())
    }
}

/// Runs the whole explain pipeline against a plan source
#[derive(Debug, Clone, Default)]
pub struct Explainer {
    config: ExplainConfig,
}

impl Explainer {
    pub fn new(config: ExplainConfig) -> Self {
        Self { config }
    }

    /// Fetch, build and explain all plans of `query`
    pub fn explain(
        &self,
        source: &mut dyn PlanSource,
        query: &str,
    ) -> ExplainResult<ExplainReport> {
        let builder = PlanTreeBuilder::new(self.config.cost_source);

        let primary = builder.build_envelope(&source.primary_plan(query)?)?;
        let joins = Self::fetch(source, query, &builder, &self.config.join_alternates)?;
        let scans = Self::fetch(source, query, &builder, &self.config.scan_alternates)?;

        info!(
            nodes = primary.len(),
            join_alternates = joins.len(),
            scan_alternates = scans.len(),
            "Explaining plan"
        );
        Ok(Self::explain_trees(primary, joins, scans))
    }

    /// Explain already-built trees
    pub fn explain_trees(
        primary: PlanTree,
        joins: Vec<(CapabilitySet, PlanTree)>,
        scans: Vec<(CapabilitySet, PlanTree)>,
    ) -> ExplainReport {
        let (join_labels, join_trees): (Vec<_>, Vec<_>) = joins.into_iter().unzip();
        let (scan_labels, scan_trees): (Vec<_>, Vec<_>) = scans.into_iter().unzip();

        let annotations = OperatorJustifier::new(&primary, &join_trees, &scan_trees).justify();
        let narrated = NarratedPlan::new(primary);

        let comparisons = join_labels
            .into_iter()
            .zip(join_trees)
            .chain(scan_labels.into_iter().zip(scan_trees))
            .map(|(disabled, tree)| Comparison {
                disabled: disabled.label(),
                differences: PlanDiffer::diff(&narrated, &NarratedPlan::new(tree)),
            })
            .collect();

        ExplainReport {
            annotations,
            narration: narrated.narration.lines(),
            primary: narrated.tree,
            comparisons,
        }
    }

    /// Fetch one alternate per capability set; sets with no plan are skipped
    fn fetch(
        source: &mut dyn PlanSource,
        query: &str,
        builder: &PlanTreeBuilder,
        sets: &[CapabilitySet],
    ) -> ExplainResult<Vec<(CapabilitySet, PlanTree)>> {
        let mut trees = Vec::with_capacity(sets.len());
        for set in sets {
            let record = match source.alternate_plans(query, std::slice::from_ref(set)) {
                Ok(mut records) => match records.pop() {
                    Some(record) => record,
                    None => continue,
                },
                Err(SourceError::MissingPlan(what)) => {
                    warn!(disabled = %set, "No alternate plan for {}, skipping", what);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            trees.push((set.clone(), builder.build_envelope(&record)?));
        }
        Ok(trees)
    }
}
