//! Plan comparison
//!
//! Walks two narrated plans side by side and reports where their operators
//! diverge, with a reason for well-known operator substitutions.

use serde::Serialize;
use tracing::debug;

use super::narrator::NarratedPlan;
use crate::plan::{ConditionRole, JoinKind, NodeId, NodeKind, PlanNode, PlanTree, ScanKind};

/// Leading verb dropped from descriptions in difference entries
const GENERIC_VERB: &str = "Perform ";

/// One point where two plans diverge
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanDifference {
    pub difference: String,
    /// Empty when the substitution has no known explanation
    pub reason: String,
}

/// Structural comparison of two narrated plans
pub struct PlanDiffer;

impl PlanDiffer {
    /// Differences from `primary` to `alternate`, in pre-order of the primary
    pub fn diff(primary: &NarratedPlan, alternate: &NarratedPlan) -> Vec<PlanDifference> {
        let mut out = Vec::new();
        Self::compare(
            primary,
            alternate,
            primary.tree.root(),
            alternate.tree.root(),
            &mut out,
        );
        out
    }

    fn compare(
        a: &NarratedPlan,
        b: &NarratedPlan,
        a_id: NodeId,
        b_id: NodeId,
        out: &mut Vec<PlanDifference>,
    ) {
        let a_id = Self::unwrap(&a.tree, a_id);
        let b_id = Self::unwrap(&b.tree, b_id);
        let (a_node, b_node) = (a.tree.node(a_id), b.tree.node(b_id));
        let same_shape = a_node.children.len() == b_node.children.len();

        if same_shape && Self::same_operator(a_node, b_node) {
            for (&ca, &cb) in a_node.children.iter().zip(&b_node.children) {
                Self::compare(a, b, ca, cb, out);
            }
            return;
        }

        let difference = format!(
            "{} has been transformed to {}",
            strip_verb(a.narration.description(a_id)),
            strip_verb(b.narration.description(b_id))
        );
        debug!(from = %a_node.name, to = %b_node.name, "Plans diverge");
        out.push(PlanDifference {
            difference,
            reason: reason(a_node, b_node),
        });

        // Independent subtrees below a divergence can still differ
        if same_shape && matches!(a_node.children.len(), 1 | 2) {
            for (&ca, &cb) in a_node.children.iter().zip(&b_node.children) {
                Self::compare(a, b, ca, cb, out);
            }
        }
    }

    /// Skip Hash, Sort and Gather wrappers down to the operator they wrap
    fn unwrap(tree: &PlanTree, mut id: NodeId) -> NodeId {
        loop {
            let node = tree.node(id);
            match node.kind {
                NodeKind::Hash | NodeKind::Sort | NodeKind::Gather if node.children.len() == 1 => {
                    id = node.children[0];
                }
                _ => return id,
            }
        }
    }

    fn same_operator(a: &PlanNode, b: &PlanNode) -> bool {
        match (a.kind, b.kind) {
            (NodeKind::Other, NodeKind::Other)
            | (NodeKind::Scan(ScanKind::Other), NodeKind::Scan(ScanKind::Other)) => a.name == b.name,
            (x, y) => x == y,
        }
    }
}

fn strip_verb(description: &str) -> &str {
    description.strip_prefix(GENERIC_VERB).unwrap_or(description)
}

/// Reason for substituting `from` with `to`, empty if unknown
fn reason(from: &PlanNode, to: &PlanNode) -> String {
    match (from.kind, to.kind) {
        (NodeKind::Scan(x), NodeKind::Scan(ScanKind::Seq)) if x.is_index_based() => {
            scan_reason(from, to, from, to)
        }
        (NodeKind::Scan(ScanKind::Seq), NodeKind::Scan(y)) if y.is_index_based() => {
            scan_reason(from, to, to, from)
        }
        (NodeKind::Join(x), NodeKind::Join(y)) if x != y => join_reason(from, to, y),
        _ => String::new(),
    }
}

/// Attribute an index scan searches on
fn index_condition(node: &PlanNode) -> Option<&str> {
    node.condition(ConditionRole::IndexCond)
        .or_else(|| node.condition(ConditionRole::RecheckCond))
}

fn row_change(from: &PlanNode, to: &PlanNode) -> String {
    let (before, after) = (from.rows(), to.rows());
    if after > before {
        format!("increases from {} to {}", before, after)
    } else if after < before {
        format!("decreases from {} to {}", before, after)
    } else {
        format!("stays at {}", before)
    }
}

fn scan_reason(from: &PlanNode, to: &PlanNode, index: &PlanNode, seq: &PlanNode) -> String {
    let relation = from
        .relation_name()
        .or_else(|| to.relation_name())
        .unwrap_or("the relation");

    let index_usage = match index_condition(index) {
        Some(cond) => format!("{} uses the index attribute in {}", index.name, cond),
        None => format!("{} uses no index condition", index.name),
    };
    let seq_usage = "Sequential Scan uses no index attribute";
    let usage = if std::ptr::eq(from, index) {
        format!("On relation {}, {}, while {}.", relation, index_usage, seq_usage)
    } else {
        format!("On relation {}, {}, while {}.", relation, seq_usage, index_usage)
    };

    let mut rows = format!("The actual row count {}.", row_change(from, to));
    if let Some(removed) = seq.rows_removed_by_filter {
        rows.push_str(&format!(
            " Sequential Scan discards {} rows with its filter.",
            removed
        ));
    }

    let filter = seq.condition(ConditionRole::Filter);
    let shift = match (std::ptr::eq(from, index), index_condition(index), filter) {
        (true, Some(cond), Some(filter)) => format!(
            "This is consistent with the index condition {} being applied as the table filter {}.",
            cond, filter
        ),
        (false, Some(cond), Some(filter)) => format!(
            "This is consistent with the table filter {} being replaced by the index condition {}.",
            filter, cond
        ),
        (true, _, _) => {
            "This is not explained by an index condition turning into a table filter.".to_string()
        }
        (false, _, _) => {
            "This is not explained by a table filter turning into an index condition.".to_string()
        }
    };

    format!("{} {} {}", usage, rows, shift)
}

fn join_reason(from: &PlanNode, to: &PlanNode, into: JoinKind) -> String {
    let rows = format!("The actual row count of the join {}.", row_change(from, to));

    let rationale = match into {
        JoinKind::Merge => format!(
            "Merge Join is used because the join keys are sortable and {} uses an equality operator.",
            to.condition(ConditionRole::MergeCond)
                .map(|c| format!("the merge condition {}", c))
                .unwrap_or_else(|| "the join condition".to_string())
        ),
        JoinKind::Hash => format!(
            "Hash Join is used because {} uses an equality operator, so the inner relation can be hashed.",
            to.condition(ConditionRole::HashCond)
                .map(|c| format!("the hash condition {}", c))
                .unwrap_or_else(|| "the join condition".to_string())
        ),
        JoinKind::NestedLoop => format!(
            "Nested Loop is used because {} contains non-equality conditions, which favour a nested loop.",
            to.condition(ConditionRole::JoinFilter)
                .map(|c| format!("the join filter {}", c))
                .unwrap_or_else(|| "the join condition".to_string())
        ),
    };

    format!("{} {}", rows, rationale)
}
