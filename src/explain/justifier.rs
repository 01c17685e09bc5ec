//! Operator justification
//!
//! Explains each join and scan of the chosen plan by finding the operator
//! that replaced it in a counterfactual plan (one where the chosen algorithm
//! was disabled) and reporting how much cheaper the chosen one is.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::plan::{JoinKind, NodeId, NodeKind, PlanNode, PlanTree, ScanKind, StepSequence};

const NESTED_LOOP_RATIONALE: &str =
    "This join is implemented using nested loop join because the cost of the nested loop is low.";

/// Explanation attached to one step of the primary plan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    /// 1-based step number
    pub step: usize,
    #[serde(skip)]
    pub node: NodeId,
    pub operator: String,
    pub explanations: Vec<String>,
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Step {}: {}", self.step, self.operator)?;
        for line in &self.explanations {
            write!(f, "\n    {}", line)?;
        }
        Ok(())
    }
}

/// The two nearest scanned relations preceding a join in step order, with
/// the number of joins met before each of them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommonRelations {
    pub relation_a: Option<String>,
    pub joins_before_a: usize,
    pub relation_b: Option<String>,
    pub joins_before_b: usize,
}

/// Walk backward from the step at `position`, collecting up to two scanned
/// relations
pub fn find_common_relations(
    tree: &PlanTree,
    steps: &StepSequence,
    position: usize,
) -> CommonRelations {
    let mut found = CommonRelations::default();
    let mut filled = 0;

    for &id in steps.ids()[..position.min(steps.len())].iter().rev() {
        let node = tree.node(id);
        match node.kind {
            NodeKind::Join(_) => {
                if filled == 0 {
                    found.joins_before_a += 1;
                } else {
                    found.joins_before_b += 1;
                }
            }
            NodeKind::Scan(_) => {
                let Some(relation) = node.relation_name() else {
                    continue;
                };
                if filled == 0 {
                    found.relation_a = Some(relation.to_string());
                } else {
                    found.relation_b = Some(relation.to_string());
                }
                filled += 1;
                if filled > 1 {
                    break;
                }
            }
            _ => {}
        }
    }

    found
}

/// `alternate / primary` rounded to two decimals, ties to even
/// (1.125 becomes 1.12)
fn speed_ratio(primary: f64, alternate: f64) -> f64 {
    (alternate / primary * 100.0).round_ties_even() / 100.0
}

/// Whole ratios keep one decimal: `3.0`, `2.5`, `2.33`
fn format_ratio(ratio: f64) -> String {
    if ratio.fract() == 0.0 {
        format!("{:.1}", ratio)
    } else {
        ratio.to_string()
    }
}

/// Scan kinds that count as the same alternative
fn scan_category(kind: ScanKind) -> ScanKind {
    match kind {
        ScanKind::BitmapIndex => ScanKind::BitmapHeap,
        other => other,
    }
}

/// A counterfactual plan prepared for join matching
struct JoinAlternate<'a> {
    tree: &'a PlanTree,
    joins: Vec<(NodeId, CommonRelations)>,
}

impl<'a> JoinAlternate<'a> {
    fn new(tree: &'a PlanTree) -> Self {
        let steps = tree.steps();
        let joins = steps
            .iter()
            .enumerate()
            .filter(|(_, id)| tree.node(*id).kind.is_join())
            .map(|(pos, id)| (id, find_common_relations(tree, &steps, pos)))
            .collect();
        Self { tree, joins }
    }
}

/// Explains join and scan choices of a primary plan against alternates
pub struct OperatorJustifier<'a> {
    primary: &'a PlanTree,
    join_alternates: &'a [PlanTree],
    scan_alternates: &'a [PlanTree],
}

impl<'a> OperatorJustifier<'a> {
    /// `join_alternates` were produced with join algorithms disabled,
    /// `scan_alternates` with scan algorithms disabled
    pub fn new(
        primary: &'a PlanTree,
        join_alternates: &'a [PlanTree],
        scan_alternates: &'a [PlanTree],
    ) -> Self {
        Self {
            primary,
            join_alternates,
            scan_alternates,
        }
    }

    /// One annotation per primary step, in step order
    pub fn justify(&self) -> Vec<Annotation> {
        let steps = self.primary.steps();
        let join_alternates: Vec<_> = self
            .join_alternates
            .iter()
            .map(JoinAlternate::new)
            .collect();
        let primary_joins = steps
            .nodes(self.primary)
            .filter(|n| n.kind.is_join())
            .count();

        let mut join_ordinal = 0;
        let mut annotations = Vec::with_capacity(steps.len());

        for (pos, node) in steps.nodes(self.primary).enumerate() {
            let explanations = match node.kind {
                NodeKind::Join(kind) => {
                    let lines = self.justify_join(
                        node,
                        kind,
                        &steps,
                        pos,
                        join_ordinal,
                        primary_joins,
                        &join_alternates,
                    );
                    join_ordinal += 1;
                    lines
                }
                NodeKind::Scan(kind) => self.justify_scan(node, kind),
                NodeKind::Sort
                | NodeKind::Aggregate
                | NodeKind::Unique
                | NodeKind::Limit
                | NodeKind::Gather
                | NodeKind::Hash
                | NodeKind::Other => Vec::new(),
            };

            annotations.push(Annotation {
                step: pos + 1,
                node: node.id,
                operator: node.display_name().to_string(),
                explanations,
            });
        }

        annotations
    }

    #[allow(clippy::too_many_arguments)]
    fn justify_join(
        &self,
        node: &PlanNode,
        kind: JoinKind,
        steps: &StepSequence,
        pos: usize,
        ordinal: usize,
        primary_joins: usize,
        alternates: &[JoinAlternate<'_>],
    ) -> Vec<String> {
        if kind == JoinKind::NestedLoop {
            return vec![NESTED_LOOP_RATIONALE.to_string()];
        }

        let relations = find_common_relations(self.primary, steps, pos);
        let mut used: HashSet<JoinKind> = HashSet::new();
        let mut lines = Vec::new();

        for (i, alternate) in alternates.iter().enumerate() {
            if alternate.joins.len() != primary_joins {
                debug!(
                    alternate = i,
                    joins = alternate.joins.len(),
                    expected = primary_joins,
                    "Skipping alternate with a different join count"
                );
                continue;
            }

            let Some(matched) = Self::match_join(node, &relations, ordinal, alternate, &used)
            else {
                continue;
            };
            let other = alternate.tree.node(matched);

            let (mine, theirs) = (node.exclusive_cost(), other.exclusive_cost());
            debug!(
                step = pos + 1,
                primary = %node.name,
                primary_cost = mine,
                alternate = %other.name,
                alternate_cost = theirs,
                "Comparing join"
            );

            if mine > 0.0 && mine < theirs {
                lines.push(format!(
                    "{} is {} times faster than {}.",
                    node.name,
                    format_ratio(speed_ratio(mine, theirs)),
                    other.name
                ));
                if let NodeKind::Join(other_kind) = other.kind {
                    used.insert(other_kind);
                }
            }
        }

        if lines.is_empty() {
            lines.push(format!("{} is faster than other join operations.", node.name));
        }
        lines
    }

    /// Find the join of `alternate` that stands in for `node`
    ///
    /// Tiers are tried in order: the full relation tuple, the first relation
    /// with its join distance, both relations, then the join at the same
    /// ordinal position.
    fn match_join(
        node: &PlanNode,
        relations: &CommonRelations,
        ordinal: usize,
        alternate: &JoinAlternate<'_>,
        used: &HashSet<JoinKind>,
    ) -> Option<NodeId> {
        let tiers: [fn(&CommonRelations, &CommonRelations) -> bool; 3] = [
            |a, b| a == b,
            |a, b| a.relation_a == b.relation_a && a.joins_before_a == b.joins_before_a,
            |a, b| a.relation_a == b.relation_a && a.relation_b == b.relation_b,
        ];

        for (tier, matches) in tiers.iter().enumerate() {
            let found = alternate.joins.iter().find(|(id, theirs)| {
                alternate.tree.node(*id).kind != node.kind && matches(relations, theirs)
            });
            if let Some((id, _)) = found {
                debug!(tier = tier + 1, "Matched alternate join by relations");
                return Some(*id);
            }
        }

        let (id, _) = alternate.joins.get(ordinal)?;
        let other = alternate.tree.node(*id);
        if let NodeKind::Join(other_kind) = other.kind {
            if used.contains(&other_kind) {
                return None;
            }
        }
        if other.kind == node.kind {
            return None;
        }
        debug!(ordinal, "Matched alternate join by position");
        Some(*id)
    }

    fn justify_scan(&self, node: &PlanNode, kind: ScanKind) -> Vec<String> {
        let Some(relation) = node.relation_name() else {
            return Vec::new();
        };

        if kind == ScanKind::Seq {
            return vec![format!(
                "Relation {} is read using Sequential Scan because no index is available on it.",
                relation
            )];
        }

        let mut used: HashSet<ScanKind> = HashSet::new();
        let mut lines = Vec::new();

        for alternate in self.scan_alternates {
            let steps = alternate.steps();
            let found = steps.nodes(alternate).find(|other| match other.kind {
                NodeKind::Scan(other_kind) => {
                    other.relation_name() == Some(relation)
                        && other_kind != kind
                        && !used.contains(&scan_category(other_kind))
                }
                _ => false,
            });

            let Some(other) = found else {
                debug!(relation, "No alternate scan of relation");
                continue;
            };

            let (mine, theirs) = (node.exclusive_cost(), other.exclusive_cost());
            if mine > 0.0 && mine < theirs {
                lines.push(format!(
                    "{} is {} times faster than {} on relation {}.",
                    node.name,
                    format_ratio(speed_ratio(mine, theirs)),
                    other.display_name(),
                    relation
                ));
                if let NodeKind::Scan(other_kind) = other.kind {
                    used.insert(scan_category(other_kind));
                }
            }
        }

        if lines.is_empty() {
            lines.push(format!(
                "{} on relation {} is faster than other scan operations.",
                node.name, relation
            ));
        }
        lines
    }
}
