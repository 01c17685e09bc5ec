//! Plan tree builder
//!
//! Converts nested JSON plan records into [`PlanTree`] arenas.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use tracing::debug;

use super::error::{PlanError, PlanResult};
use super::{
    Condition, ConditionRole, CostPair, NodeId, NodeKind, PlanNode, PlanTree, RelationRef,
};

/// Which cost pair a node's exclusive cost is computed from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CostSource {
    /// `Startup Cost` / `Total Cost`
    Estimated,
    /// `Actual Startup Time` / `Actual Total Time`
    #[default]
    Actual,
}

impl FromStr for CostSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "estimated" | "estimate" | "cost" => Ok(CostSource::Estimated),
            "actual" | "measured" | "time" => Ok(CostSource::Actual),
            other => Err(format!(
                "unknown cost source '{}' (expected 'estimated' or 'actual')",
                other
            )),
        }
    }
}

impl fmt::Display for CostSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CostSource::Estimated => write!(f, "estimated"),
            CostSource::Actual => write!(f, "actual"),
        }
    }
}

/// Builder for plan trees
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanTreeBuilder {
    cost_source: CostSource,
}

impl PlanTreeBuilder {
    pub fn new(cost_source: CostSource) -> Self {
        Self { cost_source }
    }

    /// Build a tree from a plan wrapped in its result envelope
    ///
    /// The driver envelope nests the plan as `record[0][0][0]["Plan"]`. The
    /// unwrapped forms `[{"Plan": ..}]`, `{"Plan": ..}` and a bare plan node
    /// are accepted as well.
    pub fn build_envelope(&self, record: &Value) -> PlanResult<PlanTree> {
        let plan = Self::unwrap_envelope(record)?;
        self.build(plan)
    }

    /// Locate the root plan node inside an envelope
    pub fn unwrap_envelope(record: &Value) -> PlanResult<&Value> {
        if let Some(plan) = record
            .get(0)
            .and_then(|row| row.get(0))
            .and_then(|col| col.get(0))
            .and_then(|doc| doc.get("Plan"))
        {
            return Ok(plan);
        }
        if let Some(plan) = record.get(0).and_then(|doc| doc.get("Plan")) {
            return Ok(plan);
        }
        if let Some(plan) = record.get("Plan") {
            return Ok(plan);
        }
        if record.get("Node Type").is_some() {
            return Ok(record);
        }
        Err(PlanError::Envelope(
            "expected record[0][0][0][\"Plan\"] or a plan node".to_string(),
        ))
    }

    /// Build a tree from a root plan node
    pub fn build(&self, plan: &Value) -> PlanResult<PlanTree> {
        let mut nodes: Vec<PlanNode> = Vec::new();
        let mut work: VecDeque<(&Value, Option<NodeId>)> = VecDeque::new();
        work.push_back((plan, None));

        while let Some((record, parent)) = work.pop_front() {
            let id = NodeId(nodes.len());
            let node = self.build_node(record, id, parent)?;
            nodes.push(node);

            if let Some(parent) = parent {
                nodes[parent.0].children.push(id);
            }

            match record.get("Plans") {
                None | Some(Value::Null) => {}
                Some(Value::Array(children)) => {
                    for child in children {
                        work.push_back((child, Some(id)));
                    }
                }
                Some(_) => {
                    return Err(PlanError::Format(format!(
                        "\"Plans\" of node {} is not an array",
                        id
                    )))
                }
            }
        }

        debug!(nodes = nodes.len(), cost_source = %self.cost_source, "Built plan tree");
        Ok(PlanTree::from_nodes(nodes, NodeId(0)))
    }

    fn build_node(&self, record: &Value, id: NodeId, parent: Option<NodeId>) -> PlanResult<PlanNode> {
        if !record.is_object() {
            return Err(PlanError::Format(format!(
                "plan node {} is not an object",
                id
            )));
        }

        let name = str_field(record, "Node Type")
            .ok_or_else(|| PlanError::Format(format!("node {} has no \"Node Type\"", id)))?;
        let kind = NodeKind::parse(&name);

        let relation = match kind {
            NodeKind::Scan(_) => str_field(record, "Relation Name").map(|name| RelationRef {
                name,
                schema: str_field(record, "Schema"),
                alias: str_field(record, "Alias"),
            }),
            _ => None,
        };

        let conditions = ConditionRole::ALL
            .iter()
            .filter_map(|&role| {
                str_field(record, role.field()).map(|text| Condition { role, text })
            })
            .collect();

        Ok(PlanNode {
            id,
            parent,
            children: Vec::new(),
            cost: self.cost_pair(record, id),
            plan_rows: f64_field(record, "Plan Rows").unwrap_or(0.0),
            actual_rows: f64_field(record, "Actual Rows"),
            relation,
            index_name: str_field(record, "Index Name"),
            conditions,
            group_key: list_field(record, "Group Key"),
            sort_key: list_field(record, "Sort Key"),
            sort_method: str_field(record, "Sort Method"),
            join_type: str_field(record, "Join Type"),
            strategy: str_field(record, "Strategy"),
            parent_relationship: str_field(record, "Parent Relationship"),
            subplan_name: str_field(record, "Subplan Name"),
            rows_removed_by_filter: f64_field(record, "Rows Removed by Filter"),
            name,
            kind,
        })
    }

    fn cost_pair(&self, record: &Value, id: NodeId) -> CostPair {
        let estimated = || {
            CostPair::new(
                f64_field(record, "Startup Cost").unwrap_or(0.0),
                f64_field(record, "Total Cost").unwrap_or(0.0),
            )
        };

        match self.cost_source {
            CostSource::Estimated => estimated(),
            CostSource::Actual => match (
                f64_field(record, "Actual Startup Time"),
                f64_field(record, "Actual Total Time"),
            ) {
                (Some(startup), Some(total)) => CostPair::new(startup, total),
                _ => {
                    debug!(node = %id, "No measured timings, using estimated cost");
                    estimated()
                }
            },
        }
    }
}

fn str_field(record: &Value, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn f64_field(record: &Value, key: &str) -> Option<f64> {
    record.get(key).and_then(Value::as_f64)
}

fn list_field(record: &Value, key: &str) -> Vec<String> {
    match record.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}
