//! Plan tree text rendering
//!
//! Formats plan trees as indented EXPLAIN-style text.

use super::{NodeId, PlanTree};

/// Indented text rendering of a plan tree
pub struct TreeFormatter;

impl TreeFormatter {
    /// Format a whole tree as a string
    pub fn format(tree: &PlanTree) -> String {
        let mut output = String::new();
        Self::format_node(tree, tree.root(), 0, &mut output);
        output
    }

    fn format_node(tree: &PlanTree, id: NodeId, indent: usize, out: &mut String) {
        let prefix = "  ".repeat(indent);
        let node = tree.node(id);

        out.push_str(&prefix);
        out.push_str(&node.name);
        if let Some(relation) = &node.relation {
            out.push_str(&format!(" on {}", relation.name));
            if let Some(alias) = relation.alias.as_deref().filter(|a| *a != relation.name) {
                out.push_str(&format!(" {}", alias));
            }
        }
        if let Some(index) = &node.index_name {
            out.push_str(&format!(" using {}", index));
        }
        out.push_str(&format!(
            " (cost={:.2}..{:.2} rows={}",
            node.cost.startup, node.cost.total, node.plan_rows
        ));
        if let Some(actual) = node.actual_rows {
            out.push_str(&format!(" actual_rows={}", actual));
        }
        out.push_str(")\n");

        if let Some(subplan) = &node.subplan_name {
            out.push_str(&format!("{}  subplan: {}\n", prefix, subplan));
        }
        for condition in &node.conditions {
            out.push_str(&format!(
                "{}  {}: {}\n",
                prefix,
                condition.role.field().to_lowercase(),
                condition.text
            ));
        }
        if !node.group_key.is_empty() {
            out.push_str(&format!("{}  group key: {}\n", prefix, node.group_key.join(", ")));
        }
        if !node.sort_key.is_empty() {
            out.push_str(&format!("{}  sort key: {}\n", prefix, node.sort_key.join(", ")));
        }

        for &child in &node.children {
            Self::format_node(tree, child, indent + 1, out);
        }
    }
}
