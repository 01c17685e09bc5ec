//! Plan narration
//!
//! Describes a plan one operator at a time, in execution order. Operators
//! that only prepare input for their parent (a Hash under a Hash Join, the
//! Sorts feeding a Merge Join, ...) are folded into the parent's sentence.
//! Each operator producing a new intermediate result is given a synthetic
//! name (`T1`, `T2`, ...) that later sentences refer to.
//!
//! The tree itself is never modified; results are kept in a [`Narration`]
//! side table indexed by node id.

use serde::Serialize;

use crate::plan::{ConditionRole, JoinKind, NodeId, NodeKind, PlanNode, PlanTree, ScanKind};

/// Narration of one node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeNarration {
    /// Step number, `None` when folded into the parent's sentence
    pub step: Option<usize>,
    /// Name later steps use to refer to this node's output
    pub output_name: String,
    pub description: String,
}

/// Narration of a whole tree, indexed by node id
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Narration {
    entries: Vec<NodeNarration>,
    /// Retained nodes in step order
    #[serde(skip)]
    order: Vec<NodeId>,
}

impl Narration {
    pub fn get(&self, id: NodeId) -> &NodeNarration {
        &self.entries[id.index()]
    }

    pub fn description(&self, id: NodeId) -> &str {
        &self.entries[id.index()].description
    }

    pub fn output_name(&self, id: NodeId) -> &str {
        &self.entries[id.index()].output_name
    }

    /// Number of numbered steps
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Numbered steps, in order
    pub fn steps(&self) -> impl Iterator<Item = (NodeId, &NodeNarration)> {
        self.order.iter().map(move |&id| (id, &self.entries[id.index()]))
    }

    /// `Step N: <sentence>.` lines
    pub fn lines(&self) -> Vec<String> {
        self.steps()
            .filter_map(|(_, n)| n.step.map(|step| format!("Step {}: {}.", step, n.description)))
            .collect()
    }
}

/// A tree together with its narration
#[derive(Debug, Clone)]
pub struct NarratedPlan {
    pub tree: PlanTree,
    pub narration: Narration,
}

impl NarratedPlan {
    pub fn new(tree: PlanTree) -> Self {
        let narration = PlanNarrator::narrate(&tree);
        Self { tree, narration }
    }
}

/// Accumulators threaded through one narration pass
#[derive(Debug, Default)]
pub struct NarrationContext {
    step: usize,
    tables: usize,
    /// (reference, resolved name) in registration order
    subplans: Vec<(String, String)>,
}

impl NarrationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all counters and registered subplans
    pub fn reset(&mut self) {
        self.step = 0;
        self.tables = 0;
        self.subplans.clear();
    }

    fn next_step(&mut self) -> usize {
        self.step += 1;
        self.step
    }

    fn next_table(&mut self) -> String {
        self.tables += 1;
        format!("T{}", self.tables)
    }

    /// Register a subplan's output; `InitPlan n (returns $k)` also registers `$k`
    fn register_subplan(&mut self, name: &str, output: &str) {
        let (label, params) = match name.split_once(" (returns ") {
            Some((label, rest)) => (label, rest.trim_end_matches(')')),
            None => (name, ""),
        };
        self.subplans.push((label.to_string(), output.to_string()));
        for param in params.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            self.subplans.push((param.to_string(), output.to_string()));
        }
    }

    /// Replace registered subplan references in a condition
    fn resolve(&self, text: &str) -> String {
        let mut refs: Vec<&(String, String)> = self.subplans.iter().collect();
        // `$10` must be replaced before `$1`
        refs.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        refs.iter()
            .fold(text.to_string(), |acc, (from, to)| acc.replace(from.as_str(), to))
    }
}

/// Input of an operator as it appears in the operator's sentence
struct Operand {
    text: String,
    absorbed: bool,
}

/// Produces per-operator sentences for a plan tree
pub struct PlanNarrator;

impl PlanNarrator {
    /// Narrate a tree with a fresh context
    pub fn narrate(tree: &PlanTree) -> Narration {
        let mut ctx = NarrationContext::new();
        Self::narrate_with(tree, &mut ctx)
    }

    /// Narrate a tree, resetting `ctx` first
    pub fn narrate_with(tree: &PlanTree, ctx: &mut NarrationContext) -> Narration {
        ctx.reset();
        let mut walk = Walk {
            tree,
            ctx,
            entries: vec![None; tree.len()],
            contributions: vec![String::new(); tree.len()],
            order: Vec::new(),
        };
        walk.visit(tree.root(), false);

        Narration {
            entries: walk
                .entries
                .into_iter()
                .map(|e| e.unwrap_or_else(|| NodeNarration {
                    step: None,
                    output_name: String::new(),
                    description: String::new(),
                }))
                .collect(),
            order: walk.order,
        }
    }

    /// Whether `child` is folded into `parent`'s sentence
    pub fn absorbs(parent: &PlanNode, child: &PlanNode) -> bool {
        let sole = parent.children.len() == 1;
        match (parent.kind, child.kind) {
            (NodeKind::Join(JoinKind::Hash), NodeKind::Hash) => true,
            (NodeKind::Join(JoinKind::Merge), NodeKind::Sort) => true,
            (NodeKind::Unique, NodeKind::Sort) => true,
            (NodeKind::Unique, NodeKind::Scan(_)) => sole,
            (NodeKind::Aggregate, NodeKind::Sort | NodeKind::Scan(_)) => sole,
            (NodeKind::Scan(ScanKind::BitmapHeap), NodeKind::Scan(ScanKind::BitmapIndex)) => true,
            _ => false,
        }
    }
}

struct Walk<'a> {
    tree: &'a PlanTree,
    ctx: &'a mut NarrationContext,
    entries: Vec<Option<NodeNarration>>,
    /// How each node is referred to from its parent's sentence
    contributions: Vec<String>,
    order: Vec<NodeId>,
}

impl Walk<'_> {
    fn visit(&mut self, id: NodeId, absorbed: bool) {
        let tree = self.tree;
        let node = tree.node(id);

        for child in tree.children(id) {
            self.visit(child.id, PlanNarrator::absorbs(node, child));
        }

        let inputs: Vec<&PlanNode> = tree
            .children(id)
            .filter(|c| !c.is_subplan())
            .collect();
        let operands: Vec<Operand> = inputs
            .iter()
            .map(|c| Operand {
                text: self.contributions[c.id.index()].clone(),
                absorbed: PlanNarrator::absorbs(node, c),
            })
            .collect();
        let passthrough = match &node.relation {
            Some(relation) => relation.name.clone(),
            None => inputs
                .first()
                .and_then(|c| self.entries[c.id.index()].as_ref())
                .map(|e| e.output_name.clone())
                .unwrap_or_else(|| node.name.clone()),
        };

        let mut description = self.describe(node, &operands);
        let output_name = if !absorbed && Self::materializes(node) {
            let table = self.ctx.next_table();
            description.push_str(&format!(" to get intermediate table {}", table));
            table
        } else {
            passthrough
        };

        let step = if absorbed {
            None
        } else {
            self.order.push(id);
            Some(self.ctx.next_step())
        };

        self.contributions[id.index()] = if absorbed {
            self.absorbed_contribution(node, &operands, &output_name)
        } else {
            format!("table {}", output_name)
        };

        if let Some(subplan) = &node.subplan_name {
            self.ctx.register_subplan(subplan, &output_name);
        }

        self.entries[id.index()] = Some(NodeNarration {
            step,
            output_name,
            description,
        });
    }

    /// Whether a retained node produces a new intermediate result
    fn materializes(node: &PlanNode) -> bool {
        match node.kind {
            NodeKind::Scan(_) => node.relation.is_none() || !node.conditions.is_empty(),
            NodeKind::Gather | NodeKind::Hash => false,
            NodeKind::Join(_)
            | NodeKind::Sort
            | NodeKind::Aggregate
            | NodeKind::Unique
            | NodeKind::Limit
            | NodeKind::Other => true,
        }
    }

    fn absorbed_contribution(&self, node: &PlanNode, operands: &[Operand], output: &str) -> String {
        let input = operands
            .first()
            .map(|o| o.text.clone())
            .unwrap_or_else(|| format!("table {}", output));
        match node.kind {
            NodeKind::Hash => format!("hashed {}", input),
            NodeKind::Sort => format!("{} sorted on {}", input, node.sort_key.join(", ")),
            NodeKind::Scan(ScanKind::BitmapIndex) => self.index_clause(node).trim_start().to_string(),
            NodeKind::Scan(_) => match node.relation_name() {
                Some(relation) => format!(
                    "table {}{}{}{}",
                    relation,
                    self.bitmap_clause(node, operands),
                    self.index_clause(node),
                    self.filter_clause(node)
                ),
                None => input,
            },
            _ => format!("table {}", output),
        }
    }

    fn describe(&self, node: &PlanNode, operands: &[Operand]) -> String {
        let inputs = Self::operand_list(operands);

        match node.kind {
            NodeKind::Join(kind) => {
                let join_type = node
                    .join_type
                    .as_deref()
                    .filter(|t| *t != "Inner")
                    .map(|t| format!("{} ", t.to_lowercase()))
                    .unwrap_or_default();
                let mut text = format!("Perform {}{} on {}", join_type, kind.phrase(), inputs);
                for role in [ConditionRole::HashCond, ConditionRole::MergeCond] {
                    if let Some(cond) = node.condition(role) {
                        text.push_str(&format!(" under condition {}", self.ctx.resolve(cond)));
                    }
                }
                if let Some(filter) = node.condition(ConditionRole::JoinFilter) {
                    text.push_str(&format!(" with join filter {}", self.ctx.resolve(filter)));
                }
                text.push_str(&self.filter_clause(node));
                text
            }

            NodeKind::Scan(ScanKind::BitmapIndex) => {
                format!("Perform bitmap index scan{}", self.index_clause(node))
            }

            NodeKind::Scan(kind) => {
                let mut text = format!("Perform {}", Self::scan_phrase(kind, node));
                match node.relation_name() {
                    Some(relation) => text.push_str(&format!(" on table {}", relation)),
                    None if !operands.is_empty() => text.push_str(&format!(" on {}", inputs)),
                    None => {}
                }
                text.push_str(&self.bitmap_clause(node, operands));
                text.push_str(&self.index_clause(node));
                text.push_str(&self.filter_clause(node));
                text
            }

            NodeKind::Sort => {
                let mut text = format!(
                    "Perform sort on {} with sort key {}",
                    inputs,
                    node.sort_key.join(", ")
                );
                if let Some(method) = &node.sort_method {
                    text.push_str(&format!(" using {}", method));
                }
                text
            }

            NodeKind::Aggregate => {
                let strategy = match node.strategy.as_deref() {
                    Some("Hashed") => "hashed ",
                    Some("Sorted") => "sorted ",
                    Some("Mixed") => "mixed ",
                    _ => "",
                };
                let mut text = format!("Perform {}aggregate on {}", strategy, inputs);
                if !node.group_key.is_empty() {
                    text.push_str(&format!(
                        " with grouping on attribute {}",
                        node.group_key.join(", ")
                    ));
                }
                text.push_str(&self.filter_clause(node));
                text
            }

            NodeKind::Unique => format!("Perform duplicate removal on {}", inputs),

            NodeKind::Limit => format!("Limit the result of {} to {} rows", inputs, node.plan_rows),

            NodeKind::Gather => format!("Gather the results of parallel workers on {}", inputs),

            NodeKind::Hash => format!("Perform hashing on {}", inputs),

            NodeKind::Other => {
                let mut text = format!("Perform {}", node.name.to_lowercase());
                if !operands.is_empty() {
                    text.push_str(&format!(" on {}", inputs));
                }
                text.push_str(&self.filter_clause(node));
                text
            }
        }
    }

    fn operand_list(operands: &[Operand]) -> String {
        if operands.is_empty() {
            return "the input".to_string();
        }
        operands
            .iter()
            .map(|o| o.text.as_str())
            .collect::<Vec<_>>()
            .join(" and ")
    }

    fn scan_phrase(kind: ScanKind, node: &PlanNode) -> String {
        match kind {
            ScanKind::Seq => "sequential scan".to_string(),
            ScanKind::Index => "index scan".to_string(),
            ScanKind::IndexOnly => "index only scan".to_string(),
            ScanKind::BitmapHeap => "bitmap heap scan".to_string(),
            ScanKind::BitmapIndex => "bitmap index scan".to_string(),
            ScanKind::Tid => "TID scan".to_string(),
            ScanKind::Subquery
            | ScanKind::Function
            | ScanKind::Values
            | ScanKind::Cte
            | ScanKind::WorkTable
            | ScanKind::Foreign
            | ScanKind::Other => node.name.to_lowercase(),
        }
    }

    /// Bitmaps feeding a Bitmap Heap Scan, or its recheck condition when
    /// none are listed
    fn bitmap_clause(&self, node: &PlanNode, operands: &[Operand]) -> String {
        if node.kind != NodeKind::Scan(ScanKind::BitmapHeap) {
            return String::new();
        }
        if operands.is_empty() {
            return node
                .condition(ConditionRole::RecheckCond)
                .map(|recheck| format!(" with recheck condition {}", self.ctx.resolve(recheck)))
                .unwrap_or_default();
        }
        operands
            .iter()
            .map(|operand| {
                if operand.absorbed {
                    format!(" {}", operand.text)
                } else {
                    format!(" using bitmap {}", operand.text)
                }
            })
            .collect()
    }

    /// ` using index <i> with index condition <c>`, either part optional
    fn index_clause(&self, node: &PlanNode) -> String {
        let mut text = String::new();
        if let Some(index) = &node.index_name {
            text.push_str(&format!(" using index {}", index));
        }
        if let Some(cond) = node.condition(ConditionRole::IndexCond) {
            text.push_str(&format!(" with index condition {}", self.ctx.resolve(cond)));
        }
        text
    }

    fn filter_clause(&self, node: &PlanNode) -> String {
        node.condition(ConditionRole::Filter)
            .map(|f| format!(" filtered by {}", self.ctx.resolve(f)))
            .unwrap_or_default()
    }
}
