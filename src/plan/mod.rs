//! Plan tree model
//!
//! A parsed `EXPLAIN (FORMAT JSON)` plan record, held as an arena of nodes
//! indexed by [`NodeId`]. Trees are immutable once built; anything derived
//! from them (step numbers, output names, descriptions) lives in side tables
//! keyed by node id.
//!
//! ## Pipeline
//!
//! ```text
//! serde_json::Value
//!   → PlanTreeBuilder::build() → PlanTree
//!   → StepSequencer::sequence() → StepSequence
//! ```

pub mod builder;
pub mod display;
pub mod error;
pub mod steps;

pub use builder::{CostSource, PlanTreeBuilder};
pub use display::TreeFormatter;
pub use error::{PlanError, PlanResult};
pub use steps::{StepSequence, StepSequencer};

use std::fmt;

/// Index of a node inside its [`PlanTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Position of the node in the arena
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Physical join algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    Hash,
    Merge,
    NestedLoop,
}

impl JoinKind {
    /// Lowercase phrase used in narration
    pub fn phrase(self) -> &'static str {
        match self {
            JoinKind::Hash => "hash join",
            JoinKind::Merge => "merge join",
            JoinKind::NestedLoop => "nested loop join",
        }
    }
}

/// Physical scan algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanKind {
    Seq,
    Index,
    IndexOnly,
    BitmapHeap,
    BitmapIndex,
    Tid,
    Subquery,
    Function,
    Values,
    Cte,
    WorkTable,
    Foreign,
    Other,
}

impl ScanKind {
    /// Whether the scan fetches table rows through an index; a Bitmap Index
    /// Scan only builds a bitmap for its heap scan
    pub fn is_index_based(self) -> bool {
        matches!(self, ScanKind::Index | ScanKind::IndexOnly | ScanKind::BitmapHeap)
    }
}

/// Closed classification of a plan operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Join(JoinKind),
    Scan(ScanKind),
    Sort,
    Aggregate,
    Unique,
    Limit,
    Gather,
    Hash,
    Other,
}

impl NodeKind {
    /// Classify a PostgreSQL `Node Type` string
    pub fn parse(node_type: &str) -> NodeKind {
        match node_type {
            "Hash Join" => NodeKind::Join(JoinKind::Hash),
            "Merge Join" => NodeKind::Join(JoinKind::Merge),
            "Nested Loop" => NodeKind::Join(JoinKind::NestedLoop),

            "Seq Scan" => NodeKind::Scan(ScanKind::Seq),
            "Index Scan" => NodeKind::Scan(ScanKind::Index),
            "Index Only Scan" => NodeKind::Scan(ScanKind::IndexOnly),
            "Bitmap Heap Scan" => NodeKind::Scan(ScanKind::BitmapHeap),
            "Bitmap Index Scan" => NodeKind::Scan(ScanKind::BitmapIndex),
            "Tid Scan" | "Tid Range Scan" => NodeKind::Scan(ScanKind::Tid),
            "Subquery Scan" => NodeKind::Scan(ScanKind::Subquery),
            "Function Scan" | "Table Function Scan" => NodeKind::Scan(ScanKind::Function),
            "Values Scan" => NodeKind::Scan(ScanKind::Values),
            "CTE Scan" | "Named Tuplestore Scan" => NodeKind::Scan(ScanKind::Cte),
            "WorkTable Scan" => NodeKind::Scan(ScanKind::WorkTable),
            "Foreign Scan" => NodeKind::Scan(ScanKind::Foreign),
            other if other.ends_with(" Scan") => NodeKind::Scan(ScanKind::Other),

            "Sort" | "Incremental Sort" => NodeKind::Sort,
            "Aggregate" | "HashAggregate" | "GroupAggregate" | "Group" => NodeKind::Aggregate,
            "Unique" => NodeKind::Unique,
            "Limit" => NodeKind::Limit,
            "Gather" | "Gather Merge" => NodeKind::Gather,
            "Hash" => NodeKind::Hash,
            _ => NodeKind::Other,
        }
    }

    pub fn is_join(self) -> bool {
        matches!(self, NodeKind::Join(_))
    }

    pub fn is_scan(self) -> bool {
        matches!(self, NodeKind::Scan(_))
    }
}

/// Role a condition string plays on its operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionRole {
    IndexCond,
    HashCond,
    MergeCond,
    RecheckCond,
    Filter,
    JoinFilter,
}

impl ConditionRole {
    /// All roles, in the order they are read from a plan record
    pub const ALL: [ConditionRole; 6] = [
        ConditionRole::IndexCond,
        ConditionRole::HashCond,
        ConditionRole::MergeCond,
        ConditionRole::RecheckCond,
        ConditionRole::Filter,
        ConditionRole::JoinFilter,
    ];

    /// JSON key of the condition in a plan record
    pub fn field(self) -> &'static str {
        match self {
            ConditionRole::IndexCond => "Index Cond",
            ConditionRole::HashCond => "Hash Cond",
            ConditionRole::MergeCond => "Merge Cond",
            ConditionRole::RecheckCond => "Recheck Cond",
            ConditionRole::Filter => "Filter",
            ConditionRole::JoinFilter => "Join Filter",
        }
    }
}

/// A condition attached to an operator
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub role: ConditionRole,
    pub text: String,
}

/// Startup and total cost of an operator, either estimated or measured
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CostPair {
    pub startup: f64,
    pub total: f64,
}

impl CostPair {
    pub fn new(startup: f64, total: f64) -> Self {
        Self { startup, total }
    }

    /// Cost not already attributed to the startup phase
    pub fn exclusive(&self) -> f64 {
        self.total - self.startup
    }
}

/// Relation read by a scan operator
#[derive(Debug, Clone, PartialEq)]
pub struct RelationRef {
    pub name: String,
    pub schema: Option<String>,
    pub alias: Option<String>,
}

/// One operator of a plan
#[derive(Debug, Clone, PartialEq)]
pub struct PlanNode {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    /// Children in source order (outer side first for joins)
    pub children: Vec<NodeId>,
    /// Verbatim `Node Type`
    pub name: String,
    pub kind: NodeKind,
    pub cost: CostPair,
    pub plan_rows: f64,
    pub actual_rows: Option<f64>,
    /// Only set for scan operators
    pub relation: Option<RelationRef>,
    pub index_name: Option<String>,
    pub conditions: Vec<Condition>,
    pub group_key: Vec<String>,
    pub sort_key: Vec<String>,
    pub sort_method: Option<String>,
    pub join_type: Option<String>,
    pub strategy: Option<String>,
    pub parent_relationship: Option<String>,
    pub subplan_name: Option<String>,
    pub rows_removed_by_filter: Option<f64>,
}

impl PlanNode {
    /// Exclusive cost (total − startup) from the selected cost source
    pub fn exclusive_cost(&self) -> f64 {
        self.cost.exclusive()
    }

    /// Name of the scanned relation, if any
    pub fn relation_name(&self) -> Option<&str> {
        self.relation.as_ref().map(|r| r.name.as_str())
    }

    /// First condition with the given role
    pub fn condition(&self, role: ConditionRole) -> Option<&str> {
        self.conditions
            .iter()
            .find(|c| c.role == role)
            .map(|c| c.text.as_str())
    }

    /// Measured row count, falling back to the estimate
    pub fn rows(&self) -> f64 {
        self.actual_rows.unwrap_or(self.plan_rows)
    }

    /// Whether the node computes a subplan or InitPlan rather than an input
    /// of its parent
    pub fn is_subplan(&self) -> bool {
        self.subplan_name.is_some()
            || matches!(
                self.parent_relationship.as_deref(),
                Some("SubPlan" | "InitPlan")
            )
    }

    /// Name used when an operator is cited in explanations
    pub fn display_name(&self) -> &str {
        match self.kind {
            NodeKind::Scan(ScanKind::Seq) => "Sequential Scan",
            _ => &self.name,
        }
    }
}

/// A complete plan: exactly one root, every other node has one parent
#[derive(Debug, Clone, PartialEq)]
pub struct PlanTree {
    nodes: Vec<PlanNode>,
    root: NodeId,
}

impl PlanTree {
    pub(crate) fn from_nodes(nodes: Vec<PlanNode>, root: NodeId) -> Self {
        Self { nodes, root }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn root_node(&self) -> &PlanNode {
        &self.nodes[self.root.0]
    }

    /// Node by id; ids are only handed out by this tree
    pub fn node(&self, id: NodeId) -> &PlanNode {
        &self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&PlanNode> {
        self.nodes.get(id.0)
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in arena order
    pub fn iter(&self) -> impl Iterator<Item = &PlanNode> {
        self.nodes.iter()
    }

    /// Children of a node, in source order
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &PlanNode> {
        self.nodes[id.0].children.iter().map(move |c| &self.nodes[c.0])
    }

    /// Bottom-up execution order of this tree
    pub fn steps(&self) -> StepSequence {
        StepSequencer::sequence(self)
    }
}
