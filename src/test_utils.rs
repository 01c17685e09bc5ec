//! Shared plan fixtures for unit tests

use serde_json::{json, Value};

use crate::plan::{PlanTree, PlanTreeBuilder};

/// Scan node with measured cost `cost` and no conditions
pub fn scan(node_type: &str, relation: &str, cost: f64) -> Value {
    json!({
        "Node Type": node_type,
        "Relation Name": relation,
        "Alias": relation,
        "Actual Startup Time": 0.0,
        "Actual Total Time": cost,
        "Plan Rows": 100,
        "Actual Rows": 100
    })
}

/// Join node; the condition is stored under the key its algorithm reports
pub fn join(node_type: &str, cost: f64, cond: &str, left: Value, right: Value) -> Value {
    let mut record = json!({
        "Node Type": node_type,
        "Join Type": "Inner",
        "Actual Startup Time": 0.0,
        "Actual Total Time": cost,
        "Plan Rows": 100,
        "Actual Rows": 100,
        "Plans": [left, right]
    });
    let key = match node_type {
        "Hash Join" => "Hash Cond",
        "Merge Join" => "Merge Cond",
        _ => "Join Filter",
    };
    record[key] = Value::String(cond.to_string());
    record
}

pub fn hash(child: Value) -> Value {
    json!({ "Node Type": "Hash", "Plans": [child] })
}

pub fn sort(key: &str, child: Value) -> Value {
    json!({ "Node Type": "Sort", "Sort Key": [key], "Plans": [child] })
}

pub fn build(record: &Value) -> PlanTree {
    PlanTreeBuilder::default().build(record).unwrap()
}
