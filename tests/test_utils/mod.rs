//! Shared test utilities
//!
//! Note: clippy reports false-positive dead_code warnings because it can't
//! trace usage across test binaries. These utilities are used by multiple tests.

#![allow(dead_code)]

use serde_json::{json, Value};

use planlens::plan::{PlanTree, PlanTreeBuilder};

/// Scan record with measured time `cost`
pub fn scan(node_type: &str, relation: &str, cost: f64) -> Value {
    json!({
        "Node Type": node_type,
        "Relation Name": relation,
        "Schema": "public",
        "Alias": relation,
        "Startup Cost": 0.0,
        "Total Cost": cost * 10.0,
        "Actual Startup Time": 0.0,
        "Actual Total Time": cost,
        "Plan Rows": 100,
        "Actual Rows": 100
    })
}

/// Join record; the condition goes under the key the algorithm reports
pub fn join(node_type: &str, cost: f64, cond: &str, left: Value, right: Value) -> Value {
    let mut record = json!({
        "Node Type": node_type,
        "Join Type": "Inner",
        "Startup Cost": 0.0,
        "Total Cost": cost * 10.0,
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

/// Wrap a root node the way `EXPLAIN (FORMAT JSON)` returns it from a client
pub fn envelope(plan: Value) -> Value {
    json!([[[{ "Plan": plan, "Planning Time": 0.2, "Execution Time": 1.5 }]]])
}

pub fn build(record: &Value) -> PlanTree {
    PlanTreeBuilder::default().build(record).unwrap()
}

/// Number of records reachable through `Plans`, root included
pub fn record_count(record: &Value) -> usize {
    1 + record["Plans"]
        .as_array()
        .map(|plans| plans.iter().map(record_count).sum())
        .unwrap_or(0)
}

/// Shipping-priority style plan: lineitem ⋈ (orders ⋈ customer), grouped,
/// sorted and limited
pub fn shipping_priority_plan(orders_scan: Value, inner_join: &str, inner_cost: f64) -> Value {
    let customer = {
        let mut customer = scan("Seq Scan", "customer", 2.0);
        customer["Filter"] = json!("(c_mktsegment = 'BUILDING'::bpchar)");
        customer
    };
    let inner = match inner_join {
        "Merge Join" => join(
            "Merge Join",
            inner_cost,
            "(orders.o_custkey = customer.c_custkey)",
            sort("orders.o_custkey", orders_scan),
            sort("customer.c_custkey", customer),
        ),
        _ => join(
            inner_join,
            inner_cost,
            "(orders.o_custkey = customer.c_custkey)",
            orders_scan,
            hash(customer),
        ),
    };

    let mut lineitem = scan("Seq Scan", "lineitem", 20.0);
    lineitem["Filter"] = json!("(l_shipdate > '1995-03-15'::date)");

    let outer = join(
        "Hash Join",
        40.0,
        "(lineitem.l_orderkey = orders.o_orderkey)",
        lineitem,
        hash(inner),
    );

    json!({
        "Node Type": "Limit",
        "Plan Rows": 10,
        "Actual Rows": 10,
        "Plans": [{
            "Node Type": "Sort",
            "Sort Key": ["(sum(lineitem.l_extendedprice)) DESC"],
            "Plans": [{
                "Node Type": "Aggregate",
                "Strategy": "Hashed",
                "Group Key": ["lineitem.l_orderkey"],
                "Plans": [outer]
            }]
        }]
    })
}

/// Index scan on orders with the date predicate as index condition
pub fn orders_index_scan(cost: f64) -> Value {
    let mut orders = scan("Index Scan", "orders", cost);
    orders["Index Name"] = json!("orders_orderdate_idx");
    orders["Index Cond"] = json!("(o_orderdate < '1995-03-15'::date)");
    orders
}

/// Sequential scan on orders with the date predicate as filter
pub fn orders_seq_scan(cost: f64, rows: u64) -> Value {
    let mut orders = scan("Seq Scan", "orders", cost);
    orders["Filter"] = json!("(o_orderdate < '1995-03-15'::date)");
    orders["Actual Rows"] = json!(rows);
    orders["Rows Removed by Filter"] = json!(1200);
    orders
}
