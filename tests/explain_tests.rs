//! Explain pipeline integration tests

mod test_utils;

use std::fs;

use tempfile::TempDir;

use planlens::config::ExplainConfig;
use planlens::explain::{
    Explainer, NarratedPlan, NarrationContext, OperatorJustifier, PlanDiffer, PlanNarrator,
};
use planlens::plan::{CostSource, PlanTree};
use planlens::source::{Capability, CapabilitySet, DirectoryPlanSource};

use test_utils::{build, envelope, orders_index_scan, orders_seq_scan, shipping_priority_plan};

fn index_plan() -> PlanTree {
    build(&shipping_priority_plan(orders_index_scan(3.0), "Hash Join", 12.0))
}

/// Same query with index scans disabled
fn seq_plan() -> PlanTree {
    build(&shipping_priority_plan(orders_seq_scan(7.0, 140), "Hash Join", 12.0))
}

/// Same query with hash joins disabled for the inner join
fn merge_plan() -> PlanTree {
    build(&shipping_priority_plan(orders_index_scan(3.0), "Merge Join", 30.0))
}

// ============ Justifier Tests ============

#[test]
fn test_one_annotation_per_step() {
    let primary = index_plan();
    let annotations = OperatorJustifier::new(&primary, &[], &[]).justify();

    assert_eq!(annotations.len(), primary.len());
    for (i, annotation) in annotations.iter().enumerate() {
        assert_eq!(annotation.step, i + 1);
    }
    assert_eq!(
        annotations[0].explanations,
        vec!["Relation lineitem is read using Sequential Scan because no index is available on it."]
    );
    assert!(annotations[7].explanations.is_empty());
}

#[test]
fn test_index_scan_against_sequential_scan() {
    let primary = index_plan();
    let alternates = [seq_plan()];
    let annotations = OperatorJustifier::new(&primary, &[], &alternates).justify();

    assert_eq!(annotations[1].operator, "Index Scan");
    assert_eq!(
        annotations[1].explanations,
        vec!["Index Scan is 2.33 times faster than Sequential Scan on relation orders."]
    );
}

#[test]
fn test_scan_without_cheaper_alternate() {
    let primary = index_plan();
    // Disabling index scans found a cheaper sequential scan
    let alternates = [build(&shipping_priority_plan(
        orders_seq_scan(2.0, 100),
        "Hash Join",
        12.0,
    ))];
    let annotations = OperatorJustifier::new(&primary, &[], &alternates).justify();

    assert_eq!(
        annotations[1].explanations,
        vec!["Index Scan on relation orders is faster than other scan operations."]
    );
}

#[test]
fn test_join_against_merge_join() {
    let primary = index_plan();
    let alternates = [merge_plan()];
    let annotations = OperatorJustifier::new(&primary, &alternates, &[]).justify();

    // Inner join
    assert_eq!(annotations[4].operator, "Hash Join");
    assert_eq!(
        annotations[4].explanations,
        vec!["Hash Join is 2.5 times faster than Merge Join."]
    );

    // Outer join matched the merge join too, which is cheaper than it
    assert_eq!(annotations[6].operator, "Hash Join");
    assert_eq!(
        annotations[6].explanations,
        vec!["Hash Join is faster than other join operations."]
    );
}

#[test]
fn test_never_compared_with_same_operator() {
    let primary = index_plan();
    let joins = [merge_plan(), index_plan()];
    let scans = [seq_plan(), index_plan()];
    let annotations = OperatorJustifier::new(&primary, &joins, &scans).justify();

    for annotation in &annotations {
        for line in &annotation.explanations {
            if let Some((mine, rest)) = line.split_once(" is ") {
                if let Some((_, theirs)) = rest.split_once(" times faster than ") {
                    assert!(!theirs.starts_with(mine), "{}", line);
                }
            }
        }
    }
}

#[test]
fn test_alternate_with_other_join_count_ignored() {
    let primary = index_plan();
    let single_join = build(&test_utils::join(
        "Merge Join",
        100.0,
        "(orders.o_custkey = customer.c_custkey)",
        test_utils::scan("Seq Scan", "orders", 1.0),
        test_utils::scan("Seq Scan", "customer", 1.0),
    ));
    let alternates = [single_join];
    let annotations = OperatorJustifier::new(&primary, &alternates, &[]).justify();

    assert_eq!(
        annotations[4].explanations,
        vec!["Hash Join is faster than other join operations."]
    );
}

// ============ Narrator Tests ============

#[test]
fn test_intermediate_tables_numbered_in_step_order() {
    let tree = index_plan();
    let narration = PlanNarrator::narrate(&tree);

    let tables: Vec<&str> = narration
        .steps()
        .filter(|(_, n)| n.description.contains(" to get intermediate table "))
        .map(|(_, n)| n.output_name.as_str())
        .collect();
    assert_eq!(tables, vec!["T1", "T2", "T3", "T4", "T5", "T6", "T7", "T8"]);

    let steps: Vec<usize> = narration.steps().filter_map(|(_, n)| n.step).collect();
    assert_eq!(steps, (1..=narration.len()).collect::<Vec<_>>());
}

#[test]
fn test_hash_nodes_folded_into_joins() {
    let tree = index_plan();
    let narration = PlanNarrator::narrate(&tree);

    assert_eq!(narration.len(), 8);
    let lines = narration.lines();
    assert!(lines[3].starts_with("Step 4: Perform hash join on table T2 and hashed table T3"));
    assert!(lines[4].starts_with("Step 5: Perform hash join on table T1 and hashed table T4"));
    assert_eq!(
        lines[7],
        "Step 8: Limit the result of table T7 to 10 rows to get intermediate table T8."
    );
}

#[test]
fn test_narration_is_repeatable() {
    let tree = index_plan();
    let mut ctx = NarrationContext::new();

    let first = PlanNarrator::narrate_with(&tree, &mut ctx);
    let second = PlanNarrator::narrate_with(&tree, &mut ctx);
    assert_eq!(first, second);
}

// ============ Differ Tests ============

#[test]
fn test_diff_with_itself_is_empty() {
    let plan = NarratedPlan::new(merge_plan());
    assert!(PlanDiffer::diff(&plan, &plan).is_empty());
}

#[test]
fn test_diff_join_substitution() {
    let primary = NarratedPlan::new(index_plan());
    let alternate = NarratedPlan::new(merge_plan());
    let diffs = PlanDiffer::diff(&primary, &alternate);

    assert_eq!(diffs.len(), 1);
    assert!(diffs[0].difference.starts_with("hash join on table T2"));
    assert!(diffs[0].difference.contains("has been transformed to merge join"));
    assert!(diffs[0].reason.contains("Merge Join is used because"));
}

// ============ End-to-End Tests ============

#[test]
fn test_explain_index_scan_choice() {
    let report = Explainer::explain_trees(
        index_plan(),
        Vec::new(),
        vec![(CapabilitySet::single(Capability::IndexScan), seq_plan())],
    );

    let justified: Vec<&String> = report
        .annotations
        .iter()
        .flat_map(|a| &a.explanations)
        .filter(|line| line.contains("times faster"))
        .collect();
    assert_eq!(
        justified,
        vec!["Index Scan is 2.33 times faster than Sequential Scan on relation orders."]
    );

    assert_eq!(report.comparisons.len(), 1);
    let diffs = &report.comparisons[0].differences;
    assert_eq!(diffs.len(), 1);
    assert!(diffs[0].difference.starts_with("index scan on table orders"));
    assert!(diffs[0]
        .difference
        .contains("has been transformed to sequential scan on table orders"));
    assert!(!diffs[0].reason.is_empty());
    assert!(diffs[0].reason.contains("On relation orders"));
    assert!(diffs[0].reason.contains("increases from 100 to 140"));
    assert!(diffs[0].reason.contains("discards 1200 rows"));
}

#[test]
fn test_explain_two_relation_equi_join() {
    let with_scan = |outer: serde_json::Value| {
        build(&test_utils::join(
            "Hash Join",
            10.0,
            "(part.p_partkey = partsupp.ps_partkey)",
            outer,
            test_utils::hash(test_utils::scan("Seq Scan", "partsupp", 4.0)),
        ))
    };

    let mut index = test_utils::scan("Index Scan", "part", 2.0);
    index["Index Name"] = serde_json::json!("part_pkey");
    index["Index Cond"] = serde_json::json!("(p_partkey < 100)");
    let mut seq = test_utils::scan("Seq Scan", "part", 5.0);
    seq["Filter"] = serde_json::json!("(p_partkey < 100)");

    let report = Explainer::explain_trees(
        with_scan(index),
        Vec::new(),
        vec![(CapabilitySet::single(Capability::IndexScan), with_scan(seq))],
    );

    let justified: Vec<&String> = report
        .annotations
        .iter()
        .flat_map(|a| &a.explanations)
        .filter(|line| line.contains("times faster"))
        .collect();
    assert_eq!(
        justified,
        vec!["Index Scan is 2.5 times faster than Sequential Scan on relation part."]
    );

    let diffs = &report.comparisons[0].differences;
    assert_eq!(diffs.len(), 1);
    assert!(diffs[0].difference.starts_with("index scan on table part"));
    assert!(!diffs[0].reason.is_empty());
}

#[test]
fn test_explain_from_directory() {
    let dir = TempDir::new().unwrap();
    let write = |name: &str, plan: serde_json::Value| {
        fs::write(dir.path().join(name), envelope(plan).to_string()).unwrap();
    };
    write(
        "primary.json",
        shipping_priority_plan(orders_index_scan(3.0), "Hash Join", 12.0),
    );
    write(
        "disable_hashjoin.json",
        shipping_priority_plan(orders_index_scan(3.0), "Merge Join", 30.0),
    );
    write(
        "disable_indexscan.json",
        shipping_priority_plan(orders_seq_scan(7.0, 140), "Hash Join", 12.0),
    );

    let mut source = DirectoryPlanSource::new(dir.path());
    let report = Explainer::default()
        .explain(&mut source, "select ...")
        .unwrap();

    assert_eq!(report.annotations.len(), 10);
    assert_eq!(
        report.annotations[1].explanations,
        vec!["Index Scan is 2.33 times faster than Sequential Scan on relation orders."]
    );
    assert_eq!(
        report.annotations[4].explanations,
        vec!["Hash Join is 2.5 times faster than Merge Join."]
    );

    // Capabilities without a captured plan are skipped
    let disabled: Vec<&str> = report
        .comparisons
        .iter()
        .map(|c| c.disabled.as_str())
        .collect();
    assert_eq!(disabled, vec!["hashjoin", "indexscan"]);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["narration"].as_array().unwrap().len(), 8);
    assert_eq!(json["comparisons"][1]["differences"].as_array().unwrap().len(), 1);
}

#[test]
fn test_explain_with_estimated_costs() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("primary.json"),
        envelope(shipping_priority_plan(orders_index_scan(3.0), "Hash Join", 12.0)).to_string(),
    )
    .unwrap();
    fs::write(
        dir.path().join("disable_indexscan.json"),
        envelope(shipping_priority_plan(orders_seq_scan(7.0, 140), "Hash Join", 12.0)).to_string(),
    )
    .unwrap();

    let config = ExplainConfig::default().with_cost_source(CostSource::Estimated);
    let mut source = DirectoryPlanSource::new(dir.path());
    let report = Explainer::new(config).explain(&mut source, "").unwrap();

    // Estimated totals are ten times the timings, so the ratio is unchanged
    assert_eq!(
        report.annotations[1].explanations,
        vec!["Index Scan is 2.33 times faster than Sequential Scan on relation orders."]
    );
}
