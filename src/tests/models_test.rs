use crate::models::{
    Aggregation, Cell, ChartType, QualityGrade, QualityReport, QueryPlan, ResultSet, StageReport,
    StageStatus, StageWeights,
};
use serde_json::json;

fn isp_plan() -> QueryPlan {
    let mut plan = QueryPlan::new("近1小时各运营商丢包率", "last_1_hour");
    plan.metrics = vec!["avg_lost".to_string()];
    plan.aggregation = Aggregation::GroupByIsp;
    plan
}

#[test]
fn test_query_plan_json_omits_empty_fields() {
    let value = serde_json::to_value(isp_plan()).unwrap();

    assert_eq!(
        value,
        json!({
            "action": "query",
            "metrics": ["avg_lost"],
            "filters": {"time_range": "last_1_hour"},
            "aggregation": "group_by_isp",
            "need_chart": false,
            "original_query": "近1小时各运营商丢包率"
        })
    );
}

#[test]
fn test_query_plan_json_keeps_filters_and_chart() {
    let mut plan = isp_plan();
    plan.filters.src_isp = vec!["chinatelecom".to_string()];
    plan.task_name = Some("edge_l1_detect".to_string());
    plan.need_chart = true;
    plan.chart_type = Some(ChartType::Bar);

    let value = serde_json::to_value(&plan).unwrap();
    assert_eq!(value["filters"]["src_isp"], json!(["chinatelecom"]));
    assert_eq!(value["task_name"], "edge_l1_detect");
    assert_eq!(value["chart_type"], "bar");

    let back: QueryPlan = serde_json::from_value(value).unwrap();
    assert_eq!(back, plan);
}

#[test]
fn test_query_plan_reads_sparse_json() {
    let plan: QueryPlan = serde_json::from_value(json!({
        "action": "query",
        "metrics": ["avg_rtt"],
        "filters": {"time_range": "today"},
        "aggregation": "group_by_time_hour",
        "need_chart": false,
        "original_query": "今天延迟趋势"
    }))
    .unwrap();

    assert_eq!(plan.aggregation, Aggregation::GroupByTimeHour);
    assert!(plan.filters.src_province.is_empty());
    assert_eq!(plan.task_name, None);
    assert_eq!(plan.chart_type, None);
}

#[test]
fn test_aggregation_display_and_description() {
    assert_eq!(Aggregation::GroupByProvinceIsp.to_string(), "group_by_province_isp");
    for agg in Aggregation::ALL {
        assert!(!agg.description().is_empty(), "{}", agg);
    }
}

#[test]
fn test_quality_report_json_shape() {
    let report = QualityReport::assemble(
        StageReport::scored(0.0, Vec::new(), 70.0),
        StageReport::scored(0.0, Vec::new(), 70.0).with_elapsed(12),
        StageReport::scored(50.0, vec!["sparse result".to_string()], 70.0),
        &StageWeights::default(),
    );

    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["grade"], "good");
    assert_eq!(value["execution"]["elapsed_ms"], 12);
    assert!(value["sql_generation"].get("elapsed_ms").is_none());
    assert_eq!(value["result_quality"]["status"], "warning");
    assert_eq!(report.grade, QualityGrade::Good);
}

#[test]
fn test_render_summary_lists_stages_in_order() {
    let report = QualityReport::assemble(
        StageReport::scored(10.0, vec!["no row cap".to_string()], 70.0),
        StageReport::failed("connection refused"),
        StageReport::failed("no result to assess"),
        &StageWeights::default(),
    );

    let summary = report.render_summary();
    let lines: Vec<&str> = summary.lines().collect();
    assert!(lines[0].starts_with("Data quality: needs improvement"));
    assert_eq!(lines[1], "- sql_generation: 90 [passed]");
    assert_eq!(lines[2], "  * no row cap");
    assert_eq!(lines[3], "- execution: 0 [failed]");
    assert!(summary.contains("- result_quality: 0 [failed]"));
    assert_eq!(report.execution.status, StageStatus::Failed);
}

#[test]
fn test_result_set_serializes_plain_cells() {
    let result = ResultSet::new(
        vec!["src_isp".to_string(), "avg_lost".to_string()],
        vec![vec![Cell::from("chinamobile"), Cell::from(0.05)], vec![Cell::Null, Cell::from(0.1)]],
    );

    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["rows"][0], json!(["chinamobile", 0.05]));
    assert_eq!(value["rows"][1][0], serde_json::Value::Null);
    assert_eq!(result.numeric_values(1), vec![0.05, 0.1]);
}
