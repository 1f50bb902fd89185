//! Static catalog of the probe measurement dataset
//!
//! Stands in for document retrieval: columns are described once, and
//! `context_for` ranks their descriptions by keyword overlap with a question.

use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Time,
    Dimension,
    Metric,
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnDoc {
    pub name: &'static str,
    pub data_type: &'static str,
    pub kind: ColumnKind,
    pub description: &'static str,
    /// Lower-case phrases that make this column relevant to a question
    pub keywords: &'static [&'static str],
}

pub const TIME_COLUMN: &str = "timestamp";

const COLUMNS: &[ColumnDoc] = &[
    ColumnDoc {
        name: "timestamp",
        data_type: "Int64",
        kind: ColumnKind::Time,
        description: "unix seconds, every query must bound it",
        keywords: &["time", "hour", "trend", "时间", "小时", "趋势", "昨天", "今天", "近"],
    },
    ColumnDoc {
        name: "task_name",
        data_type: "String",
        kind: ColumnKind::Dimension,
        description: "probe task, e.g. edge_l1_detect, edge_l2_detect",
        keywords: &["task", "任务"],
    },
    ColumnDoc {
        name: "src_isp",
        data_type: "String",
        kind: ColumnKind::Dimension,
        description: "source carrier: chinatelecom, chinamobile, chinaunicom, chinatietong",
        keywords: &["isp", "carrier", "运营商", "电信", "移动", "联通", "铁通"],
    },
    ColumnDoc {
        name: "src_province",
        data_type: "String",
        kind: ColumnKind::Dimension,
        description: "source province in lower-case pinyin, e.g. zhejiang, jiangsu, beijing",
        keywords: &["province", "region", "省", "地区", "区域", "覆盖"],
    },
    ColumnDoc {
        name: "hostname",
        data_type: "String",
        kind: ColumnKind::Dimension,
        description: "probe device host name",
        keywords: &["host", "device", "设备", "探测", "主机"],
    },
    ColumnDoc {
        name: "target_node",
        data_type: "String",
        kind: ColumnKind::Dimension,
        description: "probed target node identifier",
        keywords: &["target", "node", "目标", "节点"],
    },
    ColumnDoc {
        name: "avg_rtt",
        data_type: "Float64",
        kind: ColumnKind::Metric,
        description: "average round-trip latency in ms, core performance metric",
        keywords: &["rtt", "latency", "delay", "延迟", "时延", "响应", "质量", "性能"],
    },
    ColumnDoc {
        name: "avg_lost",
        data_type: "Float64",
        kind: ColumnKind::Metric,
        description: "average packet loss ratio in [0, 1], core quality metric",
        keywords: &["loss", "lost", "丢包", "质量", "覆盖"],
    },
    ColumnDoc {
        name: "packet_loss",
        data_type: "Int64",
        kind: ColumnKind::Metric,
        description: "lost packet count",
        keywords: &["packet", "丢包数", "包"],
    },
    ColumnDoc {
        name: "packet_total",
        data_type: "Int64",
        kind: ColumnKind::Metric,
        description: "sent packet count",
        keywords: &["packet", "总包", "包"],
    },
];

/// Dataset catalog bound to a concrete table
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    table: String,
}

impl SchemaCatalog {
    pub fn new(table: impl Into<String>) -> Self {
        Self { table: table.into() }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &'static [ColumnDoc] {
        COLUMNS
    }

    pub fn column(&self, name: &str) -> Option<&'static ColumnDoc> {
        COLUMNS.iter().find(|c| c.name == name)
    }

    fn doc_line(column: &ColumnDoc) -> String {
        format!("- {} ({}): {}", column.name, column.data_type, column.description)
    }

    /// Full schema description handed to SQL generation
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Table: {}", self.table);
        for (title, kind) in [
            ("Time column", ColumnKind::Time),
            ("Dimension columns", ColumnKind::Dimension),
            ("Metric columns", ColumnKind::Metric),
        ] {
            let _ = writeln!(out, "{}:", title);
            for column in COLUMNS.iter().filter(|c| c.kind == kind) {
                let _ = writeln!(out, "{}", Self::doc_line(column));
            }
        }
        out.trim_end().to_string()
    }

    /// The `top_k` column descriptions most related to the question.
    /// Falls back to catalog order when nothing matches.
    pub fn context_for(&self, question: &str, top_k: usize) -> String {
        let question = question.to_lowercase();

        let mut ranked: Vec<(usize, usize)> = COLUMNS
            .iter()
            .enumerate()
            .map(|(idx, column)| {
                let mut hits = column.keywords.iter().filter(|k| question.contains(*k)).count();
                if question.contains(column.name) {
                    hits += 2;
                }
                (idx, hits)
            })
            .collect();
        // stable sort keeps catalog order among ties
        ranked.sort_by(|a, b| b.1.cmp(&a.1));

        let mut lines = vec![format!("Table {} columns:", self.table)];
        lines.extend(
            ranked
                .into_iter()
                .take(top_k)
                .map(|(idx, _)| Self::doc_line(&COLUMNS[idx])),
        );
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::new("detect.detect_ping_log")
    }

    #[test]
    fn test_describe_lists_every_column() {
        let text = catalog().describe();
        assert!(text.starts_with("Table: detect.detect_ping_log"));
        for column in COLUMNS {
            assert!(text.contains(column.name), "{}", column.name);
        }
    }

    #[test]
    fn test_context_ranks_by_keyword_overlap() {
        let context = catalog().context_for("各运营商丢包率", 2);
        let lines: Vec<&str> = context.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("src_isp") || lines[1].contains("avg_lost"));
        assert!(context.contains("src_isp"));
        assert!(context.contains("avg_lost"));
    }

    #[test]
    fn test_context_falls_back_to_catalog_order() {
        let context = catalog().context_for("hello", 1);
        assert!(context.ends_with(&SchemaCatalog::doc_line(&COLUMNS[0])));
    }

    #[test]
    fn test_column_lookup() {
        assert_eq!(catalog().column("avg_lost").map(|c| c.kind), Some(ColumnKind::Metric));
        assert!(catalog().column("city").is_none());
    }
}
