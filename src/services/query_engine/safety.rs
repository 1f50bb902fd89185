//! SafetyValidator - read-only gate and row cap enforcement
//!
//! Runs on every statement right before execution. Missing or oversized row
//! caps are repaired here; only the statement shape can make it fail.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::utils::UnsafeQueryError;

/// Statement keywords that can never appear in a query we execute
pub const DISALLOWED_KEYWORDS: &[&str] = &[
    "insert", "update", "delete", "drop", "alter", "create", "truncate", "grant", "revoke", "exec",
];

static DISALLOWED_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\b({})\b", DISALLOWED_KEYWORDS.join("|"))).unwrap()
});

/// `LIMIT n` or MySQL-style `LIMIT offset, n`
static LIMIT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\blimit\s+(\d+)(?:\s*,\s*(\d+))?").unwrap());

static TRAILING_LIMIT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\blimit\s+\d+(?:\s*,\s*\d+)?(?:\s+offset\s+\d+)?\s*$").unwrap()
});

static LEADING_WORD_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_]+").unwrap());

static SETTINGS_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bsettings\b").unwrap());

// ============================================================================
// SQL scanning helpers
// ============================================================================

/// Drop leading whitespace and `--` / `/* */` comments
pub(crate) fn skip_leading_comments(sql: &str) -> &str {
    let mut rest = sql.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.find('\n').map_or("", |pos| &after[pos + 1..]).trim_start();
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.find("*/").map_or("", |pos| &after[pos + 2..]).trim_start();
        } else {
            return rest;
        }
    }
}

/// Blank out string literal contents and comments so structural checks
/// never look inside them. Byte length is preserved.
pub(crate) fn mask_literals(sql: &str) -> String {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        match ch {
            '\'' | '"' => {
                out.push(ch);
                let quote = ch;
                while let Some((_, c)) = chars.next() {
                    if c == '\\' {
                        if let Some((_, escaped)) = chars.next() {
                            push_blank(&mut out, c);
                            push_blank(&mut out, escaped);
                        }
                        continue;
                    }
                    if c == quote {
                        if chars.peek().map(|(_, next)| *next) == Some(quote) {
                            chars.next();
                            out.push_str("  ");
                            continue;
                        }
                        out.push(c);
                        break;
                    }
                    push_blank(&mut out, c);
                }
            },
            '-' if bytes.get(idx + 1) == Some(&b'-') => {
                push_blank(&mut out, ch);
                for (_, c) in chars.by_ref() {
                    if c == '\n' {
                        out.push(c);
                        break;
                    }
                    push_blank(&mut out, c);
                }
            },
            '/' if bytes.get(idx + 1) == Some(&b'*') => {
                push_blank(&mut out, ch);
                let mut prev = '\0';
                for (_, c) in chars.by_ref() {
                    push_blank(&mut out, c);
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
            },
            _ => out.push(ch),
        }
    }
    out
}

fn push_blank(out: &mut String, c: char) {
    for _ in 0..c.len_utf8() {
        out.push(' ');
    }
}

/// Parenthesis depth at byte offset `end`
fn depth_at(masked: &str, end: usize) -> i32 {
    masked[..end].bytes().fold(0, |depth, b| match b {
        b'(' => depth + 1,
        b')' => depth - 1,
        _ => depth,
    })
}

/// Byte offset of the outermost trailing `SETTINGS` clause (ClickHouse)
pub(crate) fn settings_clause_start(sql: &str) -> Option<usize> {
    let masked = mask_literals(sql);
    SETTINGS_REGEX
        .find_iter(&masked)
        .filter(|m| depth_at(&masked, m.start()) == 0)
        .last()
        .map(|m| m.start())
}

/// Whether the outermost statement ends with a row cap, ignoring a trailing `SETTINGS` clause
pub(crate) fn has_trailing_limit(sql: &str) -> bool {
    let head = settings_clause_start(sql).map_or(sql, |idx| &sql[..idx]);
    TRAILING_LIMIT_REGEX.is_match(mask_literals(head).trim_end())
}

/// Add an outer `LIMIT`, keeping it ahead of a trailing `SETTINGS` clause
pub(crate) fn append_row_cap(sql: &str, cap: u64) -> String {
    match settings_clause_start(sql) {
        Some(idx) => format!("{}\nLIMIT {}\n{}", sql[..idx].trim_end(), cap, &sql[idx..]),
        None => format!("{}\nLIMIT {}", sql, cap),
    }
}

/// Row counts of every LIMIT clause; values too large for u64 read as `u64::MAX`
pub(crate) fn limit_values(sql: &str) -> Vec<u64> {
    LIMIT_REGEX
        .captures_iter(&mask_literals(sql))
        .filter_map(|caps| caps.get(2).or_else(|| caps.get(1)))
        .map(|m| m.as_str().parse::<u64>().unwrap_or(u64::MAX))
        .collect()
}

// ============================================================================
// Safety Validator
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct SafetyValidator {
    max_rows: u64,
}

impl SafetyValidator {
    pub fn new(max_rows: u64) -> Self {
        Self { max_rows: max_rows.max(1) }
    }

    pub fn max_rows(&self) -> u64 {
        self.max_rows
    }

    /// Return the statement ready to execute: read-only, single, capped
    pub fn validate(&self, sql: &str) -> Result<String, UnsafeQueryError> {
        let trimmed = sql.trim();
        let trimmed = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();
        if skip_leading_comments(trimmed).is_empty() {
            return Err(UnsafeQueryError::Empty);
        }

        let masked = mask_literals(trimmed);
        let body = skip_leading_comments(&masked);
        let leading = LEADING_WORD_REGEX
            .find(body)
            .map(|m| m.as_str().to_lowercase())
            .unwrap_or_default();
        if leading != "select" && leading != "with" {
            let shown = if leading.is_empty() {
                body.chars().take(20).collect::<String>()
            } else {
                leading
            };
            return Err(UnsafeQueryError::NotReadOnly(shown));
        }

        // keywords are checked over the raw text, literals and comments included
        if let Some(m) = DISALLOWED_REGEX.find(trimmed) {
            return Err(UnsafeQueryError::DisallowedKeyword(m.as_str().to_lowercase()));
        }

        if masked.contains(';') {
            return Err(UnsafeQueryError::MultipleStatements);
        }

        Ok(self.enforce_row_cap(trimmed))
    }

    fn enforce_row_cap(&self, sql: &str) -> String {
        let masked = mask_literals(sql);
        let max_rows = self.max_rows;
        let mut out = String::with_capacity(sql.len() + 16);
        let mut last = 0;

        for caps in LIMIT_REGEX.captures_iter(&masked) {
            let Some(count) = caps.get(2).or_else(|| caps.get(1)) else {
                continue;
            };
            let value = count.as_str().parse::<u64>().unwrap_or(u64::MAX);
            if value > max_rows {
                tracing::warn!("Row cap {} exceeds maximum, rewriting to {}", count.as_str(), max_rows);
                out.push_str(&sql[last..count.start()]);
                out.push_str(&max_rows.to_string());
                last = count.end();
            }
        }
        out.push_str(&sql[last..]);

        if !has_trailing_limit(&out) {
            tracing::debug!("Appending row cap LIMIT {}", max_rows);
            out = append_row_cap(&out, max_rows);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> SafetyValidator {
        SafetyValidator::new(1000)
    }

    #[test]
    fn test_appends_cap_when_missing() {
        let sql = validator().validate("SELECT AVG(avg_lost) AS avg_lost FROM t").unwrap();
        assert_eq!(sql, "SELECT AVG(avg_lost) AS avg_lost FROM t\nLIMIT 1000");
        assert_eq!(limit_values(&sql), vec![1000]);
    }

    #[test]
    fn test_rewrites_oversized_cap() {
        let sql = validator().validate("select a from t limit 5000").unwrap();
        assert_eq!(sql, "select a from t limit 1000");

        let sql = validator().validate("select a from t LIMIT 20, 99999999999999999999999").unwrap();
        assert_eq!(sql, "select a from t LIMIT 20, 1000");
    }

    #[test]
    fn test_keeps_smaller_cap() {
        let sql = validator().validate("SELECT a FROM t LIMIT 10;").unwrap();
        assert_eq!(sql, "SELECT a FROM t LIMIT 10");
    }

    #[test]
    fn test_subquery_cap_does_not_count_as_outer_cap() {
        let sql = validator()
            .validate("SELECT * FROM (SELECT a FROM t LIMIT 5) s")
            .unwrap();
        assert!(sql.ends_with("\nLIMIT 1000"));
    }

    #[test]
    fn test_rejects_non_select() {
        assert_eq!(
            validator().validate("SHOW TABLES"),
            Err(UnsafeQueryError::NotReadOnly("show".to_string()))
        );
        assert_eq!(validator().validate("  ;"), Err(UnsafeQueryError::Empty));
        assert_eq!(validator().validate("-- only a comment"), Err(UnsafeQueryError::Empty));
    }

    #[test]
    fn test_leading_comments_tolerated() {
        let sql = validator().validate("-- hourly loss\n/* v2 */ WITH x AS (SELECT 1) SELECT * FROM x");
        assert!(sql.is_ok());
    }

    #[test]
    fn test_drop_table_anywhere_rejected() {
        for sql in [
            "SELECT 1; DROP TABLE t",
            "select a from t where b = 'x' or 1=1 drop table t",
            "SELECT a FROM t WHERE note = 'Drop Table t'",
            "SELECT a FROM t -- dRoP tAbLe t",
        ] {
            assert_eq!(
                validator().validate(sql),
                Err(UnsafeQueryError::DisallowedKeyword("drop".to_string())),
                "{}",
                sql
            );
        }
    }

    #[test]
    fn test_keywords_match_whole_words_only() {
        assert!(validator().validate("SELECT created_at, update_time FROM t").is_ok());
        assert!(validator().validate("SELECT execution_ms FROM t").is_ok());
        assert_eq!(
            validator().validate("SELECT a FROM t; INSERT INTO t VALUES (1)"),
            Err(UnsafeQueryError::DisallowedKeyword("insert".to_string()))
        );
    }

    #[test]
    fn test_stacked_statements_rejected() {
        assert_eq!(
            validator().validate("SELECT a FROM t; SELECT b FROM t"),
            Err(UnsafeQueryError::MultipleStatements)
        );
        assert!(validator().validate("SELECT a FROM t WHERE b = 'x;y'").is_ok());
    }

    #[test]
    fn test_mask_literals_keeps_length() {
        let sql = "SELECT 'it''s' -- c\nFROM t /* x */";
        let masked = mask_literals(sql);
        assert_eq!(masked.len(), sql.len());
        assert!(!masked.contains("it"));
        assert!(masked.contains("FROM t"));
        assert!(!masked.contains('x'));
    }

    #[test]
    fn test_cap_goes_before_settings_clause() {
        let sql = validator()
            .validate("SELECT src_isp, avg(avg_lost) FROM t GROUP BY src_isp SETTINGS max_threads = 4")
            .unwrap();
        assert_eq!(
            sql,
            "SELECT src_isp, avg(avg_lost) FROM t GROUP BY src_isp\nLIMIT 1000\nSETTINGS max_threads = 4"
        );

        let sql = validator().validate("SELECT a FROM t LIMIT 10 SETTINGS max_threads = 4").unwrap();
        assert_eq!(sql, "SELECT a FROM t LIMIT 10 SETTINGS max_threads = 4");
    }

    #[test]
    fn test_limit_by_still_gets_outer_cap() {
        let sql = validator().validate("SELECT a, b FROM t ORDER BY b LIMIT 3 BY a").unwrap();
        assert_eq!(sql, "SELECT a, b FROM t ORDER BY b LIMIT 3 BY a\nLIMIT 1000");
    }

    #[test]
    fn test_settings_inside_literal_ignored() {
        assert_eq!(settings_clause_start("SELECT a FROM t WHERE note = 'settings'"), None);
        assert_eq!(settings_clause_start("SELECT a FROM (SELECT a FROM t SETTINGS x = 1) s"), None);
    }

    #[test]
    fn test_injected_cap_never_exceeds_maximum() {
        for max in [1, 10, 1_000_000] {
            let sql = SafetyValidator::new(max).validate("SELECT a FROM t").unwrap();
            assert!(limit_values(&sql).iter().all(|v| *v <= max));
        }
    }
}
