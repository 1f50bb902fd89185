//! 字符串扩展工具模块
//!
//! 提供关键词匹配、SQL 字面量转义和代码块清理等辅助函数

use once_cell::sync::Lazy;
use regex::Regex;

static CODE_FENCE_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*```[a-z]*[ \t]*\r?\n?").unwrap());
static CODE_FENCE_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r?\n?[ \t]*```\s*$").unwrap());

/// 字符串清理扩展 trait
pub trait StringExt {
    /// 清理字符串并返回 Option，空字符串返回 None
    fn clean(&self) -> Option<String>;

    /// 是否包含任意一个关键词（调用方负责大小写归一，ASCII 关键词按整词匹配）
    fn contains_any(&self, needles: &[&str]) -> bool;
}

impl StringExt for str {
    #[inline]
    fn clean(&self) -> Option<String> {
        let trimmed = self.trim();
        if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
    }

    #[inline]
    fn contains_any(&self, needles: &[&str]) -> bool {
        needles.iter().any(|n| contains_keyword(self, n))
    }
}

impl StringExt for String {
    #[inline]
    fn clean(&self) -> Option<String> {
        self.as_str().clean()
    }

    #[inline]
    fn contains_any(&self, needles: &[&str]) -> bool {
        self.as_str().contains_any(needles)
    }
}

/// 关键词匹配：ASCII 关键词两侧不能紧挨字母、数字或下划线，其余关键词按子串匹配
pub fn contains_keyword(haystack: &str, keyword: &str) -> bool {
    if !keyword.is_ascii() {
        return haystack.contains(keyword);
    }
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';
    haystack.match_indices(keyword).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + keyword.len()..].chars().next();
        !before.is_some_and(is_word) && !after.is_some_and(is_word)
    })
}

/// 转义为 SQL 单引号字面量
///
/// # Example
/// ```ignore
/// assert_eq!(sql_quote("o'neil"), "'o''neil'");
/// ```
#[inline]
pub fn sql_quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

/// 去除 LLM 回复中包裹 SQL 的 markdown 代码块标记
pub fn strip_code_fences(text: &str) -> String {
    let opened = CODE_FENCE_OPEN.replace(text.trim(), "");
    CODE_FENCE_CLOSE.replace(&opened, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean() {
        assert_eq!("  abc ".clean(), Some("abc".to_string()));
        assert_eq!("   ".clean(), None);
    }

    #[test]
    fn test_contains_any() {
        assert!("近1小时丢包率".contains_any(&["延迟", "丢包"]));
        assert!(!"packet loss".contains_any(&["rtt", "latency"]));
    }

    #[test]
    fn test_ascii_keywords_match_whole_words() {
        assert!(!"display latency".contains_any(&["isp"]));
        assert!(!"crisp charts".contains_any(&["isp"]));
        assert!("loss per isp".contains_any(&["isp"]));
        assert!("各isp丢包".contains_any(&["isp"]));
        assert!(!"src_isp".contains_any(&["isp"]));
        assert!("按运营商统计".contains_any(&["运营商"]));
    }

    #[test]
    fn test_sql_quote_escapes() {
        assert_eq!(sql_quote("edge_l1_detect"), "'edge_l1_detect'");
        assert_eq!(sql_quote("a' OR '1'='1"), "'a'' OR ''1''=''1'");
        assert_eq!(sql_quote(r"a\"), r"'a\\'");
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```sql\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(strip_code_fences("```\nSELECT 1```"), "SELECT 1");
        assert_eq!(strip_code_fences("SELECT 1"), "SELECT 1");
    }
}
