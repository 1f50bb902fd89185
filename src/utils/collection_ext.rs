//! 集合扩展工具模块
//!
//! 提供去重和简单统计等辅助函数

use std::collections::HashSet;
use std::hash::Hash;

/// 去重并保持顺序
///
/// # Example
/// ```ignore
/// let ids = vec![1, 2, 1, 3, 2];
/// let unique = unique_ordered(ids); // [1, 2, 3]
/// ```
#[inline]
pub fn unique_ordered<T: Eq + Hash + Clone>(items: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::new();
    items.into_iter().filter(|item| seen.insert(item.clone())).collect()
}

/// 变异系数（样本标准差 / 均值），少于两个值或均值为 0 时返回 None
pub fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if mean.abs() < f64::EPSILON {
        return None;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(variance.sqrt() / mean.abs())
}
