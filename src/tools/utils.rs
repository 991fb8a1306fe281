//! 工具函数模块
//!
//! 提供并发度计算、数值格式化等通用工具函数。

use super::constants::{defaults, parallel_limits};

/// 计算实际并发度
///
/// 请求值限制在 [MIN, MAX] 内；若已知任务数，则不超过任务数。
/// 请求值为 `None` 时按CPU核数自动选择。
pub fn effective_parallel_degree(requested: Option<usize>, task_count: Option<usize>) -> usize {
    let requested = requested.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(defaults::WORKERS)
    });

    let mut degree = requested.clamp(
        parallel_limits::MIN_PARALLEL_DEGREE,
        parallel_limits::MAX_PARALLEL_DEGREE,
    );
    if let Some(tasks) = task_count {
        degree = degree.min(tasks.max(parallel_limits::MIN_PARALLEL_DEGREE));
    }
    degree
}

/// 数值格式化工具函数
pub mod numeric {
    use crate::tools::constants::report;

    /// 格式化 t 统计量：无穷大渲染为占位符，NaN 渲染为空
    pub fn format_statistic(value: f64) -> String {
        if value.is_infinite() {
            report::INFINITE_STATISTIC.to_string()
        } else if value.is_nan() {
            report::BLANK.to_string()
        } else {
            format!("{value:.4}")
        }
    }

    /// 格式化普通数值（NaN 渲染为空）
    pub fn format_value(value: f64, decimals: usize) -> String {
        if value.is_nan() {
            report::BLANK.to_string()
        } else {
            format!("{value:.decimals$}")
        }
    }
}

pub use numeric::{format_statistic, format_value};
