//! 两组样本比较模块
//!
//! 在两个不同样本组的合并结果之间，按保留时间窗口匹配对齐峰，
//! 并基于已汇总的 均值/标准差/n 对保留时间和峰面积做 Student t 检验与 Welch t 检验。
//!
//! - 匹配规则：左组每个峰取右组中第一个落在窗口内的峰
//! - 未匹配的峰仍输出一行，统计量为空，结论为保守的 "Diff"
//! - 判定：p ≤ α 拒绝零假设（"Diff"），否则 "Same"
//! - 无穷大的 t 统计量在计算中保持为 ±∞，只在格式化时替换为占位符

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

use super::consolidated::ConsolidatedPeak;
use super::stats::PresentStats;
use crate::error::{ConsensusError, ConsensusResult};
use crate::tools::constants::defaults;

/// 两组比较配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonConfig {
    /// 保留时间匹配窗口（与 rt_list 同单位，默认秒）
    pub rt_window: f64,
    /// 显著性水平
    pub alpha: f64,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            rt_window: defaults::RT_WINDOW_SECONDS,
            alpha: defaults::ALPHA,
        }
    }
}

impl ComparisonConfig {
    pub fn validate(&self) -> ConsensusResult<()> {
        if !self.rt_window.is_finite() || self.rt_window < 0.0 {
            return Err(ConsensusError::InvalidInput(format!(
                "rt_window must be a non-negative number, got {}",
                self.rt_window
            )));
        }
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(ConsensusError::InvalidInput(format!(
                "alpha must be in (0, 1), got {}",
                self.alpha
            )));
        }
        Ok(())
    }
}

/// 已汇总的样本统计量
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub mean: f64,
    pub stdev: f64,
    pub n: usize,
}

impl SummaryStats {
    pub fn new(mean: f64, stdev: f64, n: usize) -> Self {
        Self { mean, stdev, n }
    }
}

impl From<PresentStats> for SummaryStats {
    fn from(stats: PresentStats) -> Self {
        Self {
            mean: stats.mean,
            stdev: stats.stdev,
            n: stats.count,
        }
    }
}

/// 检验结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Same,
    Diff,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Same => "Same",
            Verdict::Diff => "Diff",
        }
    }
}

/// 单次 t 检验结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TTest {
    /// 可能为 ±∞（标准差均为0而均值不同）
    pub statistic: f64,
    pub p_value: f64,
    pub df: f64,
}

impl TTest {
    /// p ≤ α 判定为 "Diff"；p 为 NaN 时判定为 "Same"
    pub fn verdict(&self, alpha: f64) -> Verdict {
        if self.p_value <= alpha {
            Verdict::Diff
        } else {
            Verdict::Same
        }
    }
}

/// 双侧 p 值
fn two_sided_p(statistic: f64, df: f64) -> f64 {
    if statistic.is_nan() || df.is_nan() || df <= 0.0 {
        return f64::NAN;
    }
    if statistic.is_infinite() {
        return 0.0;
    }
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => (2.0 * (1.0 - dist.cdf(statistic.abs()))).clamp(0.0, 1.0),
        Err(_) => f64::NAN,
    }
}

/// 独立样本 t 检验（合并方差）
pub fn student_ttest(left: &SummaryStats, right: &SummaryStats) -> TTest {
    let (n1, n2) = (left.n as f64, right.n as f64);
    let df = n1 + n2 - 2.0;
    if df <= 0.0 {
        return TTest {
            statistic: f64::NAN,
            p_value: f64::NAN,
            df,
        };
    }

    let pooled = ((n1 - 1.0) * left.stdev.powi(2) + (n2 - 1.0) * right.stdev.powi(2)) / df;
    let statistic = (left.mean - right.mean) / (pooled * (1.0 / n1 + 1.0 / n2)).sqrt();

    TTest {
        statistic,
        p_value: two_sided_p(statistic, df),
        df,
    }
}

/// Welch t 检验（不等方差）
///
/// 自由度无法计算（两组方差均为0）时取1。
pub fn welch_ttest(left: &SummaryStats, right: &SummaryStats) -> TTest {
    let (n1, n2) = (left.n as f64, right.n as f64);
    if left.n == 0 || right.n == 0 {
        return TTest {
            statistic: f64::NAN,
            p_value: f64::NAN,
            df: f64::NAN,
        };
    }

    let v1 = left.stdev.powi(2) / n1;
    let v2 = right.stdev.powi(2) / n2;
    let statistic = (left.mean - right.mean) / (v1 + v2).sqrt();

    let mut df = (v1 + v2).powi(2) / (v1.powi(2) / (n1 - 1.0) + v2.powi(2) / (n2 - 1.0));
    if df.is_nan() {
        df = 1.0;
    }

    TTest {
        statistic,
        p_value: two_sided_p(statistic, df),
        df,
    }
}

/// 同一指标的两种检验
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestPair {
    pub left: SummaryStats,
    pub right: SummaryStats,
    pub student: TTest,
    pub welch: TTest,
}

impl TestPair {
    pub fn run(left: SummaryStats, right: SummaryStats) -> Self {
        Self {
            left,
            right,
            student: student_ttest(&left, &right),
            welch: welch_ttest(&left, &right),
        }
    }

    /// 任一检验判定不同则为 "Diff"
    pub fn verdict(&self, alpha: f64) -> Verdict {
        if self.student.verdict(alpha) == Verdict::Diff || self.welch.verdict(alpha) == Verdict::Diff
        {
            Verdict::Diff
        } else {
            Verdict::Same
        }
    }
}

/// 匹配到的峰对的检验结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchedComparison {
    pub right_peak_number: u32,
    pub rt: TestPair,
    pub area: TestPair,
}

/// 比较结果的一行（左组的一个峰）
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRow {
    pub left_peak_number: u32,
    pub left_rt: f64,
    /// 未匹配时为 `None`
    pub matched: Option<MatchedComparison>,
}

impl ComparisonRow {
    /// 未匹配的行保守地判定为 "Diff"
    pub fn verdict(&self, alpha: f64) -> Verdict {
        match &self.matched {
            None => Verdict::Diff,
            Some(m) => {
                if m.rt.verdict(alpha) == Verdict::Diff || m.area.verdict(alpha) == Verdict::Diff {
                    Verdict::Diff
                } else {
                    Verdict::Same
                }
            }
        }
    }
}

/// 比较两个样本组的合并结果
pub fn compare_groups(
    left: &[ConsolidatedPeak],
    right: &[ConsolidatedPeak],
    config: &ComparisonConfig,
) -> ConsensusResult<Vec<ComparisonRow>> {
    config.validate()?;

    let right_stats: Vec<(u32, Option<PresentStats>, Option<PresentStats>)> = right
        .iter()
        .map(|p| (p.peak_number, p.rt_stats(), p.area_stats()))
        .collect();

    let rows = left
        .iter()
        .map(|peak| {
            let left_rt = peak.rt_stats();
            let left_area = peak.area_stats();

            let matched = match (left_rt, left_area) {
                (Some(l_rt), Some(l_area)) => right_stats.iter().find_map(|(number, r_rt, r_area)| {
                    let (r_rt, r_area) = ((*r_rt)?, (*r_area)?);
                    ((l_rt.mean - r_rt.mean).abs() <= config.rt_window).then(|| MatchedComparison {
                        right_peak_number: *number,
                        rt: TestPair::run(l_rt.into(), r_rt.into()),
                        area: TestPair::run(l_area.into(), r_area.into()),
                    })
                }),
                _ => None,
            };

            if matched.is_none() {
                log::debug!(
                    "peak {} has no counterpart within {} / 未找到匹配峰",
                    peak.peak_number,
                    config.rt_window
                );
            }

            ComparisonRow {
                left_peak_number: peak.peak_number,
                left_rt: left_rt.map_or(f64::NAN, |s| s.mean),
                matched,
            }
        })
        .collect();

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(number: u32, rts: &[f64], areas: &[f64]) -> ConsolidatedPeak {
        ConsolidatedPeak {
            peak_number: number,
            rt_list: rts.iter().map(|v| Some(*v)).collect(),
            area_list: areas.iter().map(|v| Some(*v)).collect(),
            ms_list: vec![None; rts.len()],
            ms_comparison: Vec::new(),
            hits: Vec::new(),
        }
    }

    #[test]
    fn zero_variance_different_means_gives_infinite_statistic() {
        let left = SummaryStats::new(100.0, 0.0, 5);
        let right = SummaryStats::new(200.0, 0.0, 5);

        let student = student_ttest(&left, &right);
        assert!(student.statistic.is_infinite());
        assert_eq!(student.p_value, 0.0);
        assert_eq!(student.verdict(0.01), Verdict::Diff);

        let welch = welch_ttest(&left, &right);
        assert!(welch.statistic.is_infinite());
        assert_eq!(welch.df, 1.0);
        assert_eq!(welch.p_value, 0.0);
    }

    #[test]
    fn student_ttest_matches_reference_value() {
        // scipy.stats.ttest_ind_from_stats(10, 2, 10, 12, 2, 10) -> t = -2.2360679..., p = 0.03817...
        let test = student_ttest(&SummaryStats::new(10.0, 2.0, 10), &SummaryStats::new(12.0, 2.0, 10));
        assert!((test.statistic + 2.236_067_977).abs() < 1e-6);
        assert_eq!(test.df, 18.0);
        assert!((test.p_value - 0.038_17).abs() < 1e-3, "p = {}", test.p_value);
        assert_eq!(test.verdict(0.01), Verdict::Same);
        assert_eq!(test.verdict(0.05), Verdict::Diff);
    }

    #[test]
    fn welch_df_uses_satterthwaite() {
        let test = welch_ttest(&SummaryStats::new(5.0, 1.0, 4), &SummaryStats::new(5.0, 3.0, 4));
        assert_eq!(test.statistic, 0.0);
        assert!((test.p_value - 1.0).abs() < 1e-9);
        let expected_df = (0.25_f64 + 2.25).powi(2) / (0.25_f64.powi(2) / 3.0 + 2.25_f64.powi(2) / 3.0);
        assert!((test.df - expected_df).abs() < 1e-12);
    }

    #[test]
    fn identical_groups_are_same() {
        let stats = SummaryStats::new(12.0, 0.0, 3);
        let pair = TestPair::run(stats, stats);
        assert!(pair.student.statistic.is_nan());
        assert_eq!(pair.verdict(0.01), Verdict::Same);
    }

    #[test]
    fn first_right_peak_within_window_wins() {
        let left = vec![peak(1, &[600.0, 601.0], &[10.0, 11.0])];
        let right = vec![
            peak(7, &[650.0, 651.0], &[10.0, 11.0]),
            peak(8, &[590.0, 591.0], &[10.0, 11.0]),
            peak(9, &[600.5, 600.5], &[10.0, 11.0]),
        ];

        let rows = compare_groups(&left, &right, &ComparisonConfig::default()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].matched.unwrap().right_peak_number, 7);
    }

    #[test]
    fn unmatched_peak_emits_conservative_row() {
        let left = vec![peak(1, &[100.0, 101.0], &[10.0, 11.0])];
        let right = vec![peak(2, &[900.0, 901.0], &[10.0, 11.0])];

        let rows = compare_groups(&left, &right, &ComparisonConfig::default()).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].matched.is_none());
        assert_eq!(rows[0].verdict(0.01), Verdict::Diff);
    }

    #[test]
    fn invalid_alpha_is_rejected() {
        let config = ComparisonConfig {
            alpha: 1.5,
            ..ComparisonConfig::default()
        };
        assert!(compare_groups(&[], &[], &config).is_err());
    }
}
