//! 质谱相似度模块
//!
//! 对同一对齐峰上所有"两张质谱都存在"的实验对计算加权余弦相似度（0–1000）。
//!
//! # 算法
//!
//! 1. 限制 m/z 范围，并剔除低于基峰相对强度阈值的峰
//! 2. 加权：w = mz^`mz_power` × intensity^`intensity_power`
//! 3. 在 ±`tolerance` 窗口内按最近 m/z 贪心配对（每个峰最多配对一次）
//! 4. cos(θ) = (A·B) / (‖A‖ × ‖B‖)，未配对的峰计入范数；分数 = cos × 1000
//!
//! 单个实验对失败（质谱结构损坏、范围内无峰）只记为缺失分数并记录告警，不中止运行。

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::consolidated::SimilarityPair;
use super::model::MassSpectrum;
use super::stats::{present_mean, present_stdev};
use crate::error::{ConsensusError, ConsensusResult, similarity_error};
use crate::tools::constants::defaults;

/// 相似度分数上限
pub const MAX_SCORE: f64 = 1000.0;

/// 相似度度量配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    /// m/z 配对容差
    pub tolerance: f64,
    /// m/z 权重指数（0 = 不按 m/z 加权）
    pub mz_power: f64,
    /// 强度权重指数（0.5 = 平方根缩放）
    pub intensity_power: f64,
    pub mz_min: f64,
    /// `None` 表示无上限
    pub mz_max: Option<f64>,
    /// 相对基峰的最低强度（0–1）
    pub min_relative_intensity: f64,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            tolerance: defaults::MZ_TOLERANCE,
            mz_power: defaults::MZ_POWER,
            intensity_power: defaults::INTENSITY_POWER,
            mz_min: 0.0,
            mz_max: None,
            min_relative_intensity: 0.0,
        }
    }
}

impl SimilarityConfig {
    pub fn validate(&self) -> ConsensusResult<()> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(ConsensusError::InvalidInput(format!(
                "tolerance must be a non-negative number, got {}",
                self.tolerance
            )));
        }
        for (name, power) in [
            ("mz_power", self.mz_power),
            ("intensity_power", self.intensity_power),
        ] {
            if !power.is_finite() || power < 0.0 {
                return Err(ConsensusError::InvalidInput(format!(
                    "{name} must be a non-negative number, got {power}"
                )));
            }
        }
        if !self.mz_min.is_finite() || self.mz_min < 0.0 {
            return Err(ConsensusError::InvalidInput(format!(
                "mz_min must be a non-negative number, got {}",
                self.mz_min
            )));
        }
        if let Some(max) = self.mz_max {
            if max.is_nan() || max <= self.mz_min {
                return Err(ConsensusError::InvalidInput(format!(
                    "mz_max ({max}) must be greater than mz_min ({})",
                    self.mz_min
                )));
            }
        }
        if !(0.0..1.0).contains(&self.min_relative_intensity) {
            return Err(ConsensusError::InvalidInput(format!(
                "min_relative_intensity must be in [0, 1), got {}",
                self.min_relative_intensity
            )));
        }
        Ok(())
    }

    #[inline]
    fn in_range(&self, mz: f64) -> bool {
        mz >= self.mz_min && self.mz_max.is_none_or(|max| mz <= max)
    }
}

/// 预处理后的质谱：按 m/z 排序的 (m/z, 权重)
struct WeightedPeaks {
    mz: Vec<f64>,
    weight: Vec<f64>,
}

fn prepare(spectrum: &MassSpectrum, config: &SimilarityConfig) -> ConsensusResult<WeightedPeaks> {
    spectrum
        .check()
        .map_err(|e| similarity_error("malformed spectrum", e))?;

    let mut in_range: Vec<(f64, f64)> = spectrum
        .mass_list
        .iter()
        .copied()
        .zip(spectrum.intensity_list.iter().copied())
        .filter(|(mz, _)| config.in_range(*mz))
        .collect();

    let base_peak = in_range.iter().map(|(_, int)| *int).fold(0.0_f64, f64::max);
    if base_peak <= 0.0 {
        return Err(ConsensusError::Similarity(
            "no signal within the m/z range".to_string(),
        ));
    }

    let cutoff = base_peak * config.min_relative_intensity;
    // 强度为0的峰不参与加权
    in_range.retain(|(_, int)| *int > 0.0 && *int >= cutoff);
    in_range.sort_by(|a, b| a.0.total_cmp(&b.0));

    let (mz, weight) = in_range
        .into_iter()
        .map(|(mz, int)| (mz, mz.powf(config.mz_power) * int.powf(config.intensity_power)))
        .unzip();

    Ok(WeightedPeaks { mz, weight })
}

/// 计算两张质谱的加权余弦相似度（0–1000）
pub fn spectrum_similarity(
    query: &MassSpectrum,
    reference: &MassSpectrum,
    config: &SimilarityConfig,
) -> ConsensusResult<f64> {
    let q = prepare(query, config)?;
    let r = prepare(reference, config)?;
    let score = weighted_cosine(&q, &r, config.tolerance) * MAX_SCORE;
    if !score.is_finite() {
        return Err(ConsensusError::Similarity(format!(
            "non-finite similarity score {score}"
        )));
    }
    Ok(score)
}

fn weighted_cosine(q: &WeightedPeaks, r: &WeightedPeaks, tolerance: f64) -> f64 {
    let mut ref_used = vec![false; r.mz.len()];
    let mut dot = 0.0;

    for (qi, &qmz) in q.mz.iter().enumerate() {
        // r.mz 已排序，只扫描容差窗口
        let start = r.mz.partition_point(|&mz| mz < qmz - tolerance);
        let mut best: Option<(usize, f64)> = None;

        for (ri, &rmz) in r.mz.iter().enumerate().skip(start) {
            if rmz > qmz + tolerance {
                break;
            }
            if ref_used[ri] {
                continue;
            }
            let diff = (qmz - rmz).abs();
            if best.is_none_or(|(_, best_diff)| diff < best_diff) {
                best = Some((ri, diff));
            }
        }

        if let Some((ri, _)) = best {
            ref_used[ri] = true;
            dot += q.weight[qi] * r.weight[ri];
        }
    }

    let norm_q: f64 = q.weight.iter().map(|w| w * w).sum();
    let norm_r: f64 = r.weight.iter().map(|w| w * w).sum();
    let denom = (norm_q * norm_r).sqrt();

    if denom > 0.0 {
        (dot / denom).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// 单个实验对的失败记录
#[derive(Debug, Clone, PartialEq)]
pub struct PairFailure {
    pub left: String,
    pub right: String,
    pub message: String,
}

/// 单个对齐峰的相似度结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotSimilarity {
    /// 按实验顺序排列的全部有效实验对（失败的对分数为 `None`）
    pub pairs: Vec<SimilarityPair>,
    pub failures: Vec<PairFailure>,
}

impl SlotSimilarity {
    pub fn scores(&self) -> Vec<Option<f64>> {
        self.pairs.iter().map(|p| p.score).collect()
    }

    pub fn mean(&self) -> f64 {
        present_mean(&self.scores())
    }

    /// 总体标准差
    pub fn stdev(&self) -> f64 {
        present_stdev(&self.scores())
    }
}

/// 单个对齐峰的处理时限
#[derive(Debug, Clone, Copy)]
pub struct SlotDeadline {
    started: Instant,
    budget: Duration,
}

impl SlotDeadline {
    pub fn start(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    pub fn check(&self, peak_number: u32) -> ConsensusResult<()> {
        let elapsed = self.started.elapsed();
        if elapsed > self.budget {
            return Err(ConsensusError::SlotTimeout {
                peak_number,
                elapsed_ms: elapsed.as_millis(),
            });
        }
        Ok(())
    }
}

/// 质谱相似度引擎
pub struct SimilarityEngine<'a> {
    experiments: &'a [String],
    config: &'a SimilarityConfig,
}

impl<'a> SimilarityEngine<'a> {
    pub fn new(experiments: &'a [String], config: &'a SimilarityConfig) -> Self {
        Self {
            experiments,
            config,
        }
    }

    /// 计算一个对齐峰上所有实验对的相似度
    ///
    /// 缺少任一质谱的实验对直接省略（不计为0）。
    /// 只有超时会返回错误，单对失败记入 `failures`。
    pub fn compare_slot(
        &self,
        peak_number: u32,
        spectra: &[Option<&MassSpectrum>],
        deadline: Option<&SlotDeadline>,
    ) -> ConsensusResult<SlotSimilarity> {
        let mut result = SlotSimilarity::default();

        for i in 0..spectra.len() {
            let Some(left) = spectra[i] else { continue };
            for j in (i + 1)..spectra.len() {
                let Some(right) = spectra[j] else { continue };

                if let Some(deadline) = deadline {
                    deadline.check(peak_number)?;
                }

                let left_name = &self.experiments[i];
                let right_name = &self.experiments[j];
                let score = match spectrum_similarity(left, right, self.config) {
                    Ok(score) => Some(score),
                    Err(e) => {
                        log::warn!(
                            "peak {peak_number}: {left_name} vs {right_name} comparison failed / 相似度计算失败: {e}"
                        );
                        result.failures.push(PairFailure {
                            left: left_name.clone(),
                            right: right_name.clone(),
                            message: e.to_string(),
                        });
                        None
                    }
                };

                result.pairs.push(SimilarityPair {
                    left: left_name.clone(),
                    right: right_name.clone(),
                    score,
                });
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectrum(points: &[(f64, f64)]) -> MassSpectrum {
        MassSpectrum::new(
            points.iter().map(|p| p.0).collect(),
            points.iter().map(|p| p.1).collect(),
        )
    }

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("E{i}")).collect()
    }

    #[test]
    fn identical_spectra_score_maximum() {
        let s = spectrum(&[(41.0, 120.0), (43.0, 999.0), (57.0, 310.5), (71.0, 87.3)]);
        let score = spectrum_similarity(&s, &s.clone(), &SimilarityConfig::default()).unwrap();
        assert_eq!(score, MAX_SCORE);
    }

    #[test]
    fn disjoint_spectra_score_zero() {
        let a = spectrum(&[(50.0, 100.0)]);
        let b = spectrum(&[(80.0, 100.0)]);
        let score = spectrum_similarity(&a, &b, &SimilarityConfig::default()).unwrap();
        assert_eq!(score, 0.0);
    }

    #[test]
    fn partial_overlap_is_between_bounds() {
        let a = spectrum(&[(50.0, 100.0), (51.0, 50.0)]);
        let b = spectrum(&[(50.0, 100.0), (52.0, 50.0)]);
        let score = spectrum_similarity(&a, &b, &SimilarityConfig::default()).unwrap();
        assert!(score > 0.0 && score < MAX_SCORE, "score = {score}");
    }

    #[test]
    fn mz_range_restricts_comparison() {
        let a = spectrum(&[(50.0, 100.0), (200.0, 500.0)]);
        let b = spectrum(&[(50.0, 100.0), (300.0, 500.0)]);
        let config = SimilarityConfig {
            mz_max: Some(150.0),
            ..SimilarityConfig::default()
        };
        assert_eq!(spectrum_similarity(&a, &b, &config).unwrap(), MAX_SCORE);
    }

    #[test]
    fn low_intensity_cutoff_drops_noise() {
        let a = spectrum(&[(50.0, 100.0), (60.0, 1.0)]);
        let b = spectrum(&[(50.0, 100.0), (61.0, 1.0)]);
        let config = SimilarityConfig {
            min_relative_intensity: 0.05,
            ..SimilarityConfig::default()
        };
        assert_eq!(spectrum_similarity(&a, &b, &config).unwrap(), MAX_SCORE);
    }

    #[test]
    fn malformed_spectrum_is_an_error() {
        let bad = MassSpectrum::new(vec![50.0, 51.0], vec![1.0]);
        let good = spectrum(&[(50.0, 1.0)]);
        let err = spectrum_similarity(&bad, &good, &SimilarityConfig::default()).unwrap_err();
        assert!(matches!(err, ConsensusError::Similarity(_)));
    }

    #[test]
    fn missing_spectra_are_omitted_not_zero() {
        let experiments = names(3);
        let config = SimilarityConfig::default();
        let engine = SimilarityEngine::new(&experiments, &config);
        let s = spectrum(&[(50.0, 100.0)]);

        let result = engine.compare_slot(1, &[Some(&s), None, Some(&s)], None).unwrap();
        assert_eq!(result.pairs.len(), 1);
        assert_eq!(result.pairs[0].key(), "E0 & E2");
    }

    #[test]
    fn failed_pair_is_recorded_as_missing() {
        let experiments = names(3);
        let config = SimilarityConfig::default();
        let engine = SimilarityEngine::new(&experiments, &config);
        let good = spectrum(&[(50.0, 100.0)]);
        let bad = MassSpectrum::new(vec![50.0], vec![]);

        let result = engine
            .compare_slot(2, &[Some(&good), Some(&bad), Some(&good)], None)
            .unwrap();
        assert_eq!(result.pairs.len(), 3);
        assert_eq!(result.scores(), vec![None, Some(MAX_SCORE), None]);
        assert_eq!(result.failures.len(), 2);
        assert_eq!(result.mean(), MAX_SCORE);
        assert_eq!(result.stdev(), 0.0);
    }

    #[test]
    fn expired_deadline_times_out() {
        let experiments = names(2);
        let config = SimilarityConfig::default();
        let engine = SimilarityEngine::new(&experiments, &config);
        let s = spectrum(&[(50.0, 100.0)]);
        let deadline = SlotDeadline::start(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(2));

        let err = engine
            .compare_slot(3, &[Some(&s), Some(&s)], Some(&deadline))
            .unwrap_err();
        assert!(matches!(err, ConsensusError::SlotTimeout { peak_number: 3, .. }));
    }

    #[test]
    fn zero_intensity_peaks_carry_no_weight() {
        // 指数为0时 0^0 = 1，未剔除的零强度峰会拉低分数
        let a = spectrum(&[(50.0, 100.0), (51.0, 0.0)]);
        let b = spectrum(&[(50.0, 100.0)]);
        let config = SimilarityConfig {
            intensity_power: 0.0,
            ..SimilarityConfig::default()
        };
        assert_eq!(spectrum_similarity(&a, &b, &config).unwrap(), MAX_SCORE);
    }

    #[test]
    fn non_finite_score_is_a_pair_failure() {
        let experiments = names(2);
        let config = SimilarityConfig {
            intensity_power: 2.0,
            ..SimilarityConfig::default()
        };
        assert!(config.validate().is_ok());
        let huge = spectrum(&[(50.0, 1e300), (51.0, 2e300)]);

        let err = spectrum_similarity(&huge, &huge.clone(), &config).unwrap_err();
        assert!(matches!(err, ConsensusError::Similarity(_)));

        let engine = SimilarityEngine::new(&experiments, &config);
        let result = engine.compare_slot(4, &[Some(&huge), Some(&huge)], None).unwrap();
        assert_eq!(result.scores(), vec![None]);
        assert_eq!(result.failures.len(), 1);
    }

    #[test]
    fn negative_exponents_are_rejected() {
        for config in [
            SimilarityConfig {
                intensity_power: -0.5,
                ..SimilarityConfig::default()
            },
            SimilarityConfig {
                mz_power: -1.0,
                ..SimilarityConfig::default()
            },
        ] {
            assert!(matches!(
                config.validate(),
                Err(ConsensusError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn config_validation_rejects_bad_ranges() {
        let config = SimilarityConfig {
            mz_min: 100.0,
            mz_max: Some(50.0),
            ..SimilarityConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(SimilarityConfig::default().validate().is_ok());
    }
}
