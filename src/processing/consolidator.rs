//! 对齐峰合并协调器
//!
//! 对每个对齐峰依次运行命中合并与质谱相似度计算，组装合并记录。
//! 对齐峰之间在有界 rayon 线程池中并行，峰内部单线程执行。
//!
//! ## 确定性
//! - 结果按峰号重新排序，与工作线程完成顺序无关
//! - 峰内所有浮点累加都按固定的实验顺序进行
//! - 告警按峰号稳定排序（同一峰的告警由同一工作线程按顺序产生）
//!
//! ## 失败策略
//! 任一对齐峰出现致命错误即中止整个运行：记录目前失败的最小峰号，峰号更大的
//! 峰被跳过，峰号更小的峰照常计算。因此返回的总是全局峰号最小的那个错误，
//! 与线程数无关。实验对级别的失败只降级为缺失分数 + 告警。

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::consolidated::ConsolidatedPeak;
use crate::core::hit_aggregator::HitAggregator;
use crate::core::model::{AlignedDataset, AlignmentSlot, MassSpectrum};
use crate::core::similarity::{SimilarityConfig, SimilarityEngine, SlotDeadline};
use crate::error::{ConsensusError, ConsensusResult};
use crate::tools::constants::defaults;
use crate::tools::utils::effective_parallel_degree;

/// 合并运行配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidateConfig {
    /// 每个对齐峰保留的候选化合物数（K）
    pub top_n_hits: usize,
    pub similarity: SimilarityConfig,
    /// 工作线程数，`None` 按CPU核数自动选择
    pub workers: Option<usize>,
    /// 单个对齐峰的处理时限
    pub slot_timeout_ms: Option<u64>,
}

impl Default for ConsolidateConfig {
    fn default() -> Self {
        Self {
            top_n_hits: defaults::TOP_N_HITS,
            similarity: SimilarityConfig::default(),
            workers: None,
            slot_timeout_ms: None,
        }
    }
}

impl ConsolidateConfig {
    pub fn validate(&self) -> ConsensusResult<()> {
        if self.top_n_hits == 0 {
            return Err(ConsensusError::InvalidInput(
                "top_n_hits must be at least 1".to_string(),
            ));
        }
        if self.slot_timeout_ms == Some(0) {
            return Err(ConsensusError::InvalidInput(
                "slot_timeout_ms must be positive".to_string(),
            ));
        }
        self.similarity.validate()
    }
}

/// 非致命告警类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningKind {
    /// 实验对相似度计算失败，分数记为缺失
    SimilarityFailure,
    /// 同一候选的CAS号在实验间不一致
    CasConflict,
    /// 检出的峰缺少质谱
    MissingSpectrum,
}

/// 非致命告警记录（供审计）
#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidationWarning {
    pub peak_number: u32,
    pub kind: WarningKind,
    pub message: String,
}

/// 一次完整运行的结果
#[derive(Debug, Clone)]
pub struct ConsolidationReport {
    /// 按峰号升序
    pub peaks: Vec<ConsolidatedPeak>,
    pub warnings: Vec<ConsolidationWarning>,
    pub elapsed: Duration,
    pub workers: usize,
}

/// 有序结果容器（保证输出顺序）
struct OrderedSlot {
    peak_number: u32,
    result: ConsensusResult<ConsolidatedPeak>,
}

/// 对齐峰合并协调器
///
/// 每次运行都从只读的对齐数据集重新生成全部结果，不做增量更新；
/// 重新运行前调用方应丢弃上一次的结果。
#[derive(Debug)]
pub struct PeakConsolidator {
    config: ConsolidateConfig,
}

impl PeakConsolidator {
    pub fn new(config: ConsolidateConfig) -> ConsensusResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ConsolidateConfig {
        &self.config
    }

    /// 合并全部对齐峰，按峰号返回
    pub fn consolidate(&self, dataset: &AlignedDataset) -> ConsensusResult<Vec<ConsolidatedPeak>> {
        self.consolidate_with_report(dataset).map(|report| report.peaks)
    }

    /// 合并全部对齐峰，同时返回告警和耗时
    pub fn consolidate_with_report(
        &self,
        dataset: &AlignedDataset,
    ) -> ConsensusResult<ConsolidationReport> {
        let start_time = Instant::now();
        let degree = effective_parallel_degree(self.config.workers, Some(dataset.len()));

        log::info!(
            "consolidating {} aligned peaks across {} experiments with {degree} workers / 开始合并",
            dataset.len(),
            dataset.experiment_count()
        );

        // 1️⃣ 有界线程池（与对齐峰数量无关）
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(degree)
            .thread_name(|i| format!("consensus-worker-{i}"))
            .build()
            .map_err(|e| ConsensusError::ResourceError(format!("线程池创建失败: {e}")))?;

        // 目前失败的最小峰号（u32::MAX 表示尚无失败）
        let lowest_failed = AtomicU32::new(u32::MAX);
        let (sender, receiver) = crossbeam_channel::unbounded();
        let experiments = dataset.experiments();

        // 2️⃣ 并行处理（屏障：全部完成后才返回）
        let mut results: Vec<OrderedSlot> = pool.install(|| {
            dataset
                .slots()
                .par_iter()
                .map_with(sender.clone(), |warnings, slot| {
                    if slot.peak_number > lowest_failed.load(Ordering::Acquire) {
                        return OrderedSlot {
                            peak_number: slot.peak_number,
                            result: Err(ConsensusError::Cancelled),
                        };
                    }

                    let result = self.consolidate_slot(experiments, slot, warnings);
                    if let Err(e) = &result {
                        log::error!("peak {} aborted the run / 运行中止: {e}", slot.peak_number);
                        lowest_failed.fetch_min(slot.peak_number, Ordering::AcqRel);
                    }

                    OrderedSlot {
                        peak_number: slot.peak_number,
                        result,
                    }
                })
                .collect()
        });
        drop(sender);

        // 3️⃣ 按峰号排序（关键：保证输出顺序）
        results.sort_by_key(|r| r.peak_number);

        // 4️⃣ 快速失败：返回峰号最小的真实错误
        if lowest_failed.load(Ordering::Acquire) != u32::MAX {
            let mut cancelled = None;
            for slot in results {
                match slot.result {
                    Err(ConsensusError::Cancelled) => cancelled = Some(ConsensusError::Cancelled),
                    Err(e) => return Err(e),
                    Ok(_) => {}
                }
            }
            return Err(cancelled.unwrap_or(ConsensusError::Cancelled));
        }

        let peaks = results
            .into_iter()
            .map(|slot| slot.result)
            .collect::<ConsensusResult<Vec<_>>>()?;

        let mut warnings: Vec<ConsolidationWarning> = receiver.try_iter().collect();
        warnings.sort_by_key(|w| w.peak_number);

        let elapsed = start_time.elapsed();
        log::info!(
            "consolidated {} peaks in {:.3}s with {} warnings / 合并完成",
            peaks.len(),
            elapsed.as_secs_f64(),
            warnings.len()
        );

        Ok(ConsolidationReport {
            peaks,
            warnings,
            elapsed,
            workers: degree,
        })
    }

    /// 合并单个对齐峰（峰内单线程）
    pub fn consolidate_slot(
        &self,
        experiments: &[String],
        slot: &AlignmentSlot,
        warnings: &Sender<ConsolidationWarning>,
    ) -> ConsensusResult<ConsolidatedPeak> {
        let deadline = self
            .config
            .slot_timeout_ms
            .map(|ms| SlotDeadline::start(Duration::from_millis(ms)));
        let peak_number = slot.peak_number;

        let aggregation = HitAggregator::new(experiments).aggregate(slot)?;
        for conflict in &aggregation.cas_conflicts {
            let _ = warnings.send(ConsolidationWarning {
                peak_number,
                kind: WarningKind::CasConflict,
                message: format!(
                    "{}: kept CAS {} and ignored {} from {}",
                    conflict.candidate, conflict.kept, conflict.ignored, conflict.experiment
                ),
            });
        }

        let mut hits = aggregation.results;
        hits.truncate(self.config.top_n_hits);

        let mut rt_list = Vec::with_capacity(experiments.len());
        let mut area_list = Vec::with_capacity(experiments.len());
        let mut ms_list = Vec::with_capacity(experiments.len());
        let mut spectra: Vec<Option<&MassSpectrum>> = Vec::with_capacity(experiments.len());

        for (name, peak) in experiments.iter().zip(&slot.peaks) {
            match peak {
                Some(peak) => {
                    rt_list.push(Some(peak.rt));
                    area_list.push(Some(peak.area));
                    ms_list.push(peak.mass_spectrum.clone());
                    spectra.push(peak.mass_spectrum.as_ref());

                    if peak.mass_spectrum.is_none() {
                        log::debug!("peak {peak_number}: {name} has no mass spectrum / 缺少质谱");
                        let _ = warnings.send(ConsolidationWarning {
                            peak_number,
                            kind: WarningKind::MissingSpectrum,
                            message: format!("{name} detected the peak without a mass spectrum"),
                        });
                    }
                }
                None => {
                    rt_list.push(None);
                    area_list.push(None);
                    ms_list.push(None);
                    spectra.push(None);
                }
            }
        }

        let similarity = SimilarityEngine::new(experiments, &self.config.similarity).compare_slot(
            peak_number,
            &spectra,
            deadline.as_ref(),
        )?;
        for failure in &similarity.failures {
            let _ = warnings.send(ConsolidationWarning {
                peak_number,
                kind: WarningKind::SimilarityFailure,
                message: format!("{} vs {}: {}", failure.left, failure.right, failure.message),
            });
        }

        if let Some(deadline) = &deadline {
            deadline.check(peak_number)?;
        }

        log::debug!(
            "peak {peak_number}: {} candidates, {} spectrum pairs / 峰处理完成",
            hits.len(),
            similarity.pairs.len()
        );

        Ok(ConsolidatedPeak {
            peak_number,
            rt_list,
            area_list,
            ms_list,
            ms_comparison: similarity.pairs,
            hits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{Hit, Peak};

    fn spectrum() -> MassSpectrum {
        MassSpectrum::new(vec![41.0, 43.0, 57.0], vec![200.0, 999.0, 350.0])
    }

    fn dataset() -> AlignedDataset {
        let experiments = vec!["A".to_string(), "B".to_string()];
        let slots = (1..=6)
            .map(|n| {
                AlignmentSlot::new(
                    n,
                    vec![
                        Some(
                            Peak::new(n as f64 * 10.0, 1000.0)
                                .with_spectrum(spectrum())
                                .with_hits(vec![
                                    Hit::new("Alpha", "1-1-1", 900.0, 900.0),
                                    Hit::new("Beta", "2-2-2", 800.0, 800.0),
                                ]),
                        ),
                        (n % 2 == 0).then(|| {
                            Peak::new(n as f64 * 10.0 + 0.5, 1100.0)
                                .with_spectrum(spectrum())
                                .with_hits(vec![Hit::new("Beta", "2-2-2", 850.0, 800.0)])
                        }),
                    ],
                )
            })
            .collect();
        AlignedDataset::new(experiments, slots).unwrap()
    }

    #[test]
    fn output_is_ordered_by_peak_number() {
        let consolidator = PeakConsolidator::new(ConsolidateConfig {
            workers: Some(3),
            ..ConsolidateConfig::default()
        })
        .unwrap();
        let peaks = consolidator.consolidate(&dataset()).unwrap();
        let numbers: Vec<u32> = peaks.iter().map(|p| p.peak_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn top_n_truncates_candidates() {
        let consolidator = PeakConsolidator::new(ConsolidateConfig {
            top_n_hits: 1,
            ..ConsolidateConfig::default()
        })
        .unwrap();
        let peaks = consolidator.consolidate(&dataset()).unwrap();
        assert!(peaks.iter().all(|p| p.hits.len() == 1));
        // 峰2：Beta 在两个实验中出现，排在 Alpha 前
        assert_eq!(peaks[1].hits[0].name, "Beta");
        assert_eq!(peaks[0].hits[0].name, "Alpha");
    }

    #[test]
    fn missing_spectrum_is_a_warning() {
        let experiments = vec!["A".to_string(), "B".to_string()];
        let slot = AlignmentSlot::new(
            1,
            vec![
                Some(Peak::new(1.0, 1.0).with_spectrum(spectrum())),
                Some(Peak::new(1.1, 1.0)),
            ],
        );
        let dataset = AlignedDataset::new(experiments, vec![slot]).unwrap();
        let report = PeakConsolidator::new(ConsolidateConfig::default())
            .unwrap()
            .consolidate_with_report(&dataset)
            .unwrap();

        assert!(report.peaks[0].ms_comparison.is_empty());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].kind, WarningKind::MissingSpectrum);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ConsolidateConfig {
            top_n_hits: 0,
            ..ConsolidateConfig::default()
        };
        assert!(PeakConsolidator::new(config).is_err());
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: ConsolidateConfig =
            serde_json::from_str(r#"{"top_n_hits": 3, "similarity": {"tolerance": 0.3}}"#).unwrap();
        assert_eq!(config.top_n_hits, 3);
        assert_eq!(config.similarity.tolerance, 0.3);
        assert_eq!(config.similarity.intensity_power, defaults::INTENSITY_POWER);
        assert_eq!(config.workers, None);
    }
}
