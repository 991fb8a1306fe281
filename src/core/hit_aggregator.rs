//! 命中合并模块
//!
//! 把同一对齐峰在各实验中的库检索命中列表合并为排序后的候选化合物：
//! 1. 按实验顺序、命中顺序收集所有出现过的名称（首次出现顺序）
//! 2. 对每个名称，在每个实验的命中列表中取第一个同名命中，记录 MF/RMF/排名；未出现则为缺失
//! 3. 按 (出现次数 降序, 平均MF 降序, 平均排名 升序) 稳定排序，并列时保持首次出现顺序
//!
//! 排名数值越小越靠前：出现次数和平均MF都相同时，检索排名更好的候选在前，
//! 同一实验内先出现的候选因此总是排在后出现的候选之前。
//!
//! 截取前K个候选由调用方负责。

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use super::consolidated::ConsolidatedSearchResult;
use super::model::AlignmentSlot;
use crate::error::{ConsensusResult, integrity_error};

/// 同一候选在不同实验中给出了不同的CAS号
///
/// 合并策略：保留按实验顺序第一个非空的CAS号，其余记录为冲突。
#[derive(Debug, Clone, PartialEq)]
pub struct CasConflict {
    pub candidate: String,
    pub kept: String,
    pub ignored: String,
    pub experiment: String,
}

/// 单个对齐峰的合并结果
#[derive(Debug, Clone, Default)]
pub struct HitAggregation {
    /// 已排序，最佳候选在前
    pub results: Vec<ConsolidatedSearchResult>,
    pub cas_conflicts: Vec<CasConflict>,
}

/// 命中合并器
pub struct HitAggregator<'a> {
    experiments: &'a [String],
}

impl<'a> HitAggregator<'a> {
    pub fn new(experiments: &'a [String]) -> Self {
        Self { experiments }
    }

    /// 合并一个对齐峰的所有命中列表
    ///
    /// 没有任何实验检出的对齐峰是致命的输入完整性错误。
    pub fn aggregate(&self, slot: &AlignmentSlot) -> ConsensusResult<HitAggregation> {
        if slot.present_count() == 0 {
            return Err(integrity_error(
                slot.peak_number,
                "no experiment detected this aligned peak",
            ));
        }
        if slot.peaks.len() != self.experiments.len() {
            return Err(integrity_error(
                slot.peak_number,
                format!(
                    "slot has {} experiment entries, expected {}",
                    slot.peaks.len(),
                    self.experiments.len()
                ),
            ));
        }

        // 每个实验：名称 -> 第一个同名命中的位置
        let first_positions: Vec<Option<HashMap<&str, usize>>> = slot
            .peaks
            .iter()
            .map(|peak| {
                peak.as_ref().map(|p| {
                    let mut positions = HashMap::with_capacity(p.hits.len());
                    for (pos, hit) in p.hits.iter().enumerate() {
                        positions.entry(hit.name.as_str()).or_insert(pos);
                    }
                    positions
                })
            })
            .collect();

        let mut candidates: Vec<&str> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        for peak in slot.peaks.iter().flatten() {
            for hit in &peak.hits {
                if seen.insert(hit.name.as_str()) {
                    candidates.push(hit.name.as_str());
                }
            }
        }

        let experiment_count = self.experiments.len();
        let mut cas_conflicts = Vec::new();
        let mut results = Vec::with_capacity(candidates.len());

        for name in candidates {
            let mut result = ConsolidatedSearchResult::empty(name, experiment_count);

            for (index, (peak, positions)) in slot.peaks.iter().zip(&first_positions).enumerate() {
                let (Some(peak), Some(positions)) = (peak, positions) else {
                    continue;
                };
                let Some(&pos) = positions.get(name) else {
                    continue;
                };
                let hit = &peak.hits[pos];

                result.mf_list[index] = Some(hit.match_factor);
                result.rmf_list[index] = Some(hit.reverse_match_factor);
                result.hit_numbers[index] = Some(pos as u32 + 1);

                if hit.cas.is_empty() || hit.cas == result.cas {
                    continue;
                }
                if result.cas.is_empty() {
                    result.cas = hit.cas.clone();
                } else {
                    log::warn!(
                        "peak {}: CAS conflict for {name:?}, keeping {} and ignoring {} from {}",
                        slot.peak_number,
                        result.cas,
                        hit.cas,
                        self.experiments[index]
                    );
                    cas_conflicts.push(CasConflict {
                        candidate: name.to_string(),
                        kept: result.cas.clone(),
                        ignored: hit.cas.clone(),
                        experiment: self.experiments[index].clone(),
                    });
                }
            }

            results.push(result);
        }

        rank_candidates(&mut results);

        Ok(HitAggregation {
            results,
            cas_conflicts,
        })
    }
}

/// 排序键：出现次数和平均MF降序，平均排名升序
struct RankKey {
    frequency: usize,
    match_factor: f64,
    hit_number: f64,
}

impl RankKey {
    fn of(result: &ConsolidatedSearchResult) -> Self {
        Self {
            frequency: result.frequency(),
            match_factor: result.match_factor(),
            hit_number: result.hit_number(),
        }
    }

    fn best_first(&self, other: &Self) -> Ordering {
        other
            .frequency
            .cmp(&self.frequency)
            .then_with(|| other.match_factor.total_cmp(&self.match_factor))
            .then_with(|| self.hit_number.total_cmp(&other.hit_number))
    }
}

/// 对候选进行稳定排序（并列时保持原有顺序）
pub fn rank_candidates(results: &mut [ConsolidatedSearchResult]) {
    results.sort_by(|a, b| RankKey::of(a).best_first(&RankKey::of(b)));
}
