//! 合并结果过滤
//!
//! 调用方在合并之后按需应用，不改变峰号，也不修改保留下来的记录。

use serde::{Deserialize, Serialize};

use crate::core::consolidated::ConsolidatedPeak;
use crate::error::{ConsensusError, ConsensusResult};

/// 合并峰过滤条件
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidatedPeakFilter {
    /// 至少在多少个实验中检出
    pub min_appearances: usize,
    /// 首选候选的平均MF下限（没有候选的峰不通过）
    pub min_match_factor: Option<f64>,
    /// 首选候选名称黑名单（不区分大小写）
    pub name_excludes: Vec<String>,
}

impl ConsolidatedPeakFilter {
    pub fn validate(&self) -> ConsensusResult<()> {
        if let Some(mf) = self.min_match_factor {
            if !(0.0..=1000.0).contains(&mf) {
                return Err(ConsensusError::InvalidInput(format!(
                    "min_match_factor must be within 0–1000, got {mf}"
                )));
            }
        }
        Ok(())
    }

    /// 判断单个峰是否通过过滤
    pub fn accepts(&self, peak: &ConsolidatedPeak) -> bool {
        if peak.appearances() < self.min_appearances {
            return false;
        }

        let top = peak.top_hit();
        if let Some(min_mf) = self.min_match_factor {
            match top {
                Some(hit) if hit.match_factor() >= min_mf => {}
                _ => return false,
            }
        }

        if let Some(hit) = top {
            let name = hit.name.to_lowercase();
            if self
                .name_excludes
                .iter()
                .any(|excluded| excluded.to_lowercase() == name)
            {
                return false;
            }
        }

        true
    }

    /// 过滤并保持原有顺序
    pub fn apply(&self, peaks: Vec<ConsolidatedPeak>) -> Vec<ConsolidatedPeak> {
        let before = peaks.len();
        let kept: Vec<ConsolidatedPeak> = peaks.into_iter().filter(|p| self.accepts(p)).collect();
        log::debug!("peak filter kept {}/{before} peaks / 过滤完成", kept.len());
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::consolidated::ConsolidatedSearchResult;

    fn peak(number: u32, present: usize, top: Option<(&str, f64)>) -> ConsolidatedPeak {
        let rt_list: Vec<Option<f64>> = (0..3).map(|i| (i < present).then_some(10.0)).collect();
        let hits = top
            .map(|(name, mf)| {
                let mut hit = ConsolidatedSearchResult::empty(name, 3);
                hit.mf_list[0] = Some(mf);
                hit.rmf_list[0] = Some(mf);
                hit.hit_numbers[0] = Some(1);
                vec![hit]
            })
            .unwrap_or_default();
        ConsolidatedPeak {
            peak_number: number,
            area_list: rt_list.clone(),
            rt_list,
            ms_list: vec![None; 3],
            ms_comparison: Vec::new(),
            hits,
        }
    }

    #[test]
    fn min_appearances_drops_sparse_peaks() {
        let filter = ConsolidatedPeakFilter {
            min_appearances: 2,
            ..ConsolidatedPeakFilter::default()
        };
        let kept = filter.apply(vec![peak(1, 1, None), peak(2, 3, None)]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].peak_number, 2);
    }

    #[test]
    fn match_factor_threshold_requires_a_hit() {
        let filter = ConsolidatedPeakFilter {
            min_match_factor: Some(800.0),
            ..ConsolidatedPeakFilter::default()
        };
        assert!(!filter.accepts(&peak(1, 3, None)));
        assert!(!filter.accepts(&peak(2, 3, Some(("Toluene", 750.0)))));
        assert!(filter.accepts(&peak(3, 3, Some(("Toluene", 800.0)))));
    }

    #[test]
    fn excluded_names_are_case_insensitive() {
        let filter = ConsolidatedPeakFilter {
            name_excludes: vec!["SILOXANE".to_string()],
            ..ConsolidatedPeakFilter::default()
        };
        assert!(!filter.accepts(&peak(1, 3, Some(("Siloxane", 900.0)))));
        assert!(filter.accepts(&peak(2, 3, Some(("Nitroglycerin", 900.0)))));
    }

    #[test]
    fn out_of_range_threshold_is_invalid() {
        let filter = ConsolidatedPeakFilter {
            min_match_factor: Some(1200.0),
            ..ConsolidatedPeakFilter::default()
        };
        assert!(filter.validate().is_err());
    }
}
