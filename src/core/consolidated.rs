//! 合并结果数据模型
//!
//! 输出JSON文档是唯一的持久化产物，字段名与导出/报告组件约定一致：
//! ```json
//! { "peak_number": 1,
//!   "rt_list": [12.3, null], "area_list": [...], "ms_list": [{"mass_list": [...], "intensity_list": [...]}, null],
//!   "ms_comparison": {"A & B": 998.2},
//!   "hits": [{"name": "...", "cas": "...", "mf_list": [...], "rmf_list": [...], "hit_numbers": [...]}] }
//! ```
//! 所有按实验对齐的列表长度都等于实验数，缺失位置为 `null`。

use std::fmt;

use serde::{Deserialize, Serialize};

use super::model::MassSpectrum;
use super::stats::{PresentStats, present_count, present_mean, present_stdev};

/// 实验对名称分隔符（`"exprA & exprB"`）
pub const PAIR_SEPARATOR: &str = " & ";

/// 一个对齐峰的候选化合物（跨实验合并）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedSearchResult {
    pub name: String,
    pub cas: String,
    pub mf_list: Vec<Option<f64>>,
    pub rmf_list: Vec<Option<f64>>,
    /// 1起始的命中排名
    pub hit_numbers: Vec<Option<u32>>,
}

impl ConsolidatedSearchResult {
    /// 创建全部缺失的候选记录
    pub fn empty(name: impl Into<String>, experiment_count: usize) -> Self {
        Self {
            name: name.into(),
            cas: String::new(),
            mf_list: vec![None; experiment_count],
            rmf_list: vec![None; experiment_count],
            hit_numbers: vec![None; experiment_count],
        }
    }

    /// 出现该候选的实验数
    pub fn frequency(&self) -> usize {
        present_count(&self.hit_numbers)
    }

    pub fn match_factor(&self) -> f64 {
        present_mean(&self.mf_list)
    }

    pub fn match_factor_stdev(&self) -> f64 {
        present_stdev(&self.mf_list)
    }

    pub fn reverse_match_factor(&self) -> f64 {
        present_mean(&self.rmf_list)
    }

    pub fn reverse_match_factor_stdev(&self) -> f64 {
        present_stdev(&self.rmf_list)
    }

    /// 平均命中排名
    pub fn hit_number(&self) -> f64 {
        present_mean(&self.hit_number_values())
    }

    pub fn hit_number_stdev(&self) -> f64 {
        present_stdev(&self.hit_number_values())
    }

    fn hit_number_values(&self) -> Vec<Option<f64>> {
        self.hit_numbers
            .iter()
            .map(|n| n.map(f64::from))
            .collect()
    }
}

/// 一个实验对的质谱相似度（失败的比较记为 `None`）
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityPair {
    pub left: String,
    pub right: String,
    pub score: Option<f64>,
}

impl SimilarityPair {
    pub fn key(&self) -> String {
        format!("{}{PAIR_SEPARATOR}{}", self.left, self.right)
    }
}

/// 一个对齐峰的合并记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedPeak {
    pub peak_number: u32,
    pub rt_list: Vec<Option<f64>>,
    pub area_list: Vec<Option<f64>>,
    pub ms_list: Vec<Option<MassSpectrum>>,
    /// 按实验顺序排列的实验对（仅包含两张质谱都存在的实验对）
    #[serde(with = "pair_map")]
    pub ms_comparison: Vec<SimilarityPair>,
    /// 已排序：最佳候选在前
    pub hits: Vec<ConsolidatedSearchResult>,
}

impl ConsolidatedPeak {
    pub fn experiment_count(&self) -> usize {
        self.rt_list.len()
    }

    /// 检出该峰的实验数
    pub fn appearances(&self) -> usize {
        present_count(&self.rt_list)
    }

    pub fn rt_stats(&self) -> Option<PresentStats> {
        PresentStats::from_present(self.rt_list.iter().copied())
    }

    pub fn area_stats(&self) -> Option<PresentStats> {
        PresentStats::from_present(self.area_list.iter().copied())
    }

    pub fn rt(&self) -> f64 {
        present_mean(&self.rt_list)
    }

    pub fn rt_stdev(&self) -> f64 {
        present_stdev(&self.rt_list)
    }

    pub fn area(&self) -> f64 {
        present_mean(&self.area_list)
    }

    pub fn area_stdev(&self) -> f64 {
        present_stdev(&self.area_list)
    }

    /// 保留时间 %RSD
    pub fn rt_rsd(&self) -> f64 {
        self.rt_stats().map_or(f64::NAN, |s| s.rsd())
    }

    /// 峰面积 %RSD
    pub fn area_rsd(&self) -> f64 {
        self.area_stats().map_or(f64::NAN, |s| s.rsd())
    }

    /// 有效实验对的相似度分数（原始向量，供审计）
    pub fn ms_comparison_scores(&self) -> Vec<Option<f64>> {
        self.ms_comparison.iter().map(|p| p.score).collect()
    }

    pub fn ms_comparison_mean(&self) -> f64 {
        present_mean(&self.ms_comparison_scores())
    }

    pub fn ms_comparison_stdev(&self) -> f64 {
        present_stdev(&self.ms_comparison_scores())
    }

    pub fn top_hit(&self) -> Option<&ConsolidatedSearchResult> {
        self.hits.first()
    }

    /// 平均质谱：所有存在质谱的逐 m/z 平均强度
    ///
    /// 某张质谱中没有的 m/z 按强度0计入。
    pub fn average_mass_spectrum(&self) -> Option<MassSpectrum> {
        let spectra: Vec<&MassSpectrum> = self.ms_list.iter().flatten().collect();
        if spectra.is_empty() {
            return None;
        }

        let mut points: Vec<(f64, f64)> = spectra
            .iter()
            .flat_map(|s| s.mass_list.iter().copied().zip(s.intensity_list.iter().copied()))
            .collect();
        points.sort_by(|a, b| a.0.total_cmp(&b.0));

        let count = spectra.len() as f64;
        let mut mass_list: Vec<f64> = Vec::new();
        let mut intensity_list: Vec<f64> = Vec::new();
        for (mz, intensity) in points {
            match mass_list.last() {
                Some(last) if *last == mz => {
                    if let Some(total) = intensity_list.last_mut() {
                        *total += intensity;
                    }
                }
                _ => {
                    mass_list.push(mz);
                    intensity_list.push(intensity);
                }
            }
        }
        for total in &mut intensity_list {
            *total /= count;
        }

        Some(MassSpectrum::new(mass_list, intensity_list))
    }
}

/// `ms_comparison` 的JSON映射表示：`{"exprA & exprB": score}`，保持实验对顺序
mod pair_map {
    use super::{PAIR_SEPARATOR, SimilarityPair, fmt};
    use serde::de::{self, MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        pairs: &[SimilarityPair],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(pairs.len()))?;
        for pair in pairs {
            map.serialize_entry(&pair.key(), &pair.score)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<SimilarityPair>, D::Error> {
        deserializer.deserialize_map(PairVisitor)
    }

    struct PairVisitor;

    impl<'de> Visitor<'de> for PairVisitor {
        type Value = Vec<SimilarityPair>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of \"exprA & exprB\" keys to similarity scores")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut pairs = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((key, score)) = access.next_entry::<String, Option<f64>>()? {
                let (left, right) = key.split_once(PAIR_SEPARATOR).ok_or_else(|| {
                    de::Error::custom(format!("comparison key {key:?} has no {PAIR_SEPARATOR:?}"))
                })?;
                pairs.push(SimilarityPair {
                    left: left.to_string(),
                    right: right.to_string(),
                    score,
                });
            }
            Ok(pairs)
        }
    }
}
