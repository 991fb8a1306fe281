//! 输入数据模型
//!
//! 对齐数据集（外部对齐组件产出，只读）：
//! ```text
//!  peak_number ─┬─ experiment[0] → Option<Peak>
//!               ├─ experiment[1] → Option<Peak>
//!               └─ ...            （固定的实验顺序，所有峰共享）
//! ```
//! `Peak` 汇集该实验在该对齐峰上的保留时间、峰面积、质谱和库检索命中列表。

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::consolidated::PAIR_SEPARATOR;
use crate::error::{ConsensusError, ConsensusResult, integrity_error, integrity_error_at};

/// 库检索命中（已按检索引擎排名排序，排名 = 位置 + 1）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub name: String,
    #[serde(default)]
    pub cas: String,
    pub match_factor: f64,
    pub reverse_match_factor: f64,
}

impl Hit {
    pub fn new(
        name: impl Into<String>,
        cas: impl Into<String>,
        match_factor: f64,
        reverse_match_factor: f64,
    ) -> Self {
        Self {
            name: name.into(),
            cas: cas.into(),
            match_factor,
            reverse_match_factor,
        }
    }
}

/// 质谱（m/z 已分箱，可直接两两比较）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MassSpectrum {
    pub mass_list: Vec<f64>,
    pub intensity_list: Vec<f64>,
}

impl MassSpectrum {
    pub fn new(mass_list: Vec<f64>, intensity_list: Vec<f64>) -> Self {
        Self {
            mass_list,
            intensity_list,
        }
    }

    /// 检查质谱结构是否有效（等长、有限值、非负强度）
    pub fn check(&self) -> Result<(), String> {
        if self.mass_list.len() != self.intensity_list.len() {
            return Err(format!(
                "mass_list has {} values but intensity_list has {}",
                self.mass_list.len(),
                self.intensity_list.len()
            ));
        }
        if let Some(mz) = self.mass_list.iter().find(|v| !v.is_finite()) {
            return Err(format!("non-finite m/z value {mz}"));
        }
        if let Some(int) = self
            .intensity_list
            .iter()
            .find(|v| !v.is_finite() || **v < 0.0)
        {
            return Err(format!("invalid intensity value {int}"));
        }
        Ok(())
    }
}

/// 单个实验在单个对齐峰上的检出结果
#[derive(Debug, Clone, PartialEq)]
pub struct Peak {
    pub rt: f64,
    pub area: f64,
    /// 质谱缺失不属于异常，仅记为 `None`
    pub mass_spectrum: Option<MassSpectrum>,
    /// 空列表同时代表"未检索"和"检索无结果"，两者不加区分
    pub hits: Vec<Hit>,
}

impl Peak {
    pub fn new(rt: f64, area: f64) -> Self {
        Self {
            rt,
            area,
            mass_spectrum: None,
            hits: Vec::new(),
        }
    }

    pub fn with_spectrum(mut self, spectrum: MassSpectrum) -> Self {
        self.mass_spectrum = Some(spectrum);
        self
    }

    pub fn with_hits(mut self, hits: Vec<Hit>) -> Self {
        self.hits = hits;
        self
    }
}

/// 对齐峰：一个全局峰号 + 每个实验的可选检出
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentSlot {
    pub peak_number: u32,
    /// 与数据集的实验顺序按位置对齐
    pub peaks: Vec<Option<Peak>>,
}

impl AlignmentSlot {
    pub fn new(peak_number: u32, peaks: Vec<Option<Peak>>) -> Self {
        Self { peak_number, peaks }
    }

    /// 检出该峰的实验数
    pub fn present_count(&self) -> usize {
        self.peaks.iter().filter(|p| p.is_some()).count()
    }
}

/// 峰号 → 实验名 → 值 的对齐表
pub type AlignedTable<T> = BTreeMap<u32, BTreeMap<String, Option<T>>>;

/// 实验名 → 峰号 → 有序命中列表
pub type HitTable = BTreeMap<String, BTreeMap<u32, Vec<Hit>>>;

/// 对齐组件输出的三张表
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlignmentTables {
    pub rt: AlignedTable<f64>,
    pub area: AlignedTable<f64>,
    pub ms: AlignedTable<MassSpectrum>,
}

/// 对齐数据集（只读，可在工作线程间无锁共享）
#[derive(Debug, Clone)]
pub struct AlignedDataset {
    experiments: Vec<String>,
    /// 按峰号升序
    slots: Vec<AlignmentSlot>,
}

impl AlignedDataset {
    /// 从已组装好的对齐峰构建数据集
    ///
    /// 校验实验名唯一、每个峰的实验列表长度一致、峰号不重复；对齐峰按峰号排序。
    pub fn new(experiments: Vec<String>, mut slots: Vec<AlignmentSlot>) -> ConsensusResult<Self> {
        validate_experiment_names(&experiments)?;

        let mut seen = BTreeSet::new();
        for slot in &slots {
            if slot.peaks.len() != experiments.len() {
                return Err(integrity_error(
                    slot.peak_number,
                    format!(
                        "slot has {} experiment entries, dataset has {} experiments",
                        slot.peaks.len(),
                        experiments.len()
                    ),
                ));
            }
            if !seen.insert(slot.peak_number) {
                return Err(integrity_error(slot.peak_number, "duplicate peak number"));
            }
        }

        slots.sort_by_key(|s| s.peak_number);
        Ok(Self { experiments, slots })
    }

    /// 从三张对齐表和命中表构建数据集
    ///
    /// 任何不一致（峰号集合不同、实验集合不同、保留时间与峰面积的存在性不一致、
    /// 为未检出的峰提供命中列表）都是致命的完整性错误。
    pub fn from_tables(
        experiments: Vec<String>,
        tables: AlignmentTables,
        hits: HitTable,
    ) -> ConsensusResult<Self> {
        validate_experiment_names(&experiments)?;

        let rt_keys: BTreeSet<u32> = tables.rt.keys().copied().collect();
        check_same_peaks("area", &rt_keys, &tables.area)?;
        check_same_peaks("ms", &rt_keys, &tables.ms)?;

        let expected: BTreeSet<&str> = experiments.iter().map(String::as_str).collect();

        for experiment in hits.keys() {
            if !expected.contains(experiment.as_str()) {
                return Err(ConsensusError::InputIntegrity {
                    peak_number: None,
                    experiment: Some(experiment.clone()),
                    reason: "hit lists supplied for an unknown experiment".to_string(),
                });
            }
        }

        let mut slots = Vec::with_capacity(rt_keys.len());
        for &peak_number in &rt_keys {
            let rt_row = &tables.rt[&peak_number];
            let area_row = &tables.area[&peak_number];
            let ms_row = &tables.ms[&peak_number];

            check_row_experiments("rt", peak_number, &expected, rt_row)?;
            check_row_experiments("area", peak_number, &expected, area_row)?;
            check_row_experiments("ms", peak_number, &expected, ms_row)?;

            let mut peaks = Vec::with_capacity(experiments.len());
            for name in &experiments {
                let rt = rt_row.get(name).copied().flatten();
                let area = area_row.get(name).copied().flatten();
                let spectrum = ms_row.get(name).cloned().flatten();
                let peak_hits = hits.get(name).and_then(|by_peak| by_peak.get(&peak_number));

                let peak = match (rt, area) {
                    (Some(rt), Some(area)) => Some(Peak {
                        rt,
                        area,
                        mass_spectrum: spectrum,
                        hits: peak_hits.cloned().unwrap_or_default(),
                    }),
                    (None, None) => {
                        if spectrum.is_some() {
                            return Err(integrity_error_at(
                                peak_number,
                                name,
                                "mass spectrum present for an undetected peak",
                            ));
                        }
                        if peak_hits.is_some_and(|h| !h.is_empty()) {
                            return Err(integrity_error_at(
                                peak_number,
                                name,
                                "hit list present for an undetected peak",
                            ));
                        }
                        None
                    }
                    _ => {
                        return Err(integrity_error_at(
                            peak_number,
                            name,
                            "retention time and area presence disagree",
                        ));
                    }
                };
                peaks.push(peak);
            }
            slots.push(AlignmentSlot { peak_number, peaks });
        }

        for (experiment, by_peak) in &hits {
            if let Some(peak_number) = by_peak.keys().find(|p| !rt_keys.contains(p)) {
                return Err(integrity_error_at(
                    *peak_number,
                    experiment,
                    "hit list references a peak number missing from the alignment",
                ));
            }
        }

        Ok(Self { experiments, slots })
    }

    /// 固定的实验顺序
    pub fn experiments(&self) -> &[String] {
        &self.experiments
    }

    pub fn experiment_count(&self) -> usize {
        self.experiments.len()
    }

    pub fn slots(&self) -> &[AlignmentSlot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

fn validate_experiment_names(experiments: &[String]) -> ConsensusResult<()> {
    if experiments.is_empty() {
        return Err(ConsensusError::InputIntegrity {
            peak_number: None,
            experiment: None,
            reason: "dataset has no experiments".to_string(),
        });
    }

    let mut seen = BTreeSet::new();
    for name in experiments {
        if name.contains(PAIR_SEPARATOR) {
            return Err(ConsensusError::InputIntegrity {
                peak_number: None,
                experiment: Some(name.clone()),
                reason: format!("experiment name must not contain {PAIR_SEPARATOR:?}"),
            });
        }
        if !seen.insert(name.as_str()) {
            return Err(ConsensusError::InputIntegrity {
                peak_number: None,
                experiment: Some(name.clone()),
                reason: "duplicate experiment name".to_string(),
            });
        }
    }
    Ok(())
}

fn check_same_peaks<T>(
    table: &str,
    expected: &BTreeSet<u32>,
    other: &AlignedTable<T>,
) -> ConsensusResult<()> {
    let keys: BTreeSet<u32> = other.keys().copied().collect();
    if let Some(peak) = keys.symmetric_difference(expected).next() {
        return Err(integrity_error(
            *peak,
            format!("peak number sets of the rt and {table} tables disagree"),
        ));
    }
    Ok(())
}

fn check_row_experiments<T>(
    table: &str,
    peak_number: u32,
    expected: &BTreeSet<&str>,
    row: &BTreeMap<String, Option<T>>,
) -> ConsensusResult<()> {
    let names: BTreeSet<&str> = row.keys().map(String::as_str).collect();
    if let Some(name) = names.symmetric_difference(expected).next() {
        return Err(integrity_error_at(
            peak_number,
            name,
            format!("experiment set of the {table} table disagrees with the dataset"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row<T: Clone>(values: &[(&str, Option<T>)]) -> BTreeMap<String, Option<T>> {
        values
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn two_experiment_tables() -> AlignmentTables {
        let spectrum = MassSpectrum::new(vec![50.0, 51.0], vec![100.0, 20.0]);
        let mut tables = AlignmentTables::default();
        tables
            .rt
            .insert(1, row(&[("A", Some(10.0)), ("B", None)]));
        tables
            .area
            .insert(1, row(&[("A", Some(500.0)), ("B", None)]));
        tables
            .ms
            .insert(1, row(&[("A", Some(spectrum)), ("B", None)]));
        tables
    }

    fn names() -> Vec<String> {
        vec!["A".to_string(), "B".to_string()]
    }

    #[test]
    fn builds_slots_in_experiment_order() {
        let mut hits = HitTable::new();
        hits.entry("A".to_string())
            .or_default()
            .insert(1, vec![Hit::new("Caffeine", "58-08-2", 900.0, 910.0)]);

        let dataset = AlignedDataset::from_tables(names(), two_experiment_tables(), hits).unwrap();
        assert_eq!(dataset.len(), 1);
        let slot = &dataset.slots()[0];
        assert_eq!(slot.present_count(), 1);
        let peak_a = slot.peaks[0].as_ref().unwrap();
        assert_eq!(peak_a.rt, 10.0);
        assert_eq!(peak_a.hits.len(), 1);
        assert!(slot.peaks[1].is_none());
    }

    #[test]
    fn rejects_disagreeing_peak_sets() {
        let mut tables = two_experiment_tables();
        tables.area.insert(2, row(&[("A", Some(1.0)), ("B", None)]));

        let err = AlignedDataset::from_tables(names(), tables, HitTable::new()).unwrap_err();
        match err {
            ConsensusError::InputIntegrity { peak_number, .. } => assert_eq!(peak_number, Some(2)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_rt_area_presence_mismatch() {
        let mut tables = two_experiment_tables();
        tables
            .area
            .insert(1, row(&[("A", None), ("B", None)]));

        let err = AlignedDataset::from_tables(names(), tables, HitTable::new()).unwrap_err();
        assert!(err.to_string().contains("experiment A"));
    }

    #[test]
    fn rejects_hits_for_undetected_peak() {
        let mut hits = HitTable::new();
        hits.entry("B".to_string())
            .or_default()
            .insert(1, vec![Hit::new("X", "", 700.0, 700.0)]);

        let err = AlignedDataset::from_tables(names(), two_experiment_tables(), hits).unwrap_err();
        assert!(err.to_string().contains("experiment B"));
    }

    #[test]
    fn rejects_separator_in_experiment_name() {
        let err = AlignedDataset::new(vec!["A & B".to_string()], vec![]).unwrap_err();
        assert!(matches!(err, ConsensusError::InputIntegrity { .. }));
    }

    #[test]
    fn new_sorts_slots_by_peak_number() {
        let slots = vec![
            AlignmentSlot::new(5, vec![Some(Peak::new(5.0, 1.0))]),
            AlignmentSlot::new(2, vec![Some(Peak::new(2.0, 1.0))]),
        ];
        let dataset = AlignedDataset::new(vec!["A".to_string()], slots).unwrap();
        let numbers: Vec<u32> = dataset.slots().iter().map(|s| s.peak_number).collect();
        assert_eq!(numbers, vec![2, 5]);
    }

    #[test]
    fn spectrum_check_reports_length_mismatch() {
        let bad = MassSpectrum::new(vec![1.0, 2.0], vec![1.0]);
        assert!(bad.check().is_err());
        let negative = MassSpectrum::new(vec![1.0], vec![-1.0]);
        assert!(negative.check().is_err());
        assert!(MassSpectrum::new(vec![1.0], vec![0.0]).check().is_ok());
    }
}
