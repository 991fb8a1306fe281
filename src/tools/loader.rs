//! 输入文档加载模块
//!
//! 对齐文档（JSON）：
//! ```json
//! { "experiments": ["A", "B"],
//!   "rt":   {"1": {"A": 12.3, "B": null}},
//!   "area": {"1": {"A": 1000.0, "B": null}},
//!   "ms":   {"1": {"A": {"mass_list": [...], "intensity_list": [...]}, "B": null}},
//!   "hits": {"A": {"1": [{"name": "...", "cas": "...", "match_factor": 900, "reverse_match_factor": 910}]}} }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::consolidated::ConsolidatedPeak;
use crate::core::model::{AlignedDataset, AlignedTable, AlignmentTables, HitTable, MassSpectrum};
use crate::error::ConsensusResult;
use crate::processing::ConsolidateConfig;

/// 对齐组件与化合物鉴定组件的合并输入文档
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlignmentDocument {
    pub experiments: Vec<String>,
    pub rt: AlignedTable<f64>,
    pub area: AlignedTable<f64>,
    pub ms: AlignedTable<MassSpectrum>,
    #[serde(default)]
    pub hits: HitTable,
}

impl AlignmentDocument {
    /// 校验并转换为对齐数据集
    pub fn into_dataset(self) -> ConsensusResult<AlignedDataset> {
        AlignedDataset::from_tables(
            self.experiments,
            AlignmentTables {
                rt: self.rt,
                area: self.area,
                ms: self.ms,
            },
            self.hits,
        )
    }
}

/// 从JSON文本解析对齐数据集
pub fn parse_alignment(text: &str) -> ConsensusResult<AlignedDataset> {
    let document: AlignmentDocument = serde_json::from_str(text)?;
    document.into_dataset()
}

/// 从文件加载对齐数据集
pub fn load_alignment(path: &Path) -> ConsensusResult<AlignedDataset> {
    let text = std::fs::read_to_string(path)?;
    parse_alignment(&text)
}

/// 加载合并结果文档（`Vec<ConsolidatedPeak>`）
pub fn load_consolidated(path: &Path) -> ConsensusResult<Vec<ConsolidatedPeak>> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// 加载合并配置文件（缺省字段取默认值）
pub fn load_config(path: &Path) -> ConsensusResult<ConsolidateConfig> {
    let text = std::fs::read_to_string(path)?;
    let config: ConsolidateConfig = serde_json::from_str(&text)?;
    config.validate()?;
    Ok(config)
}
