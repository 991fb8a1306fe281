//! GC-MS 多重复实验合并引擎
//!
//! 输入外部对齐组件产出的对齐峰（每个实验可选的保留时间、峰面积、质谱和库检索命中），
//! 为每个对齐峰生成一条合并记录：排序后的候选化合物、缺失值感知的统计量，
//! 以及实验两两之间的质谱相似度交叉验证。
//!
//! ## 核心特性
//! - 稀疏的 实验×峰×命中 矩阵，缺失统一用 `None` 表示
//! - 确定性的候选排序：(出现次数, 平均MF, 平均排名) 降序，并列保持首次出现顺序
//! - 相同输入与配置产生逐字节相同的JSON输出（法证审计可复现）
//! - 对齐峰级并行（有界线程池），结果按峰号重新排序
//! - 基于汇总统计量的 Student / Welch t 检验用于两组样本比较

pub mod core;
pub mod error;
pub mod processing;
pub mod tools;

// 重新导出核心类型
pub use crate::core::{
    AlignedDataset, AlignmentSlot, AlignmentTables, ComparisonConfig, ConsolidatedPeak,
    ConsolidatedSearchResult, Hit, HitTable, MassSpectrum, Peak, SimilarityConfig,
};
pub use error::{ConsensusError, ConsensusResult, ErrorCategory};
pub use processing::{ConsolidateConfig, ConsolidatedPeakFilter, PeakConsolidator};
