//! 核心算法模块
//!
//! 包含输入/输出数据模型、命中合并、质谱相似度和两组比较的实现。

pub mod comparator;
pub mod consolidated;
pub mod hit_aggregator;
pub mod model;
pub mod similarity;
pub mod stats;

// 重新导出公共接口
pub use comparator::{ComparisonConfig, ComparisonRow, SummaryStats, TTest, Verdict, compare_groups};
pub use consolidated::{ConsolidatedPeak, ConsolidatedSearchResult, SimilarityPair};
pub use hit_aggregator::{HitAggregation, HitAggregator};
pub use model::{AlignedDataset, AlignmentSlot, AlignmentTables, Hit, HitTable, MassSpectrum, Peak};
pub use similarity::{SimilarityConfig, SimilarityEngine, SlotSimilarity};
pub use stats::PresentStats;
