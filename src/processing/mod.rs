//! 合并流程编排模块
//!
//! ```text
//!  AlignedDataset ──► PeakConsolidator ──┬─► HitAggregator     ┐
//!                    (有界线程池, 按峰并行) └─► SimilarityEngine  ┘─► Vec<ConsolidatedPeak>
//!                                                                     │
//!                                                     ConsolidatedPeakFilter（可选）
//! ```

pub mod consolidator;
pub mod filter;

// 重新导出公共接口
pub use consolidator::{
    ConsolidateConfig, ConsolidationReport, ConsolidationWarning, PeakConsolidator, WarningKind,
};
pub use filter::ConsolidatedPeakFilter;
