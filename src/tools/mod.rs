//! 工具模块集合
//!
//! 包含CLI、输入加载、格式化等工具模块，支持main.rs的流程控制。

pub mod cli;
pub mod constants;
pub mod formatter;
pub mod loader;
pub mod utils;

// 重新导出主要的公共接口
pub use cli::{
    AppCommand, AppConfig, CompareArgs, ConsolidateArgs, parse_args, show_completion_info,
    show_startup_info,
};
pub use formatter::{
    comparison_rows_json, consolidated_to_json, format_comparison_report, format_run_summary,
    write_consolidated,
};
pub use loader::{
    AlignmentDocument, load_alignment, load_config, load_consolidated, parse_alignment,
};
pub use utils::effective_parallel_degree;
