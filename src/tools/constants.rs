//! 常量和默认配置集中管理
//!
//! 将所有重要常量集中定义，避免"默认值漂移"和重复定义

/// 默认配置值
pub mod defaults {
    /// 每个对齐峰保留的候选化合物数
    pub const TOP_N_HITS: usize = 5;

    /// m/z 配对容差
    ///
    /// 质谱已按整数 m/z 分箱，0.5 保证只与同一箱配对
    pub const MZ_TOLERANCE: f64 = 0.5;

    /// m/z 权重指数（不按 m/z 加权）
    pub const MZ_POWER: f64 = 0.0;

    /// 强度权重指数（平方根缩放）
    pub const INTENSITY_POWER: f64 = 0.5;

    /// 两组比较的保留时间匹配窗口（秒）
    pub const RT_WINDOW_SECONDS: f64 = 60.0;

    /// 显著性水平
    pub const ALPHA: f64 = 0.01;

    /// 默认工作线程数（无法检测CPU核数时使用）
    pub const WORKERS: usize = 4;
}

/// 并发度限制常量
pub mod parallel_limits {
    /// 最小并发度
    pub const MIN_PARALLEL_DEGREE: usize = 1;

    /// 最大并发度
    ///
    /// 线程池大小与对齐峰数量无关，避免大数据集耗尽系统资源
    pub const MAX_PARALLEL_DEGREE: usize = 16;
}

/// 报告格式化常量
pub mod report {
    /// 无穷大 t 统计量的占位符
    pub const INFINITE_STATISTIC: &str = "#";

    /// 数值缺失时的占位符
    pub const BLANK: &str = "";
}
