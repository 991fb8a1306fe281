//! GC-MS Consensus - 主程序入口
//!
//! 纯流程控制器，负责协调各个工具模块完成合并与比较任务。

use anyhow::Context;
use gcms_consensus::{
    ComparisonConfig, ConsensusError, ConsolidateConfig, ConsolidatedPeakFilter, ErrorCategory,
    PeakConsolidator, core::compare_groups,
    tools::{self, AppCommand, AppConfig, CompareArgs, ConsolidateArgs},
};
use std::process;

/// 错误退出码定义
mod exit_codes {
    /// 通用错误
    pub const GENERAL_ERROR: i32 = 1;
    /// 参数/配置错误
    pub const INPUT_ERROR: i32 = 2;
    /// 输入数据不一致
    pub const INTEGRITY_ERROR: i32 = 3;
    /// 计算错误（相似度、超时）
    pub const COMPUTATION_ERROR: i32 = 4;
    /// 资源/并发错误
    pub const RESOURCE_ERROR: i32 = 5;
}

/// 获取错误建议文本
fn get_error_suggestion(error: &ConsensusError) -> &'static str {
    match error {
        ConsensusError::InvalidInput(_) => {
            "检查命令行参数和配置文件是否正确，使用 --help 查看完整用法 / Check command-line arguments and config file, use --help to see full usage"
        }
        ConsensusError::SlotTimeout { .. } => {
            "单个对齐峰超出处理时限，可提高 --slot-timeout-ms / A slot exceeded its time limit, consider raising --slot-timeout-ms"
        }
        _ => match ErrorCategory::from_error(error) {
            ErrorCategory::Integrity => {
                "对齐文档各表不一致，请检查报告的峰号和实验名 / Alignment tables disagree, check the reported peak and experiment"
            }
            ErrorCategory::Io => {
                "检查文件路径是否正确，文件是否存在且为有效JSON / Check that the file exists and is valid JSON"
            }
            ErrorCategory::Computation => {
                "计算过程出现异常，请检查质谱数据 / Calculation failed, check the mass spectra"
            }
            ErrorCategory::Resource => {
                "资源不可用，请重试或降低 --workers / Resource unavailable, retry or lower --workers"
            }
            ErrorCategory::Other => "请检查输入文件和参数设置 / Please check input files and parameters",
        },
    }
}

/// 错误处理和建议
fn handle_error(error: anyhow::Error) -> ! {
    eprintln!("[ERROR] 错误 / Error: {error:#}");

    let Some(consensus) = error.downcast_ref::<ConsensusError>() else {
        process::exit(exit_codes::GENERAL_ERROR);
    };

    let category = ErrorCategory::from_error(consensus);
    eprintln!("[INFO] 类别 / Category: {}", category.display_name());
    eprintln!("[INFO] 建议 / Suggestion: {}", get_error_suggestion(consensus));

    let exit_code = match consensus {
        ConsensusError::InvalidInput(_) => exit_codes::INPUT_ERROR,
        _ => match category {
            ErrorCategory::Integrity => exit_codes::INTEGRITY_ERROR,
            ErrorCategory::Computation => exit_codes::COMPUTATION_ERROR,
            ErrorCategory::Resource => exit_codes::RESOURCE_ERROR,
            ErrorCategory::Io | ErrorCategory::Other => exit_codes::GENERAL_ERROR,
        },
    };

    process::exit(exit_code);
}

/// 合并运行配置：配置文件打底，命令行参数覆盖
fn resolve_consolidate_config(args: &ConsolidateArgs) -> anyhow::Result<ConsolidateConfig> {
    let mut config = match &args.config_path {
        Some(path) => tools::load_config(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ConsolidateConfig::default(),
    };

    if let Some(top_n) = args.top_n {
        config.top_n_hits = top_n;
    }
    if args.workers.is_some() {
        config.workers = args.workers;
    }
    if args.slot_timeout_ms.is_some() {
        config.slot_timeout_ms = args.slot_timeout_ms;
    }
    Ok(config)
}

fn run_consolidate(args: &ConsolidateArgs, verbose: bool) -> anyhow::Result<()> {
    // 1️⃣ 加载并校验对齐文档
    let dataset = tools::load_alignment(&args.input_path)
        .with_context(|| format!("failed to load alignment {}", args.input_path.display()))?;
    log::info!(
        "loaded {} aligned peaks from {} / 对齐文档已加载",
        dataset.len(),
        args.input_path.display()
    );

    // 2️⃣ 合并（每次运行都从头生成）
    let consolidator = PeakConsolidator::new(resolve_consolidate_config(args)?)?;
    let mut report = consolidator.consolidate_with_report(&dataset)?;

    // 3️⃣ 可选过滤
    if let Some(min_appearances) = args.min_appearances {
        let filter = ConsolidatedPeakFilter {
            min_appearances,
            ..ConsolidatedPeakFilter::default()
        };
        filter.validate()?;
        report.peaks = filter.apply(report.peaks);
    }

    if verbose {
        for warning in &report.warnings {
            println!(
                "[WARNING] peak {}: {} / 告警",
                warning.peak_number, warning.message
            );
        }
    }
    print!("{}", tools::format_run_summary(&report));

    // 4️⃣ 写出合并结果
    let output_path = args.resolved_output_path();
    tools::write_consolidated(&output_path, &report.peaks)
        .with_context(|| format!("failed to write {}", output_path.display()))?;
    println!("💾 结果已保存 / Saved: {}", output_path.display());
    Ok(())
}

fn run_compare(args: &CompareArgs) -> anyhow::Result<()> {
    let left = tools::load_consolidated(&args.left_path)
        .with_context(|| format!("failed to load {}", args.left_path.display()))?;
    let right = tools::load_consolidated(&args.right_path)
        .with_context(|| format!("failed to load {}", args.right_path.display()))?;

    let config = ComparisonConfig {
        rt_window: args.rt_window,
        alpha: args.alpha,
    };
    let rows = compare_groups(&left, &right, &config)?;

    match &args.output_path {
        Some(path) if path.extension().is_some_and(|ext| ext == "json") => {
            let json = serde_json::to_string_pretty(&tools::comparison_rows_json(
                &rows,
                config.alpha,
            ))?;
            std::fs::write(path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("💾 结果已保存 / Saved: {}", path.display());
        }
        Some(path) => {
            std::fs::write(path, tools::format_comparison_report(&rows, config.alpha))
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("💾 结果已保存 / Saved: {}", path.display());
        }
        None => print!("{}", tools::format_comparison_report(&rows, config.alpha)),
    }
    Ok(())
}

/// 应用程序主逻辑
fn run(config: &AppConfig) -> anyhow::Result<()> {
    tools::show_startup_info(config);

    match &config.command {
        AppCommand::Consolidate(args) => run_consolidate(args, config.verbose)?,
        AppCommand::Compare(args) => run_compare(args)?,
    }

    tools::show_completion_info(config);
    Ok(())
}

fn main() {
    let config = tools::parse_args();

    let default_level = if config.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();

    if let Err(error) = run(&config) {
        handle_error(error);
    }
}
