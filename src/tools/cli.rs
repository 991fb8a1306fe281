//! 命令行接口模块
//!
//! 负责命令行参数解析和程序信息展示。核心库本身不读取任何参数或环境变量，
//! 这里只是外层壳。

use clap::error::ErrorKind;
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use std::path::PathBuf;

use super::constants::defaults;

/// 应用程序版本信息
const VERSION: &str = env!("CARGO_PKG_VERSION");
const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// `consolidate` 子命令参数
#[derive(Debug, Clone)]
pub struct ConsolidateArgs {
    /// 对齐文档路径
    pub input_path: PathBuf,
    /// 合并结果输出路径（缺省时写到输入文件旁）
    pub output_path: Option<PathBuf>,
    /// JSON 配置文件（命令行参数优先）
    pub config_path: Option<PathBuf>,
    pub top_n: Option<usize>,
    pub workers: Option<usize>,
    pub slot_timeout_ms: Option<u64>,
    /// 合并后按检出次数过滤
    pub min_appearances: Option<usize>,
}

impl ConsolidateArgs {
    /// 缺省输出路径：`<输入文件名>_consolidated.json`
    pub fn resolved_output_path(&self) -> PathBuf {
        self.output_path.clone().unwrap_or_else(|| {
            let stem = self
                .input_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "alignment".to_string());
            self.input_path
                .with_file_name(format!("{stem}_consolidated.json"))
        })
    }
}

/// `compare` 子命令参数
#[derive(Debug, Clone)]
pub struct CompareArgs {
    pub left_path: PathBuf,
    pub right_path: PathBuf,
    pub rt_window: f64,
    pub alpha: f64,
    /// 输出路径；扩展名为 `.json` 时写JSON行，否则写文本报告
    pub output_path: Option<PathBuf>,
}

/// 子命令
#[derive(Debug, Clone)]
pub enum AppCommand {
    Consolidate(ConsolidateArgs),
    Compare(CompareArgs),
}

/// 应用程序配置
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub command: AppCommand,
    /// 是否显示详细信息（日志级别提升到 debug）
    pub verbose: bool,
}

fn build_command() -> Command {
    Command::new("gcms-consensus")
        .version(VERSION)
        .about(DESCRIPTION)
        .author("GC-MS Consensus Team")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("显示详细处理信息")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("consolidate")
                .about("合并多重复实验的对齐峰 / Consolidate aligned peaks across replicates")
                .arg(
                    Arg::new("INPUT")
                        .help("对齐文档 (JSON)")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .index(1),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .help("输出合并结果到文件")
                        .value_name("FILE")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .help("JSON 配置文件")
                        .value_name("FILE")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("top-n")
                        .long("top-n")
                        .help("每个峰保留的候选数（默认 5）")
                        .value_name("N")
                        .value_parser(value_parser!(usize)),
                )
                .arg(
                    Arg::new("workers")
                        .long("workers")
                        .help("工作线程数（默认按CPU核数）")
                        .value_name("N")
                        .value_parser(value_parser!(usize)),
                )
                .arg(
                    Arg::new("slot-timeout-ms")
                        .long("slot-timeout-ms")
                        .help("单个对齐峰的处理时限（毫秒）")
                        .value_name("MS")
                        .value_parser(value_parser!(u64)),
                )
                .arg(
                    Arg::new("min-appearances")
                        .long("min-appearances")
                        .help("只保留至少在 N 个实验中检出的峰")
                        .value_name("N")
                        .value_parser(value_parser!(usize)),
                ),
        )
        .subcommand(
            Command::new("compare")
                .about("两组合并结果的 t 检验比较 / Compare two consolidated sample groups")
                .arg(
                    Arg::new("LEFT")
                        .help("左侧样本组合并结果 (JSON)")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .index(1),
                )
                .arg(
                    Arg::new("RIGHT")
                        .help("右侧样本组合并结果 (JSON)")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .index(2),
                )
                .arg(
                    Arg::new("rt-window")
                        .long("rt-window")
                        .help("保留时间匹配窗口（秒）")
                        .value_name("S")
                        .default_value("60")
                        .value_parser(value_parser!(f64)),
                )
                .arg(
                    Arg::new("alpha")
                        .long("alpha")
                        .help("显著性水平")
                        .value_name("A")
                        .default_value("0.01")
                        .value_parser(value_parser!(f64)),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .help("输出报告到文件（.json 输出JSON行）")
                        .value_name("FILE")
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
}

fn path_arg(matches: &ArgMatches, id: &str) -> Option<PathBuf> {
    matches.get_one::<PathBuf>(id).cloned()
}

fn config_from_matches(matches: &ArgMatches) -> Result<AppConfig, clap::Error> {
    let verbose = matches.get_flag("verbose");

    let command = match matches.subcommand() {
        Some(("compare", sub)) => AppCommand::Compare(CompareArgs {
            left_path: path_arg(sub, "LEFT").unwrap_or_default(),
            right_path: path_arg(sub, "RIGHT").unwrap_or_default(),
            rt_window: sub
                .get_one::<f64>("rt-window")
                .copied()
                .unwrap_or(defaults::RT_WINDOW_SECONDS),
            alpha: sub.get_one::<f64>("alpha").copied().unwrap_or(defaults::ALPHA),
            output_path: path_arg(sub, "output"),
        }),
        Some(("consolidate", sub)) => AppCommand::Consolidate(ConsolidateArgs {
            input_path: path_arg(sub, "INPUT").unwrap_or_default(),
            output_path: path_arg(sub, "output"),
            config_path: path_arg(sub, "config"),
            top_n: sub.get_one::<usize>("top-n").copied(),
            workers: sub.get_one::<usize>("workers").copied(),
            slot_timeout_ms: sub.get_one::<u64>("slot-timeout-ms").copied(),
            min_appearances: sub.get_one::<usize>("min-appearances").copied(),
        }),
        _ => {
            return Err(build_command().error(
                ErrorKind::MissingSubcommand,
                "expected `consolidate` or `compare`",
            ));
        }
    };

    Ok(AppConfig { command, verbose })
}

/// 解析命令行参数并创建配置
pub fn parse_args() -> AppConfig {
    config_from_matches(&build_command().get_matches()).unwrap_or_else(|e| e.exit())
}

/// 从给定参数解析（测试用）
pub fn parse_from<I, T>(args: I) -> Result<AppConfig, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    build_command()
        .try_get_matches_from(args)
        .and_then(|m| config_from_matches(&m))
}

/// 显示程序启动信息
pub fn show_startup_info(config: &AppConfig) {
    println!("🚀 GC-MS Consensus v{VERSION} 启动");
    println!("📝 {DESCRIPTION}");
    if config.verbose {
        match &config.command {
            AppCommand::Consolidate(args) => {
                println!("📂 对齐文档 / Alignment: {}", args.input_path.display())
            }
            AppCommand::Compare(args) => println!(
                "📂 比较 / Compare: {} vs {}",
                args.left_path.display(),
                args.right_path.display()
            ),
        }
    }
    println!();
}

/// 显示程序完成信息
pub fn show_completion_info(config: &AppConfig) {
    if config.verbose {
        println!("✅ 所有任务处理完成！");
    }
}
