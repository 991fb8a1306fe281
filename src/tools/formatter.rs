//! 输出格式化模块
//!
//! - 合并结果：确定性的JSON文档（唯一的持久化产物）
//! - 两组比较：文本表格报告 + JSON行
//! - 运行摘要：告警统计
//!
//! 无穷大的 t 统计量只在这里替换为占位符。

use std::path::Path;

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::UTF8_FULL};
use serde_json::{Value, json};

use super::utils::{format_statistic, format_value};
use crate::core::comparator::{ComparisonRow, MatchedComparison, TTest};
use crate::core::consolidated::ConsolidatedPeak;
use crate::error::ConsensusResult;
use crate::processing::{ConsolidationReport, WarningKind};

/// 应用程序版本信息
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 序列化合并结果（相同输入产生逐字节相同的输出）
pub fn consolidated_to_json(peaks: &[ConsolidatedPeak]) -> ConsensusResult<String> {
    Ok(serde_json::to_string_pretty(peaks)?)
}

/// 写出合并结果文档
pub fn write_consolidated(path: &Path, peaks: &[ConsolidatedPeak]) -> ConsensusResult<()> {
    let json = consolidated_to_json(peaks)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// 运行摘要（逐峰统计 + 告警分类计数）
pub fn format_run_summary(report: &ConsolidationReport) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "Peak", "n", "RT", "RT %RSD", "Area", "Area %RSD", "MS sim", "Top hit",
        ]);

    for peak in &report.peaks {
        let top = peak
            .top_hit()
            .map(|h| format!("{} ({:.0})", h.name, h.match_factor()))
            .unwrap_or_default();
        table.add_row(vec![
            Cell::new(peak.peak_number).set_alignment(CellAlignment::Right),
            Cell::new(peak.appearances()).set_alignment(CellAlignment::Right),
            Cell::new(format_value(peak.rt(), 3)).set_alignment(CellAlignment::Right),
            Cell::new(format_value(peak.rt_rsd(), 2)).set_alignment(CellAlignment::Right),
            Cell::new(format_value(peak.area(), 1)).set_alignment(CellAlignment::Right),
            Cell::new(format_value(peak.area_rsd(), 2)).set_alignment(CellAlignment::Right),
            Cell::new(format_value(peak.ms_comparison_mean(), 1))
                .set_alignment(CellAlignment::Right),
            Cell::new(top),
        ]);
    }

    let count = |kind: WarningKind| report.warnings.iter().filter(|w| w.kind == kind).count();

    let mut output = format!("{table}\n");
    output.push_str(&format!(
        "Peaks: {} | Workers: {} | Elapsed: {:.3}s\n",
        report.peaks.len(),
        report.workers,
        report.elapsed.as_secs_f64()
    ));
    output.push_str(&format!(
        "Warnings: {} similarity failures, {} CAS conflicts, {} missing spectra\n",
        count(WarningKind::SimilarityFailure),
        count(WarningKind::CasConflict),
        count(WarningKind::MissingSpectrum)
    ));
    output
}

/// RT/面积 各两种检验的 (t, p) 单元格；未匹配时全部留空
fn statistic_cells(matched: Option<&MatchedComparison>) -> Vec<String> {
    match matched {
        Some(m) => [&m.rt.student, &m.rt.welch, &m.area.student, &m.area.welch]
            .into_iter()
            .flat_map(|t| [format_statistic(t.statistic), format_value(t.p_value, 4)])
            .collect(),
        None => vec![String::new(); 8],
    }
}

/// 两组比较的文本报告
pub fn format_comparison_report(rows: &[ComparisonRow], alpha: f64) -> String {
    let mut output = String::new();
    output.push_str(&format!("GC-MS Consensus v{VERSION} / two-sample comparison\n"));
    let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    output.push_str(&format!("log date: {now}\n"));
    output.push_str(&format!("alpha: {alpha}\n\n"));

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "Left", "Right", "RT", "RT t", "RT p", "RT Welch t", "RT Welch p", "Area t",
            "Area p", "Area Welch t", "Area Welch p", "Verdict",
        ]);

    for row in rows {
        let matched = row.matched.as_ref();
        let mut cells = vec![
            Cell::new(row.left_peak_number),
            Cell::new(matched.map(|m| m.right_peak_number.to_string()).unwrap_or_default()),
            Cell::new(format_value(row.left_rt, 3)).set_alignment(CellAlignment::Right),
        ];
        cells.extend(
            statistic_cells(matched)
                .into_iter()
                .map(|text| Cell::new(text).set_alignment(CellAlignment::Right)),
        );
        cells.push(Cell::new(row.verdict(alpha).as_str()));
        table.add_row(cells);
    }

    output.push_str(&format!("{table}\n"));
    output
}

fn ttest_json(test: &TTest, alpha: f64) -> Value {
    json!({
        "t": format_statistic(test.statistic),
        "p": if test.p_value.is_nan() { Value::Null } else { json!(test.p_value) },
        "df": if test.df.is_nan() { Value::Null } else { json!(test.df) },
        "verdict": test.verdict(alpha).as_str(),
    })
}

/// 两组比较的JSON行（t 统计量为已格式化的字符串）
pub fn comparison_rows_json(rows: &[ComparisonRow], alpha: f64) -> Value {
    let rows: Vec<Value> = rows
        .iter()
        .map(|row| match &row.matched {
            Some(m) => json!({
                "left_peak_number": row.left_peak_number,
                "right_peak_number": m.right_peak_number,
                "rt": {
                    "left": m.rt.left, "right": m.rt.right,
                    "student": ttest_json(&m.rt.student, alpha),
                    "welch": ttest_json(&m.rt.welch, alpha),
                },
                "area": {
                    "left": m.area.left, "right": m.area.right,
                    "student": ttest_json(&m.area.student, alpha),
                    "welch": ttest_json(&m.area.welch, alpha),
                },
                "verdict": row.verdict(alpha).as_str(),
            }),
            None => json!({
                "left_peak_number": row.left_peak_number,
                "right_peak_number": Value::Null,
                "rt": Value::Null,
                "area": Value::Null,
                "verdict": row.verdict(alpha).as_str(),
            }),
        })
        .collect();
    Value::Array(rows)
}
