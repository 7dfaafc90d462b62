//! 导出服务 - 业务能力层
//!
//! 把采纳的建议合并回原始题目表（按题号精确匹配），
//! 并一次性写出带时间戳的 CSV / Excel 结果文件

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rust_xlsxwriter::{Format, Workbook};
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::models::dimension::Dimension;
use crate::models::loaders::table_loader::Table;
use crate::models::report::{CorrectionRecommendation, MappingRecommendation};

/// 结果工作表名
const SHEET_NAME: &str = "Audit Results";

/// 导出应用器
pub struct ExportApplier;

impl ExportApplier {
    /// 把分类建议写回表格
    ///
    /// `selected` 为 None 时应用全部建议；未选中的行保持原样。
    /// 同一份建议应用两次结果不变
    pub fn apply_mappings(
        table: &mut Table,
        recommendations: &[MappingRecommendation],
        selected: Option<&HashSet<String>>,
    ) -> AppResult<usize> {
        let number_col = table
            .find_any_column(&["Question Number", "Question No", "Question #"])
            .ok_or_else(|| AppError::missing_column("<table>", "Question Number"))?;

        let mut applied = 0usize;
        for rec in recommendations {
            if let Some(selected) = selected {
                if !selected.contains(&rec.question_number) {
                    continue;
                }
            }
            let rows = matching_rows(table, number_col, &rec.question_number);
            if rows.is_empty() {
                warn!("⚠️ 表格中找不到题号 {}，建议未应用", rec.question_number);
                continue;
            }

            // 同一题号可能占多行（多小问共用题号），每一行都要写
            for row_idx in rows {
                for (dim, mapping) in &rec.mappings {
                    match dim {
                        Dimension::AreaTopics => {
                            set_cell(table, row_idx, "mapped_topic", &mapping.code);
                            set_cell(
                                table,
                                row_idx,
                                "mapped_subtopic",
                                mapping.subtopic.as_deref().unwrap_or(""),
                            );
                        }
                        _ => set_cell(table, row_idx, &dim.mapped_column(), &mapping.code),
                    }
                }
                set_cell(
                    table,
                    row_idx,
                    "confidence_score",
                    &format!("{:.2}", rec.confidence),
                );
                set_cell(table, row_idx, "justification", &rec.justification);
            }
            applied += 1;
        }

        info!("✓ 已应用 {} 条分类建议", applied);
        Ok(applied)
    }

    /// 把评审修正建议写回表格
    pub fn apply_corrections(
        table: &mut Table,
        recommendations: &[CorrectionRecommendation],
        selected: Option<&HashSet<String>>,
    ) -> AppResult<usize> {
        let number_col = table
            .find_any_column(&["Question Number", "Question No", "Question #"])
            .ok_or_else(|| AppError::missing_column("<table>", "Question Number"))?;

        let mut applied = 0usize;
        for rec in recommendations {
            if let Some(selected) = selected {
                if !selected.contains(&rec.question_number) {
                    continue;
                }
            }
            let rows = matching_rows(table, number_col, &rec.question_number);
            if rows.is_empty() {
                warn!("⚠️ 表格中找不到题号 {}，建议未应用", rec.question_number);
                continue;
            }

            let column = match rec.dimension {
                Dimension::AreaTopics => "mapped_topic".to_string(),
                dim => dim.mapped_column(),
            };
            for row_idx in rows {
                set_cell(table, row_idx, &column, &rec.suggested_code);
                set_cell(
                    table,
                    row_idx,
                    "confidence_score",
                    &format!("{:.2}", rec.suggestion_confidence),
                );
                set_cell(table, row_idx, "justification", &rec.justification);
            }
            applied += 1;
        }

        info!("✓ 已应用 {} 条修正建议", applied);
        Ok(applied)
    }

    /// 带时间戳的输出文件名
    pub fn output_path(folder: &Path, dimensions: &[Dimension], extension: &str) -> PathBuf {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let name = if dimensions.len() == 1 {
            format!("audit_output_{}_{}.{}", dimensions[0].key(), stamp, extension)
        } else {
            let keys: Vec<&str> = dimensions.iter().map(|d| d.key()).collect();
            format!("audit_output_multi_{}_{}.{}", keys.join("_"), stamp, extension)
        };
        folder.join(name)
    }

    /// 写出 CSV 结果文件
    pub fn write_csv(table: &Table, path: &Path) -> AppResult<()> {
        let mut writer = csv::Writer::from_path(path)
            .map_err(|err| AppError::file_write_failed(path.display().to_string(), err))?;
        writer
            .write_record(&table.headers)
            .map_err(|err| AppError::file_write_failed(path.display().to_string(), err))?;
        for row in &table.rows {
            writer
                .write_record(row)
                .map_err(|err| AppError::file_write_failed(path.display().to_string(), err))?;
        }
        writer
            .flush()
            .map_err(|err| AppError::file_write_failed(path.display().to_string(), err))?;
        info!("✓ 结果已写入: {}", path.display());
        Ok(())
    }

    /// 写出 Excel 结果文件
    pub fn write_xlsx(table: &Table, path: &Path) -> AppResult<()> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet
            .set_name(SHEET_NAME)
            .map_err(|err| AppError::file_write_failed(path.display().to_string(), err))?;

        let header_format = Format::new().set_bold();
        for (col_idx, header) in table.headers.iter().enumerate() {
            worksheet
                .write_string_with_format(0, col_idx as u16, header, &header_format)
                .map_err(|err| AppError::file_write_failed(path.display().to_string(), err))?;
        }
        for (row_idx, row) in table.rows.iter().enumerate() {
            for (col_idx, value) in row.iter().enumerate() {
                worksheet
                    .write_string((row_idx + 1) as u32, col_idx as u16, value)
                    .map_err(|err| {
                        AppError::file_write_failed(path.display().to_string(), err)
                    })?;
            }
        }

        workbook
            .save(path)
            .map_err(|err| AppError::file_write_failed(path.display().to_string(), err))?;
        info!("✓ 结果已写入: {}", path.display());
        Ok(())
    }
}

/// 按题号找出全部匹配行（字符串精确匹配，忽略首尾空白）
fn matching_rows(table: &Table, number_col: usize, question_number: &str) -> Vec<usize> {
    (0..table.rows.len())
        .filter(|&row_idx| table.cell(row_idx, number_col).trim() == question_number.trim())
        .collect()
}

fn set_cell(table: &mut Table, row_idx: usize, column: &str, value: &str) {
    let col = table.ensure_column(column);
    if let Some(row) = table.rows.get_mut(row_idx) {
        row[col] = value.to_string();
    }
}
