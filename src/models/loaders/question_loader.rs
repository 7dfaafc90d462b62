//! 题目加载器
//!
//! 从表格中读出待审核题目：拼接选择题选项、剔除题干行（Stem）、
//! 提取各维度的已有映射（评审模式使用）

use std::path::Path;

use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::models::dimension::Dimension;
use crate::models::loaders::table_loader::{load_table, Table};
use crate::models::question::Question;

/// 题号列的候选列名
const NUMBER_COLUMNS: [&str; 3] = ["Question Number", "Question No", "Question #"];
/// 题干列的候选列名
const TEXT_COLUMNS: [&str; 2] = ["Question Text", "Question"];

/// 从文件加载题目
pub fn load_questions_from_path(path: &Path, dimensions: &[Dimension]) -> AppResult<Vec<Question>> {
    let table = load_table(path)?;
    load_questions(&table, dimensions, &path.display().to_string())
}

/// 从已加载的表格提取题目
///
/// 缺少题号/题干列时立即失败，避免浪费任何 Oracle 调用
pub fn load_questions(
    table: &Table,
    dimensions: &[Dimension],
    source: &str,
) -> AppResult<Vec<Question>> {
    let number_col = table
        .find_any_column(&NUMBER_COLUMNS)
        .ok_or_else(|| AppError::missing_column(source, NUMBER_COLUMNS[0]))?;
    let text_col = table
        .find_any_column(&TEXT_COLUMNS)
        .ok_or_else(|| AppError::missing_column(source, TEXT_COLUMNS[0]))?;

    let option_cols = locate_option_columns(table);

    let mut questions = Vec::new();
    let mut stem_rows = 0usize;

    for (row_idx, _) in table.rows.iter().enumerate() {
        let number = table.cell(row_idx, number_col).to_string();
        if number.is_empty() {
            continue;
        }
        // 题干行只是上下文，不可判分，整行剔除
        if number.contains("(Stem)") {
            stem_rows += 1;
            continue;
        }

        let mut text = table.cell(row_idx, text_col).to_string();
        for (label, col) in option_cols.iter() {
            let option_text = table.cell(row_idx, *col);
            if !option_text.is_empty() {
                text.push_str(&format!("\n{}. {}", label, option_text));
            }
        }

        let mut question = Question::new(number, text);
        for dim in dimensions {
            if let Some(existing) = read_existing_mapping(table, row_idx, *dim) {
                question.existing.insert(*dim, existing);
            }
        }
        questions.push(question);
    }

    info!(
        "✓ 加载 {} 道题目（剔除 {} 个题干行）",
        questions.len(),
        stem_rows
    );
    Ok(questions)
}

/// 定位选择题选项列，返回 (选项字母, 列索引)
fn locate_option_columns(table: &Table) -> Vec<(char, usize)> {
    let mut cols = Vec::new();
    for letter in ['A', 'B', 'C', 'D'] {
        let candidates = [
            format!("Option {}", letter),
            format!("option {}", letter.to_ascii_lowercase()),
            letter.to_string(),
        ];
        let refs: Vec<&str> = candidates.iter().map(|s| s.as_str()).collect();
        if let Some(col) = table.find_any_column(&refs) {
            cols.push((letter, col));
        }
    }
    if !cols.is_empty() {
        debug!("找到 {} 个选项列", cols.len());
    }
    cols
}

/// 读取某维度的已有映射编码
fn read_existing_mapping(table: &Table, row_idx: usize, dimension: Dimension) -> Option<String> {
    let mapped = dimension.mapped_column();
    let mut candidates = vec![mapped.as_str(), "mapped_id"];
    if dimension == Dimension::AreaTopics {
        candidates.push("mapped_topic");
    }

    let col = table.find_any_column(&candidates)?;
    let value = table.cell(row_idx, col).trim().to_string();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
