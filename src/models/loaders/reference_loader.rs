//! 参考体系加载器
//!
//! 参考文件没有固定 schema，用一组带置信度的布局探测器识别：
//! - `TopicSubtopicLayout`：主题 / 子主题两列（area_topics 维度）
//! - `CodeTypeDescriptionLayout`：编码 / 类别 / 描述三列，
//!   表头缺失时退化为逐单元格的编码形态扫描
//!
//! 取置信度最高的探测结果，并把置信度一并返回给调用方

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::AppResult;
use crate::models::dimension::Dimension;
use crate::models::loaders::table_loader::{load_table, Table};
use crate::models::reference::{ReferenceEntry, ReferenceSet};

/// 一次布局探测的结果
#[derive(Debug, Clone)]
pub struct ReferenceLoad {
    pub reference: ReferenceSet,
    /// 胜出的布局名称
    pub layout: &'static str,
    /// 探测置信度 [0,1]，0 表示没有任何布局命中
    pub confidence: f64,
}

/// 从文件加载某一维度的参考体系
pub fn load_reference_from_path(path: &Path, dimension: Dimension) -> AppResult<ReferenceLoad> {
    let table = load_table(path)?;
    Ok(load_reference(&table, dimension))
}

/// 从文件加载多个维度的参考体系
pub fn load_references_from_path(
    path: &Path,
    dimensions: &[Dimension],
) -> AppResult<Vec<ReferenceLoad>> {
    let table = load_table(path)?;
    Ok(dimensions
        .iter()
        .map(|dim| load_reference(&table, *dim))
        .collect())
}

/// 在已加载的表格上跑全部探测器，取置信度最高者
pub fn load_reference(table: &Table, dimension: Dimension) -> ReferenceLoad {
    let mut detections: Vec<(&'static str, f64, ReferenceSet)> = Vec::new();

    if dimension == Dimension::AreaTopics {
        if let Some((confidence, reference)) = detect_topic_subtopic(table) {
            detections.push(("TopicSubtopicLayout", confidence, reference));
        }
    } else {
        if let Some((confidence, reference)) = detect_code_columns(table, dimension) {
            detections.push(("CodeTypeDescriptionLayout", confidence, reference));
        }
        if let Some((confidence, reference)) = detect_code_cells(table, dimension) {
            detections.push(("CodeCellScan", confidence, reference));
        }
    }

    detections.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    match detections.into_iter().next() {
        Some((layout, confidence, reference)) => {
            info!(
                "✓ 维度 {} 参考体系: {} 条定义 (布局: {}, 置信度: {:.2})",
                dimension,
                reference.len(),
                layout,
                confidence
            );
            ReferenceLoad {
                reference,
                layout,
                confidence,
            }
        }
        None => {
            warn!("⚠️ 维度 {} 没有识别出任何参考体系布局", dimension);
            ReferenceLoad {
                reference: ReferenceSet::new(dimension),
                layout: "none",
                confidence: 0.0,
            }
        }
    }
}

/// 主题 / 子主题布局（area_topics）
fn detect_topic_subtopic(table: &Table) -> Option<(f64, ReferenceSet)> {
    let topic_col = table.find_any_column(&["Topic Area (CBME)", "Topic Area", "Topic"])?;
    let subtopic_col = table.find_any_column(&["Subtopics Covered", "Subtopics", "Subtopic"]);

    let mut reference = ReferenceSet::new(Dimension::AreaTopics);
    let mut seen = HashSet::new();

    for (row_idx, _) in table.rows.iter().enumerate() {
        let topic = table.cell(row_idx, topic_col).trim().to_string();
        if topic.is_empty() || !seen.insert(topic.to_lowercase()) {
            continue;
        }
        let subtopics = subtopic_col
            .map(|col| table.cell(row_idx, col).trim().to_string())
            .unwrap_or_default();
        reference.entries.push(ReferenceEntry {
            code: topic,
            label: "Topic Area".to_string(),
            description: subtopics,
        });
    }

    if reference.is_empty() {
        return None;
    }
    let confidence = if subtopic_col.is_some() { 0.95 } else { 0.8 };
    Some((confidence, reference))
}

/// 编码 / 类别 / 描述布局（显式表头）
fn detect_code_columns(table: &Table, dimension: Dimension) -> Option<(f64, ReferenceSet)> {
    let code_col = table.find_any_column(&["ID", "Code"])?;
    let type_col = table.find_any_column(&["Type", "Category"]);
    let desc_col = table.find_any_column(&["Description", "Definition"]);

    let mut reference = ReferenceSet::new(dimension);
    let mut seen = HashSet::new();

    for (row_idx, _) in table.rows.iter().enumerate() {
        let code = table.cell(row_idx, code_col).trim().to_string();
        if !dimension.matches_code(&code) || !seen.insert(code.to_lowercase()) {
            continue;
        }
        reference.entries.push(ReferenceEntry {
            code,
            label: type_col
                .map(|col| table.cell(row_idx, col).to_string())
                .unwrap_or_default(),
            description: desc_col
                .map(|col| table.cell(row_idx, col).to_string())
                .unwrap_or_default(),
        });
    }

    if reference.is_empty() {
        return None;
    }
    let confidence = match (type_col, desc_col) {
        (Some(_), Some(_)) => 0.9,
        (None, Some(_)) | (Some(_), None) => 0.75,
        (None, None) => 0.6,
    };
    Some((confidence, reference))
}

/// 表头不可用时的兜底：逐单元格扫描编码形态，
/// 把编码右侧的两个单元格当作类别和描述
fn detect_code_cells(table: &Table, dimension: Dimension) -> Option<(f64, ReferenceSet)> {
    let mut reference = ReferenceSet::new(dimension);
    let mut seen = HashSet::new();
    let mut scanned_cells = 0usize;

    for (row_idx, row) in table.rows.iter().enumerate() {
        for (col_idx, cell) in row.iter().enumerate() {
            scanned_cells += 1;
            let code = cell.trim();
            if !dimension.matches_code(code) || !seen.insert(code.to_lowercase()) {
                continue;
            }

            let label = table.cell(row_idx, col_idx + 1).to_string();
            // 右侧单元格只是重复了类别名时，描述再往后取一格
            let description = table.cell(row_idx, col_idx + 2).to_string();

            debug!("单元格扫描命中: {} (行 {}, 列 {})", code, row_idx, col_idx);
            reference.entries.push(ReferenceEntry {
                code: code.to_string(),
                label,
                description,
            });
        }
    }

    if reference.is_empty() || scanned_cells == 0 {
        return None;
    }
    // 兜底扫描的可信度显著低于显式表头
    Some((0.5, reference))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_subtopic_layout() {
        let table = Table::new(
            vec![
                "Topic Area (CBME)".to_string(),
                "Subtopics Covered".to_string(),
            ],
            vec![
                vec!["Cardiology".to_string(), "Shock; Arrhythmia".to_string()],
                vec!["Respiratory".to_string(), "Asthma".to_string()],
                vec!["Cardiology".to_string(), "duplicate row".to_string()],
            ],
        );

        let load = load_reference(&table, Dimension::AreaTopics);
        assert_eq!(load.layout, "TopicSubtopicLayout");
        assert_eq!(load.reference.len(), 2);
        assert!(load.confidence > 0.9);
        assert_eq!(
            load.reference.get("Cardiology").map(|e| e.description.as_str()),
            Some("Shock; Arrhythmia")
        );
    }

    #[test]
    fn test_code_column_layout() {
        let table = Table::new(
            vec![
                "ID".to_string(),
                "Type".to_string(),
                "Description".to_string(),
            ],
            vec![
                vec![
                    "C1".to_string(),
                    "Competency".to_string(),
                    "Patient assessment".to_string(),
                ],
                vec![
                    "O1".to_string(),
                    "Objective".to_string(),
                    "wrong dimension".to_string(),
                ],
                vec![
                    "C2".to_string(),
                    "Competency".to_string(),
                    "Clinical reasoning".to_string(),
                ],
            ],
        );

        let load = load_reference(&table, Dimension::Competency);
        assert_eq!(load.layout, "CodeTypeDescriptionLayout");
        assert_eq!(load.reference.len(), 2);
        assert!(load.reference.get("O1").is_none());
    }

    #[test]
    fn test_cell_scan_fallback() {
        // 没有可识别表头，编码散落在单元格里
        let table = Table::new(
            vec!["col1".to_string(), "col2".to_string(), "col3".to_string()],
            vec![
                vec![
                    "S1".to_string(),
                    "Skill".to_string(),
                    "Venepuncture".to_string(),
                ],
                vec![
                    "note".to_string(),
                    "S2".to_string(),
                    "Skill".to_string(),
                ],
            ],
        );

        let load = load_reference(&table, Dimension::Skill);
        assert_eq!(load.layout, "CodeCellScan");
        assert_eq!(load.reference.len(), 2);
        assert!((load.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_unrecognized_layout_yields_empty_with_zero_confidence() {
        let table = Table::new(
            vec!["foo".to_string(), "bar".to_string()],
            vec![vec!["1".to_string(), "2".to_string()]],
        );
        let load = load_reference(&table, Dimension::Blooms);
        assert!(load.reference.is_empty());
        assert_eq!(load.confidence, 0.0);
        assert_eq!(load.layout, "none");
    }
}
