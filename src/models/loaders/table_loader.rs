//! 通用表格加载器
//!
//! 把 CSV / Excel 文件读成统一的 `Table`（表头 + 字符串行），
//! 后续的题目加载和参考体系加载都在 `Table` 之上工作

use std::path::Path;

use calamine::{open_workbook_auto, DataType, Reader};

use crate::error::{AppError, AppResult, FileError};

/// 内存中的表格
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let mut table = Self { headers, rows };
        align_row_lengths(&mut table.headers, &mut table.rows);
        table
    }

    /// 按列名查找列索引（大小写不敏感，忽略首尾空白）
    pub fn find_column(&self, name: &str) -> Option<usize> {
        let target = name.trim().to_lowercase();
        self.headers
            .iter()
            .position(|h| h.trim().to_lowercase() == target)
    }

    /// 在候选列名中找第一个存在的列
    pub fn find_any_column(&self, names: &[&str]) -> Option<usize> {
        names.iter().find_map(|name| self.find_column(name))
    }

    /// 取单元格内容，越界返回空串
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(|s| s.as_str())
            .unwrap_or("")
    }

    /// 确保某列存在，不存在则追加（所有行补空单元格），返回列索引
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.find_column(name) {
            return idx;
        }
        self.headers.push(name.to_string());
        let width = self.headers.len();
        for row in self.rows.iter_mut() {
            row.resize(width, String::new());
        }
        self.headers.len() - 1
    }
}

/// 从文件加载表格，按扩展名分派 Excel / 分隔符文本
pub fn load_table(path: &Path) -> AppResult<Table> {
    if !path.exists() {
        return Err(AppError::File(FileError::NotFound {
            path: path.display().to_string(),
        }));
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "xlsx" | "xlsm" | "xls" | "xlsb" => load_excel_table(path),
        "csv" | "tsv" | "txt" | "" => load_delimited_table(path),
        _ => Err(AppError::File(FileError::UnsupportedFormat {
            path: path.display().to_string(),
        })),
    }
}

fn load_delimited_table(path: &Path) -> AppResult<Table> {
    let delimiter = detect_delimiter(path);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|err| AppError::file_read_failed(path.display().to_string(), err))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|err| AppError::file_read_failed(path.display().to_string(), err))?
        .iter()
        .map(|value| value.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|err| AppError::file_read_failed(path.display().to_string(), err))?;
        let values: Vec<String> = record.iter().map(|value| value.trim().to_string()).collect();
        if values.iter().all(|value| value.is_empty()) {
            continue;
        }
        rows.push(values);
    }

    Ok(Table::new(headers, rows))
}

fn load_excel_table(path: &Path) -> AppResult<Table> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|err| AppError::file_read_failed(path.display().to_string(), err))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| {
            AppError::File(FileError::EmptyTable {
                path: path.display().to_string(),
            })
        })?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .ok_or_else(|| {
            AppError::File(FileError::EmptyTable {
                path: path.display().to_string(),
            })
        })?
        .map_err(|err| AppError::file_read_failed(path.display().to_string(), err))?;

    let mut rows_iter = range.rows();
    let headers: Vec<String> = match rows_iter.next() {
        Some(header_row) => header_row.iter().map(cell_to_string).collect(),
        None => {
            return Err(AppError::File(FileError::EmptyTable {
                path: path.display().to_string(),
            }))
        }
    };

    let mut rows = Vec::new();
    for row in rows_iter {
        let values: Vec<String> = row.iter().map(cell_to_string).collect();
        if values.iter().all(|value| value.is_empty()) {
            continue;
        }
        rows.push(values);
    }

    Ok(Table::new(headers, rows))
}

fn cell_to_string(cell: &DataType) -> String {
    match cell {
        DataType::Empty => String::new(),
        _ => cell.to_string().trim().to_string(),
    }
}

/// 根据扩展名和首行内容猜测分隔符
fn detect_delimiter(path: &Path) -> u8 {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase();
    if extension == "tsv" || extension == "txt" {
        return b'\t';
    }

    if let Ok(content) = std::fs::read_to_string(path) {
        if let Some(first_line) = content.lines().next() {
            let tabs = first_line.matches('\t').count();
            let commas = first_line.matches(',').count();
            if tabs > commas {
                return b'\t';
            }
        }
    }
    b','
}

fn align_row_lengths(headers: &mut Vec<String>, rows: &mut Vec<Vec<String>>) {
    let mut column_count = headers.len();
    for row in rows.iter() {
        if row.len() > column_count {
            column_count = row.len();
        }
    }

    if headers.len() < column_count {
        headers.resize(column_count, String::new());
    }

    for row in rows.iter_mut() {
        if row.len() < column_count {
            row.resize(column_count, String::new());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_find_column_case_insensitive() {
        let table = Table::new(
            vec!["Question Number".to_string(), "Question Text".to_string()],
            vec![],
        );
        assert_eq!(table.find_column("question number"), Some(0));
        assert_eq!(table.find_column(" QUESTION TEXT "), Some(1));
        assert_eq!(table.find_column("missing"), None);
    }

    #[test]
    fn test_ensure_column_pads_rows() {
        let mut table = Table::new(
            vec!["A".to_string()],
            vec![vec!["1".to_string()], vec!["2".to_string()]],
        );
        let idx = table.ensure_column("B");
        assert_eq!(idx, 1);
        assert_eq!(table.rows[0].len(), 2);
        assert_eq!(table.cell(1, 1), "");

        // 已存在的列不会重复追加
        assert_eq!(table.ensure_column("b"), 1);
        assert_eq!(table.headers.len(), 2);
    }

    #[test]
    fn test_load_csv_table() {
        let dir = tempfile::tempdir().expect("创建临时目录失败");
        let path = dir.path().join("questions.csv");
        let mut file = std::fs::File::create(&path).expect("创建文件失败");
        writeln!(file, "Question Number,Question Text").expect("写入失败");
        writeln!(file, "Q1,What is asthma?").expect("写入失败");
        writeln!(file, ",").expect("写入失败");
        writeln!(file, "Q2,\"Define shock, with examples\"").expect("写入失败");

        let table = load_table(&path).expect("加载表格失败");
        assert_eq!(table.headers.len(), 2);
        // 全空行被跳过
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.cell(1, 1), "Define shock, with examples");
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_table(Path::new("no_such_file.csv"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_rejects_unknown_extension() {
        let dir = tempfile::tempdir().expect("创建临时目录失败");
        let path = dir.path().join("questions.docx");
        std::fs::write(&path, "not a table").expect("写入失败");

        let result = load_table(&path);
        assert!(matches!(
            result,
            Err(AppError::File(FileError::UnsupportedFormat { .. }))
        ));
    }
}
