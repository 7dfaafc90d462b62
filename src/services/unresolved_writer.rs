//! 未解决题目写入服务 - 业务能力层
//!
//! 只负责"写 unresolved.txt"能力，不关心流程

use anyhow::Result;
use std::fs::OpenOptions;
use std::io::Write;
use tracing::debug;

/// 未解决题目写入服务
///
/// 职责：
/// - 把批次和逐题兜底都失败的题目追加到 unresolved.txt
/// - 只处理单个题目
/// - 不关心流程顺序
pub struct UnresolvedWriter {
    file_path: String,
}

impl UnresolvedWriter {
    /// 创建新的写入服务
    pub fn new() -> Self {
        Self {
            file_path: "unresolved.txt".to_string(),
        }
    }

    /// 使用自定义文件路径创建
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            file_path: path.into(),
        }
    }

    /// 追加一条未解决记录
    pub fn write(&self, question_number: &str, reason: &str) -> Result<()> {
        debug!("写入未解决记录: 题目 {} | 原因: {}", question_number, reason);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;

        let line = format!(
            "{} | 题目 {} | 原因: {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            question_number,
            reason
        );

        file.write_all(line.as_bytes())?;

        Ok(())
    }
}

impl Default for UnresolvedWriter {
    fn default() -> Self {
        Self::new()
    }
}
