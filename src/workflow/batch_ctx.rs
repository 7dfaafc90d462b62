//! 批次处理上下文
//!
//! 封装"我正在处理第几批、覆盖哪些题目"这一信息

use std::fmt::Display;

/// 批次处理上下文
#[derive(Debug, Clone)]
pub struct BatchCtx {
    /// 批次编号（从 1 开始）
    pub batch_num: usize,
    /// 批次总数
    pub total_batches: usize,
    /// 本批起始题目序号（从 1 开始，仅用于日志显示）
    pub start: usize,
    /// 本批结束题目序号
    pub end: usize,
}

impl BatchCtx {
    pub fn new(batch_num: usize, total_batches: usize, start: usize, end: usize) -> Self {
        Self {
            batch_num,
            total_batches,
            start,
            end,
        }
    }
}

impl Display for BatchCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[批次 {}/{}]", self.batch_num, self.total_batches)
    }
}
