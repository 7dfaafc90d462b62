//! 错误类型定义
//!
//! 按领域拆分为若干子错误枚举，顶层用 `AppError` 汇总

use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 参考体系（taxonomy）错误
    #[error("参考体系错误: {0}")]
    Reference(#[from] ReferenceError),
    /// Oracle（LLM 分类服务）调用错误
    #[error("Oracle错误: {0}")]
    Oracle(#[from] OracleError),
    /// 业务逻辑错误
    #[error("业务错误: {0}")]
    Business(#[from] BusinessError),
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 文件不存在
    #[error("文件不存在: {path}")]
    NotFound { path: String },
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 不支持的文件格式
    #[error("不支持的文件格式: {path}")]
    UnsupportedFormat { path: String },
    /// 缺少必需的列
    #[error("文件缺少必需的列: {column} ({path})")]
    MissingColumn { path: String, column: String },
    /// 表格为空
    #[error("表格没有数据行: {path}")]
    EmptyTable { path: String },
}

/// 参考体系错误
#[derive(Debug, Error)]
pub enum ReferenceError {
    /// 参考体系为空（预检失败，禁止发起任何 Oracle 调用）
    #[error("维度 {dimension} 的参考体系为空，无法开始审核")]
    Empty { dimension: String },
}

/// Oracle（LLM 分类服务）调用错误
#[derive(Debug, Error)]
pub enum OracleError {
    /// API 调用失败
    #[error("Oracle API调用失败 (模型: {model}): {source}")]
    ApiCallFailed {
        model: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 返回内容为空
    #[error("Oracle返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
    /// 响应不是合法 JSON
    #[error("Oracle响应无法解析为JSON: {snippet}")]
    InvalidJson { snippet: String },
}

/// 业务逻辑错误
#[derive(Debug, Error)]
pub enum BusinessError {
    /// 题目列表为空
    #[error("题目列表为空，没有可审核的内容")]
    NoQuestions,
    /// 维度解析失败
    #[error("无法解析维度: {dimension}")]
    DimensionParseFailed { dimension: String },
}

// ========== 从常见错误类型转换 ==========
// anyhow 已为实现 std::error::Error 的类型提供自动包装，
// 这里只补充需要携带领域信息的转换

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Oracle(OracleError::InvalidJson {
            snippet: err.to_string(),
        })
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: String::new(),
            source: Box::new(err),
        })
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建文件读取错误
    pub fn file_read_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建文件写入错误
    pub fn file_write_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::File(FileError::WriteFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建缺少列错误
    pub fn missing_column(path: impl Into<String>, column: impl Into<String>) -> Self {
        AppError::File(FileError::MissingColumn {
            path: path.into(),
            column: column.into(),
        })
    }

    /// 创建 Oracle API 调用错误
    pub fn oracle_call_failed(
        model: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Oracle(OracleError::ApiCallFailed {
            model: model.into(),
            source: Box::new(source),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
