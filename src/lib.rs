//! # Curriculum Audit
//!
//! 一个用于考题与课程大纲映射审核的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 数据模型层（Models）
//! - `models/` - 维度、题目、参考体系、报告等核心类型
//! - `models/loaders/` - 表格文件加载（xlsx / csv / tsv）与布局识别
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不关心批次循环
//! - `LlmService` - Oracle 调用能力（async-openai）
//! - `prompt_builder` - 提示词拼装能力
//! - `response_parser` - 宽松 JSON 解析与 id 对齐能力
//! - `CoverageAggregator` - 覆盖度统计能力
//! - `ExportApplier` - 结果回写与导出能力
//! - `UnresolvedWriter` - 写 unresolved.txt 能力
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个批次"的完整处理流程
//! - `BatchCtx` - 批次上下文封装
//! - `BatchFlow` - 批次状态机（批量调用 → 解析对齐 → 逐题降级）
//! - `Pacer` - 可插拔节流（固定延迟 / 令牌桶）
//! - `CheckpointStore` - 断点续跑存储
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/audit_engine` - 分类审核引擎（Mode A）
//! - `orchestrator/rating_engine` - 评审引擎（Mode B）
//!
//! ## 模块结构

pub mod config;
pub mod error;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::dimension::Dimension;
pub use models::question::Question;
pub use models::reference::ReferenceSet;
pub use models::report::{AuditReport, RatingReport};
pub use orchestrator::{AuditEngine, RatingEngine};
pub use services::{ExportApplier, LlmService, Oracle, UnresolvedWriter};
pub use workflow::{BatchCtx, BatchFlow, FixedDelayPacer, ItemOutcome, Pacer, TokenBucketPacer};
