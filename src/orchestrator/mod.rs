//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责运行级调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `audit_engine` - 分类审核引擎（Mode A）
//! - 预检参考体系
//! - 分批调度 + 断点续跑
//! - 覆盖度 / 缺口 / 未解决清单汇总
//!
//! ### `rating_engine` - 评审引擎（Mode B）
//! - 评审已有映射（correct / partially_correct / incorrect）
//! - 汇总统计与修正建议
//!
//! ## 层次关系
//!
//! ```text
//! audit_engine / rating_engine (处理整次运行)
//!     ↓
//! workflow::BatchFlow (处理单个批次)
//!     ↓
//! services (能力层：prompt / parse / oracle / coverage / export)
//!     ↓
//! models (数据模型与文件加载)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：引擎管运行循环，BatchFlow 管单批状态机
//! 2. **全串行**：批与批顺序执行，节流交给 Pacer
//! 3. **显式结局**：每道题都以 Classified 或 Failed 收场，不静默丢弃

pub mod audit_engine;
pub mod rating_engine;

// 重新导出主要类型
pub use audit_engine::AuditEngine;
pub use rating_engine::RatingEngine;
