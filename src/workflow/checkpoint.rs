//! 断点续跑 - 流程层
//!
//! 长时间的分类运行按批落盘：每个完成的批次把建议集合持久化到
//! 以 run_id 命名的 JSON 文件里，中断后重跑同一 run_id 可以跳过
//! 已完成的批次而不是从头再来

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{AppError, AppResult};
use crate::models::report::MappingRecommendation;

/// 一次运行的断点状态
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RunCheckpoint {
    pub run_id: String,
    /// 批次编号 → 该批已产出的建议
    pub completed: BTreeMap<usize, Vec<MappingRecommendation>>,
}

impl RunCheckpoint {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            completed: BTreeMap::new(),
        }
    }

    pub fn is_batch_done(&self, batch_num: usize) -> bool {
        self.completed.contains_key(&batch_num)
    }

    pub fn mark_batch(&mut self, batch_num: usize, recommendations: Vec<MappingRecommendation>) {
        self.completed.insert(batch_num, recommendations);
    }
}

/// 断点文件存取
pub struct CheckpointStore {
    folder: PathBuf,
}

impl CheckpointStore {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    fn path_for(&self, run_id: &str) -> PathBuf {
        self.folder.join(format!("run_{}.json", run_id))
    }

    /// 加载某次运行的断点，文件不存在时返回 None
    pub fn load(&self, run_id: &str) -> AppResult<Option<RunCheckpoint>> {
        let path = self.path_for(run_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|err| AppError::file_read_failed(path.display().to_string(), err))?;
        let checkpoint: RunCheckpoint = serde_json::from_str(&content)?;
        info!(
            "✓ 找到断点: run {} 已完成 {} 个批次",
            run_id,
            checkpoint.completed.len()
        );
        Ok(Some(checkpoint))
    }

    /// 落盘断点
    pub fn save(&self, checkpoint: &RunCheckpoint) -> AppResult<()> {
        std::fs::create_dir_all(&self.folder)
            .map_err(|err| AppError::file_write_failed(self.folder.display().to_string(), err))?;
        let path = self.path_for(&checkpoint.run_id);
        let content = serde_json::to_string_pretty(checkpoint)?;
        std::fs::write(&path, content)
            .map_err(|err| AppError::file_write_failed(path.display().to_string(), err))?;
        Ok(())
    }

    /// 运行完成后清理断点文件
    pub fn remove(&self, run_id: &str) -> AppResult<()> {
        let path = self.path_for(run_id);
        if path.exists() {
            std::fs::remove_file(&path)
                .map_err(|err| AppError::file_write_failed(path.display().to_string(), err))?;
        }
        Ok(())
    }

    /// 用于测试与日志
    pub fn folder(&self) -> &Path {
        &self.folder
    }
}
