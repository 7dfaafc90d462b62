/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    /// 题目文件路径（CSV / Excel）
    pub question_file: String,
    /// 参考体系文件路径（CSV / Excel）
    pub reference_file: String,
    /// 审核维度（逗号分隔，如 "competency" 或 "competency,blooms"）
    pub dimensions: String,
    /// 运行模式: classify（首次分类）或 rate（评审已有映射）
    pub run_mode: String,
    /// 每批提交给 Oracle 的题目数量（引擎内钳制到 1..=10）
    pub batch_size: usize,
    /// 每次 Oracle 调用后的停顿（毫秒）
    pub call_delay_ms: u64,
    /// 批与批之间的停顿（毫秒）
    pub batch_delay_ms: u64,
    /// 导出文件输出目录
    pub output_folder: String,
    /// 未解决题目记录文件
    pub unresolved_file: String,
    /// 断点续跑状态目录
    pub checkpoint_folder: String,
    /// 运行标识；重跑时指定同一 run_id 可以从断点继续，
    /// 不指定则每次用当前时间戳（不续跑）
    pub run_id: Option<String>,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            question_file: "questions.xlsx".to_string(),
            reference_file: "reference.xlsx".to_string(),
            dimensions: "competency".to_string(),
            run_mode: "classify".to_string(),
            batch_size: 5,
            call_delay_ms: 500,
            batch_delay_ms: 1000,
            output_folder: "audit_output".to_string(),
            unresolved_file: "unresolved.txt".to_string(),
            checkpoint_folder: "checkpoints".to_string(),
            run_id: None,
            verbose_logging: false,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            question_file: std::env::var("QUESTION_FILE").unwrap_or(default.question_file),
            reference_file: std::env::var("REFERENCE_FILE").unwrap_or(default.reference_file),
            dimensions: std::env::var("AUDIT_DIMENSIONS").unwrap_or(default.dimensions),
            run_mode: std::env::var("RUN_MODE").unwrap_or(default.run_mode),
            batch_size: std::env::var("BATCH_SIZE").ok().and_then(|v| v.parse().ok()).unwrap_or(default.batch_size),
            call_delay_ms: std::env::var("CALL_DELAY_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.call_delay_ms),
            batch_delay_ms: std::env::var("BATCH_DELAY_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.batch_delay_ms),
            output_folder: std::env::var("OUTPUT_FOLDER").unwrap_or(default.output_folder),
            unresolved_file: std::env::var("UNRESOLVED_FILE").unwrap_or(default.unresolved_file),
            checkpoint_folder: std::env::var("CHECKPOINT_FOLDER").unwrap_or(default.checkpoint_folder),
            run_id: std::env::var("RUN_ID").ok().filter(|v| !v.trim().is_empty()),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
        }
    }
}
