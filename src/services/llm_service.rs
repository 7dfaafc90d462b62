//! LLM 服务 - 业务能力层
//!
//! 只负责"调用分类 Oracle"能力，不关心批次流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）

use anyhow::Result;
use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, OracleError};

/// Oracle 的一次应答
#[derive(Debug, Clone)]
pub struct OracleReply {
    /// 应答正文（期望是 JSON，但不做任何保证）
    pub content: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// 分类 Oracle 抽象
///
/// 引擎只依赖这个 trait，测试可以注入脚本化的假 Oracle
#[async_trait]
pub trait Oracle: Send + Sync {
    /// 发送一次请求并返回应答正文
    async fn complete(
        &self,
        system_message: &str,
        user_message: &str,
        max_tokens: u32,
    ) -> Result<OracleReply>;
}

/// LLM 服务
///
/// 职责：
/// - 调用 LLM API 完成分类 / 评审请求
/// - 捕获 token 用量
/// - 不出现 Vec<Question>
/// - 不关心批次顺序
pub struct LlmService {
    client: Client<OpenAIConfig>,
    model_name: String,
}

impl LlmService {
    /// 创建新的 LLM 服务
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        let client = Client::with_config(openai_config);

        Self {
            client,
            model_name: config.llm_model_name.clone(),
        }
    }

    /// 连通性测试（1 个 token 的 ping）
    pub async fn test_connection(&self) -> Result<()> {
        let reply = self.complete("You are a helpful assistant.", "ping", 5).await?;
        debug!("连通性测试成功，应答长度: {}", reply.content.len());
        Ok(())
    }
}

#[async_trait]
impl Oracle for LlmService {
    async fn complete(
        &self,
        system_message: &str,
        user_message: &str,
        max_tokens: u32,
    ) -> Result<OracleReply> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", user_message.len());

        // 构建消息列表
        let mut messages = Vec::new();

        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(system_message)
            .build()?;
        messages.push(ChatCompletionRequestMessage::System(system_msg));

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_message)
            .build()?;
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        // 构建请求
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(0.3)
            .max_tokens(max_tokens)
            .build()?;

        // 调用 API
        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            AppError::oracle_call_failed(&self.model_name, e)
        })?;

        debug!("LLM API 调用成功");

        let (prompt_tokens, completion_tokens) = response
            .usage
            .as_ref()
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));

        // 提取应答内容
        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| {
                AppError::Oracle(OracleError::EmptyContent {
                    model: self.model_name.clone(),
                })
            })?;

        Ok(OracleReply {
            content: content.trim().to_string(),
            prompt_tokens,
            completion_tokens,
        })
    }
}
