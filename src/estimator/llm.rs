//! LLM 估算器
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）
//!
//! 模型返回的是松散的 JSON 文本（可能带 markdown 代码围栏、
//! 前后缀废话），一律在这里解析并转换为强类型 [`Estimate`]；
//! 解析失败视为永久错误，网络/限流类失败视为瞬时错误。

use std::path::Path;

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageDetail,
        ImageUrl,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, CallError};
use crate::estimator::Estimator;
use crate::models::{Estimate, InputRecord};

/// 基于 LLM 的体积/重量估算器
pub struct LlmEstimator {
    client: Client<OpenAIConfig>,
    model_name: String,
    system_prompt: String,
}

impl LlmEstimator {
    /// 创建新的 LLM 估算器
    ///
    /// # 参数
    /// - `prompt_file`: 系统提示词文件名，从配置的 prompt_dir 加载
    pub fn new(config: &Config, prompt_file: &str) -> AppResult<Self> {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        let client = Client::with_config(openai_config);

        let prompt_path = Path::new(&config.prompt_dir).join(prompt_file);
        let system_prompt = std::fs::read_to_string(&prompt_path)
            .map_err(|e| AppError::file_read_failed(prompt_path.display().to_string(), e))?;

        Ok(Self {
            client,
            model_name: config.llm_model_name.clone(),
            system_prompt: system_prompt.trim().to_string(),
        })
    }

    /// 构建用户消息文本（提示词模板按此格式调校, 不要随意改动）
    fn build_user_message(record: &InputRecord) -> String {
        format!(
            "Please analyze this product and provide volume and weight estimates:\n\nTitle: {}\nCategory: {}",
            record.title, record.category
        )
    }

    /// 发起一次 chat completion 调用，返回模型的文本响应
    async fn send_request(&self, record: &InputRecord) -> Result<String, CallError> {
        debug!("调用 LLM API，模型: {}", self.model_name);

        // 构建消息列表
        let mut messages = Vec::new();

        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(self.system_prompt.as_str())
            .build()
            .map_err(|e| CallError::permanent(format!("构建系统消息失败: {}", e)))?;
        messages.push(ChatCompletionRequestMessage::System(system_msg));

        let user_text = Self::build_user_message(record);

        // 构建用户消息内容（有缩略图时走 Vision API）
        let user_msg = if let Some(url) = &record.image_url {
            let content_parts: Vec<ChatCompletionRequestUserMessageContentPart> = vec![
                ChatCompletionRequestUserMessageContentPart::Text(
                    ChatCompletionRequestMessageContentPartText { text: user_text },
                ),
                ChatCompletionRequestUserMessageContentPart::ImageUrl(
                    ChatCompletionRequestMessageContentPartImage {
                        image_url: ImageUrl {
                            url: url.clone(),
                            detail: Some(ImageDetail::Auto),
                        },
                    },
                ),
            ];

            debug!("使用 Vision API，图片: {}", url);

            ChatCompletionRequestUserMessageArgs::default()
                .content(ChatCompletionRequestUserMessageContent::Array(
                    content_parts,
                ))
                .build()
                .map_err(|e| CallError::permanent(format!("构建用户消息失败: {}", e)))?
        } else {
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_text)
                .build()
                .map_err(|e| CallError::permanent(format!("构建用户消息失败: {}", e)))?
        };

        messages.push(ChatCompletionRequestMessage::User(user_msg));

        // 构建请求（低温度保证输出稳定）
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(0.01)
            .max_tokens(1024u32)
            .build()
            .map_err(|e| CallError::permanent(format!("构建请求失败: {}", e)))?;

        // 调用 API
        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            classify_api_error(&e.to_string())
        })?;

        // 提取响应内容
        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| CallError::permanent("LLM 返回内容为空"))?;

        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl Estimator for LlmEstimator {
    async fn estimate(&self, record: &InputRecord) -> Result<Estimate, CallError> {
        let response = self.send_request(record).await?;
        parse_estimate_response(&response)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// 按错误文本对 API 错误分类
///
/// 超时、限流、连接类错误可重试；其余（认证失败、模型不存在、
/// 请求格式错误等）重试无意义，直接判为永久错误。
fn classify_api_error(message: &str) -> CallError {
    let lower = message.to_lowercase();
    let transient = lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("rate limit")
        || lower.contains("429")
        || lower.contains("connection")
        || lower.contains("connect")
        || lower.contains("503")
        || lower.contains("502")
        || lower.contains("overloaded");
    if transient {
        CallError::transient(message)
    } else {
        CallError::permanent(message)
    }
}

/// 从模型响应中截取 JSON 对象文本
///
/// 容忍 markdown 代码围栏与前后缀文字，取第一个 `{` 到最后一个 `}`。
fn extract_json(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&response[start..=end])
}

/// 将模型响应解析为结构化估算结果
///
/// 解析失败判为永久错误：同样的输入重试只会得到同样无法解析的输出。
fn parse_estimate_response(response: &str) -> Result<Estimate, CallError> {
    let json_text = extract_json(response)
        .ok_or_else(|| CallError::permanent(format!("响应中没有 JSON 对象: {}", response)))?;

    let value: serde_json::Value = serde_json::from_str(json_text)
        .map_err(|e| CallError::permanent(format!("JSON 解析失败: {} (响应: {})", e, json_text)))?;

    let text_field = |key: &str| -> String {
        value
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim()
            .to_string()
    };

    // weight 允许数字或字符串两种形态（模型两种都可能给）
    let weight_kg = match value.get("weight_kg") {
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };

    let volume = text_field("volume");
    if volume.is_empty() && weight_kg <= 0.0 {
        return Err(CallError::permanent(format!(
            "响应缺少 volume 和 weight_kg: {}",
            json_text
        )));
    }

    Ok(Estimate {
        volume,
        packed_volume: text_field("packed_volume"),
        weight_kg,
        reason: text_field("reason"),
    })
}
