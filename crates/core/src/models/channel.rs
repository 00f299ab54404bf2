//! 渠道数据模型
//!
//! 渠道是网关可以把请求转发到的一个上游凭证配置，包含密钥、分组/模型归属、
//! 优先级与权重等路由信息。渠道由管理子系统持久化，路由子系统只读取并在
//! 内存中做状态翻转。

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// 渠道状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    /// 已启用，参与路由
    Enabled,
    /// 管理员手动禁用，只能由管理员恢复
    ManuallyDisabled,
    /// 熔断器自动禁用，可由自动恢复机制重新启用
    AutoDisabled,
}

impl ChannelStatus {
    /// 转换为数据库存储的整数值
    pub fn as_i64(self) -> i64 {
        match self {
            ChannelStatus::Enabled => 1,
            ChannelStatus::ManuallyDisabled => 2,
            ChannelStatus::AutoDisabled => 3,
        }
    }

    /// 从数据库整数值解析，未知值按手动禁用处理
    pub fn from_i64(value: i64) -> Self {
        match value {
            1 => ChannelStatus::Enabled,
            3 => ChannelStatus::AutoDisabled,
            _ => ChannelStatus::ManuallyDisabled,
        }
    }

    /// 是否参与路由
    pub fn is_enabled(self) -> bool {
        matches!(self, ChannelStatus::Enabled)
    }
}

/// 上游协议类型
///
/// 熔断器的错误分类需要区分协议家族（例如用 403 表示鉴权失败的上游）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    /// OpenAI 及兼容协议
    #[default]
    OpenAI,
    /// Azure OpenAI
    Azure,
    /// Anthropic
    Anthropic,
    /// Google Gemini
    Gemini,
    /// Ollama 本地部署
    Ollama,
    /// OpenRouter 聚合
    OpenRouter,
    /// 自定义协议
    Custom,
}

impl ChannelType {
    /// 获取配置键名
    pub fn config_key(&self) -> &'static str {
        match self {
            ChannelType::OpenAI => "openai",
            ChannelType::Azure => "azure",
            ChannelType::Anthropic => "anthropic",
            ChannelType::Gemini => "gemini",
            ChannelType::Ollama => "ollama",
            ChannelType::OpenRouter => "openrouter",
            ChannelType::Custom => "custom",
        }
    }

    /// 从配置键名解析渠道类型
    pub fn from_config_key(key: &str) -> Option<Self> {
        match key {
            "openai" => Some(ChannelType::OpenAI),
            "azure" => Some(ChannelType::Azure),
            "anthropic" => Some(ChannelType::Anthropic),
            "gemini" => Some(ChannelType::Gemini),
            "ollama" => Some(ChannelType::Ollama),
            "openrouter" => Some(ChannelType::OpenRouter),
            "custom" => Some(ChannelType::Custom),
            _ => None,
        }
    }

    /// 该协议是否用 HTTP 403 表示鉴权失败
    ///
    /// 大多数上游用 403 表示权限不足而不是密钥失效，只有少数上游
    /// （目前是 Gemini）把 403 当作鉴权失败返回。
    pub fn uses_403_for_auth(&self) -> bool {
        matches!(self, ChannelType::Gemini)
    }

    /// 获取所有渠道类型
    pub fn all() -> &'static [ChannelType] {
        &[
            ChannelType::OpenAI,
            ChannelType::Azure,
            ChannelType::Anthropic,
            ChannelType::Gemini,
            ChannelType::Ollama,
            ChannelType::OpenRouter,
            ChannelType::Custom,
        ]
    }
}

/// 多密钥选取模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MultiKeyMode {
    /// 每次请求均匀随机选取
    #[default]
    Random,
    /// 按轮询游标依次选取
    Polling,
}

impl MultiKeyMode {
    /// 获取配置键名
    pub fn config_key(&self) -> &'static str {
        match self {
            MultiKeyMode::Random => "random",
            MultiKeyMode::Polling => "polling",
        }
    }

    /// 从配置键名解析选取模式，未知值回退为随机
    pub fn from_config_key(key: &str) -> Self {
        match key {
            "polling" => MultiKeyMode::Polling,
            _ => MultiKeyMode::Random,
        }
    }
}

/// 渠道多密钥信息
///
/// 轮询游标是跨快照共享的原子计数器：注册表重建时把旧快照的 `Arc` 接到
/// 新渠道上，轮询顺序因此不会被重建打断。游标单调递增，取模后作为密钥下标。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelInfo {
    /// 是否配置了多个密钥
    pub is_multi_key: bool,
    /// 多密钥选取模式
    pub multi_key_mode: MultiKeyMode,
    /// 轮询游标（不持久化，进程内单调）
    #[serde(skip)]
    polling_cursor: Arc<AtomicUsize>,
}

impl ChannelInfo {
    /// 创建多密钥信息
    pub fn new(is_multi_key: bool, multi_key_mode: MultiKeyMode) -> Self {
        Self {
            is_multi_key,
            multi_key_mode,
            polling_cursor: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 取出当前游标并前进一步
    pub fn advance_polling_cursor(&self) -> usize {
        self.polling_cursor.fetch_add(1, Ordering::Relaxed)
    }

    /// 查看当前游标值
    pub fn polling_cursor(&self) -> usize {
        self.polling_cursor.load(Ordering::Relaxed)
    }

    /// 共享另一个渠道的轮询游标
    ///
    /// 注册表重建和渠道原地更新用它保持轮询公平性的连续。
    pub fn share_polling_cursor(&mut self, other: &ChannelInfo) {
        self.polling_cursor = Arc::clone(&other.polling_cursor);
    }
}

/// 渠道：一个上游凭证配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    /// 渠道 ID
    pub id: i64,
    /// 显示名称
    pub name: String,
    /// 密钥，多密钥渠道用换行符分隔
    pub key: String,
    /// 上游地址，空表示使用协议默认地址
    pub base_url: Option<String>,
    /// 上游协议类型
    pub channel_type: ChannelType,
    /// 所属分组列表，逗号分隔
    pub group: String,
    /// 可服务的模型列表，逗号分隔
    pub models: String,
    /// 优先级，数值越大越优先
    pub priority: i64,
    /// 权重，同一优先级内的加权随机比重
    pub weight: i64,
    /// 渠道状态
    pub status: ChannelStatus,
    /// 是否允许熔断器自动禁用
    pub auto_ban: bool,
    /// 多密钥信息
    pub info: ChannelInfo,
    /// 创建时间（unix 秒）
    pub created_at: i64,
    /// 更新时间（unix 秒）
    pub updated_at: i64,
}

impl Channel {
    /// 解析分组列表
    pub fn groups(&self) -> Vec<&str> {
        split_list(&self.group)
    }

    /// 解析模型列表
    pub fn model_names(&self) -> Vec<&str> {
        split_list(&self.models)
    }

    /// 解析密钥列表
    pub fn keys(&self) -> Vec<&str> {
        self.key
            .lines()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// 是否参与路由
    pub fn is_enabled(&self) -> bool {
        self.status.is_enabled()
    }

    /// 是否是轮询模式的多密钥渠道
    pub fn is_polling_multi_key(&self) -> bool {
        self.info.is_multi_key && self.info.multi_key_mode == MultiKeyMode::Polling
    }
}

fn split_list(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
