//! 路由子系统配置
//!
//! 所有开关集中在一个结构里，便于服务层一次性注入；支持从 YAML 文件加载。

use serde::{Deserialize, Serialize};

/// 路由子系统配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RouterConfig {
    /// 是否启用内存缓存；关闭后每次选择直接查询渠道存储
    pub memory_cache_enabled: bool,
    /// 注册表定时重建间隔（秒）
    pub sync_frequency_secs: u64,
    /// "auto" 分组按顺序替换成的真实分组序列
    pub auto_groups: Vec<String>,
    /// 熔断器自动禁用总开关
    pub automatic_disable_enabled: bool,
    /// 熔断器自动恢复总开关
    pub automatic_enable_enabled: bool,
    /// 自动禁用关键字，命中小写化后的上游错误消息即触发
    pub disable_keywords: Vec<String>,
    /// 单个冷却窗口内同类通知的最大条数
    pub notify_limit_count: usize,
    /// 通知冷却窗口（秒）
    pub notify_cooldown_secs: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            memory_cache_enabled: true,
            sync_frequency_secs: 600,
            auto_groups: Vec::new(),
            automatic_disable_enabled: true,
            automatic_enable_enabled: false,
            disable_keywords: Vec::new(),
            notify_limit_count: 2,
            notify_cooldown_secs: 3600,
        }
    }
}

impl RouterConfig {
    /// 从 YAML 字符串解析配置
    pub fn from_yaml_str(raw: &str) -> Result<Self, String> {
        serde_yaml::from_str(raw).map_err(|e| format!("解析路由配置失败: {e}"))
    }

    /// 从 JSON 字符串解析配置，管理端下发配置用
    pub fn from_json_str(raw: &str) -> Result<Self, String> {
        serde_json::from_str(raw).map_err(|e| format!("解析路由配置失败: {e}"))
    }

    /// 从 YAML 文件加载配置
    pub fn from_yaml_file(path: impl AsRef<std::path::Path>) -> Result<Self, String> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| format!("读取路由配置文件失败: {e}"))?;
        Self::from_yaml_str(&raw)
    }
}
