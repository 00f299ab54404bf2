//! 路由域错误
//!
//! 区分两类根本不同的失败：耗尽（当前配置下确实无渠道可用）和一致性错误
//! （能力索引指向了不存在的渠道，说明缓存与存储出现漂移）。后者必须显式
//! 上浮，绝不允许被静默跳过。

use thiserror::Error;

/// 路由错误
#[derive(Debug, Error)]
pub enum RouterError {
    /// 耗尽：该分组下没有可服务此模型的渠道
    #[error("分组 {group} 下没有可用的 {model} 渠道")]
    NoAvailableChannel { group: String, model: String },

    /// 一致性错误：能力索引引用了不存在的渠道
    #[error("数据一致性错误，渠道 #{channel_id} 不存在，请联系管理员修复")]
    Consistency { channel_id: i64 },

    /// 自动分组序列未配置
    #[error("自动分组未启用")]
    AutoGroupsDisabled,

    /// 自动分组序列全部尝试完毕仍无渠道
    #[error("自动分组序列中没有可服务 {model} 的分组")]
    AutoGroupsExhausted { model: String },

    /// 按 ID 查询的渠道已不存在
    #[error("渠道 #{channel_id} 已不存在")]
    ChannelNotFound { channel_id: i64 },

    /// 渠道未配置任何密钥
    #[error("渠道 #{channel_id} 未配置任何密钥")]
    EmptyKeyList { channel_id: i64 },

    /// 渠道存储错误
    #[error("数据库错误: {0}")]
    Database(String),
}

impl RouterError {
    /// 是否是"无可用渠道"一类的耗尽错误
    pub fn is_exhaustion(&self) -> bool {
        matches!(
            self,
            RouterError::NoAvailableChannel { .. }
                | RouterError::AutoGroupsDisabled
                | RouterError::AutoGroupsExhausted { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhaustion_classification() {
        assert!(RouterError::NoAvailableChannel {
            group: "default".to_string(),
            model: "gpt-4".to_string(),
        }
        .is_exhaustion());
        assert!(RouterError::AutoGroupsDisabled.is_exhaustion());
        assert!(!RouterError::Consistency { channel_id: 3 }.is_exhaustion());
        assert!(!RouterError::Database("oops".to_string()).is_exhaustion());
    }

    #[test]
    fn test_consistency_message_names_channel() {
        let err = RouterError::Consistency { channel_id: 42 };
        assert!(err.to_string().contains("#42"));
    }
}
