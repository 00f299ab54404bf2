//! 渠道健康熔断器
//!
//! 把已分类的上游失败折算成渠道状态翻转：致命失败把渠道打到自动禁用，
//! 自动禁用渠道上的一次干净成功把它恢复回启用。手动禁用状态只属于管理员，
//! 这里永远不碰。状态变化先落库、再原地改注册表，并发读者立刻看到效果，
//! 不等下一次定时重建。

use crate::notification_service::{NotificationLimiter, Notifier};
use relaycast_core::database::{dao::ChannelDao, lock_db, DbConnection};
use relaycast_core::{
    Channel, ChannelRegistry, ChannelStatus, ChannelType, RouterConfig, UpstreamError,
    UpstreamErrorKind,
};
use std::sync::Arc;
use std::time::Duration;

/// 判定一次上游失败是否应该自动禁用渠道
///
/// 纯函数：鉴权失败（401 恒为真，403 只对用它表示鉴权失败的协议为真）、
/// 已知的致命错误码/类型、以及命中关键字黑名单的错误消息会触发禁用；
/// 瞬时错误和明确跳过重试的错误永远不会。
pub fn should_auto_disable(
    err: &UpstreamError,
    channel_type: ChannelType,
    keywords: &[String],
) -> bool {
    match err.kind {
        UpstreamErrorKind::Fatal => return true,
        UpstreamErrorKind::SkipRetry => return false,
        UpstreamErrorKind::Transient => {}
    }

    if let Some(status) = err.status_code {
        if status == 401 {
            return true;
        }
        if status == 403 && channel_type.uses_403_for_auth() {
            return true;
        }
    }

    if let Some(code) = err.code.as_deref() {
        match code {
            "invalid_api_key" | "account_deactivated" | "billing_not_active"
            | "pre_consume_token_quota_failed" | "arrearage" => return true,
            _ => {}
        }
    }

    if let Some(error_type) = err.error_type.as_deref() {
        match error_type {
            "insufficient_quota" | "insufficient_user_quota" | "authentication_error"
            | "permission_error" | "forbidden" => return true,
            _ => {}
        }
    }

    let message = err.message.to_lowercase();
    keywords
        .iter()
        .filter(|k| !k.is_empty())
        .any(|k| message.contains(&k.to_lowercase()))
}

/// 渠道健康服务
pub struct ChannelHealthService {
    db: DbConnection,
    registry: Arc<ChannelRegistry>,
    notifier: Arc<dyn Notifier>,
    limiter: NotificationLimiter,
    automatic_disable_enabled: bool,
    automatic_enable_enabled: bool,
    disable_keywords: Vec<String>,
}

impl ChannelHealthService {
    /// 创建健康服务
    pub fn new(
        db: DbConnection,
        registry: Arc<ChannelRegistry>,
        config: &RouterConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            db,
            registry,
            notifier,
            limiter: NotificationLimiter::new(
                config.notify_limit_count,
                Duration::from_secs(config.notify_cooldown_secs),
            ),
            automatic_disable_enabled: config.automatic_disable_enabled,
            automatic_enable_enabled: config.automatic_enable_enabled,
            disable_keywords: config.disable_keywords.clone(),
        }
    }

    /// 上报一次失败的上游调用
    pub async fn report_failure(&self, channel: &Channel, err: &UpstreamError) {
        if !self.automatic_disable_enabled {
            return;
        }
        if !should_auto_disable(err, channel.channel_type, &self.disable_keywords) {
            return;
        }
        if !channel.auto_ban {
            tracing::info!(
                "渠道 {}（#{}）未开启自动禁用，跳过禁用操作",
                channel.name,
                channel.id
            );
            return;
        }
        self.disable_channel(channel, &err.to_string()).await;
    }

    /// 上报一次干净完成的上游调用
    ///
    /// 只有当前处于自动禁用状态的渠道才会被恢复，手动禁用不受影响。
    pub async fn report_success(&self, channel: &Channel) {
        if !self.automatic_enable_enabled {
            return;
        }
        let status = self
            .registry
            .get_channel(channel.id)
            .map(|c| c.status)
            .unwrap_or(channel.status);
        if status != ChannelStatus::AutoDisabled {
            return;
        }
        self.enable_channel(channel).await;
    }

    async fn disable_channel(&self, channel: &Channel, reason: &str) {
        tracing::warn!(
            "渠道 {}（#{}）遇到致命错误，准备禁用，原因: {reason}",
            channel.name,
            channel.id
        );

        match self.persist_status(channel.id, ChannelStatus::AutoDisabled, Some(reason)) {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                tracing::error!("渠道 #{} 禁用状态落库失败: {e}", channel.id);
                return;
            }
        }
        self.registry
            .update_channel_status(channel.id, ChannelStatus::AutoDisabled);

        self.notify_status_change(
            channel,
            ChannelStatus::AutoDisabled,
            &format!(
                "渠道 {}（#{}）已被自动禁用，原因: {reason}",
                channel.name, channel.id
            ),
        )
        .await;
    }

    async fn enable_channel(&self, channel: &Channel) {
        match self.persist_status(channel.id, ChannelStatus::Enabled, None) {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                tracing::error!("渠道 #{} 恢复状态落库失败: {e}", channel.id);
                return;
            }
        }
        self.registry
            .update_channel_status(channel.id, ChannelStatus::Enabled);

        self.notify_status_change(
            channel,
            ChannelStatus::Enabled,
            &format!("渠道 {}（#{}）已自动恢复启用", channel.name, channel.id),
        )
        .await;
    }

    fn persist_status(
        &self,
        id: i64,
        status: ChannelStatus,
        reason: Option<&str>,
    ) -> Result<bool, String> {
        let conn = lock_db(&self.db)?;
        ChannelDao::update_status(&conn, id, status, reason)
    }

    /// 同一渠道同一状态在冷却窗口内只通知有限次数
    async fn notify_status_change(&self, channel: &Channel, status: ChannelStatus, content: &str) {
        let key = format!("channel_update_{}_{}", channel.id, status.as_i64());
        if !self.limiter.allow(&key) {
            return;
        }

        let subject = match status {
            ChannelStatus::Enabled => format!("渠道 {}（#{}）已启用", channel.name, channel.id),
            _ => format!("渠道 {}（#{}）已被禁用", channel.name, channel.id),
        };
        if let Err(e) = self.notifier.notify(&subject, content).await {
            tracing::warn!("渠道 #{} 状态通知投递失败: {e}", channel.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transient(message: &str, status: Option<u16>) -> UpstreamError {
        UpstreamError::transient(message, status)
    }

    #[test]
    fn test_auth_status_codes() {
        let keywords = vec![];
        assert!(should_auto_disable(
            &transient("unauthorized", Some(401)),
            ChannelType::OpenAI,
            &keywords
        ));
        // 403 只对把它当鉴权失败的协议生效
        assert!(should_auto_disable(
            &transient("forbidden", Some(403)),
            ChannelType::Gemini,
            &keywords
        ));
        assert!(!should_auto_disable(
            &transient("forbidden", Some(403)),
            ChannelType::OpenAI,
            &keywords
        ));
    }

    #[test]
    fn test_fatal_codes_and_types() {
        let keywords = vec![];
        for code in [
            "invalid_api_key",
            "account_deactivated",
            "billing_not_active",
            "pre_consume_token_quota_failed",
            "arrearage",
        ] {
            let err = transient("upstream error", Some(400)).with_code(code);
            assert!(
                should_auto_disable(&err, ChannelType::OpenAI, &keywords),
                "code={code}"
            );
        }

        for error_type in ["insufficient_quota", "authentication_error", "forbidden"] {
            let err = transient("upstream error", Some(400)).with_error_type(error_type);
            assert!(
                should_auto_disable(&err, ChannelType::OpenAI, &keywords),
                "error_type={error_type}"
            );
        }

        let err = transient("upstream error", Some(400)).with_code("context_length_exceeded");
        assert!(!should_auto_disable(&err, ChannelType::OpenAI, &keywords));
    }

    #[test]
    fn test_kind_overrides() {
        let keywords = vec![];
        assert!(should_auto_disable(
            &UpstreamError::fatal("key deactivated", None),
            ChannelType::OpenAI,
            &keywords
        ));
        // 明确跳过重试的错误即使带着 401 也不禁用
        assert!(!should_auto_disable(
            &UpstreamError::skip_retry("cancelled by caller", Some(401)),
            ChannelType::OpenAI,
            &keywords
        ));
    }

    #[test]
    fn test_keyword_denylist_matches_lowercased_message() {
        let keywords = vec!["api key not valid".to_string()];
        assert!(should_auto_disable(
            &transient("API Key Not Valid. Please pass a valid key.", Some(400)),
            ChannelType::OpenAI,
            &keywords
        ));
        assert!(!should_auto_disable(
            &transient("rate limit exceeded", Some(429)),
            ChannelType::OpenAI,
            &keywords
        ));
    }

    #[test]
    fn test_transient_errors_never_disable() {
        let keywords = vec![];
        assert!(!should_auto_disable(
            &transient("upstream timeout", Some(504)),
            ChannelType::OpenAI,
            &keywords
        ));
        assert!(!should_auto_disable(
            &transient("connection reset by peer", None),
            ChannelType::OpenAI,
            &keywords
        ));
    }
}
