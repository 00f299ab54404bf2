//! 管理员通知与限频
//!
//! 熔断器的禁用/恢复事件通过 `Notifier` 投递给管理员。投递通道本身是外部
//! 协作方（邮件、webhook 等），这里只定义接口和一个写日志的默认实现，
//! 并按 渠道+状态 维度做冷却窗口限频，避免抖动渠道刷屏。

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// 通知投递接口
#[async_trait]
pub trait Notifier: Send + Sync {
    /// 投递一条通知
    async fn notify(&self, subject: &str, content: &str) -> Result<(), String>;
}

/// 默认实现：写进日志
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, subject: &str, content: &str) -> Result<(), String> {
        tracing::warn!("[通知] {subject}: {content}");
        Ok(())
    }
}

struct LimitEntry {
    count: usize,
    window_start: Instant,
}

/// 通知限频器
///
/// 同一个键在一个冷却窗口内最多放行 `limit` 条，窗口过期后计数重置。
pub struct NotificationLimiter {
    entries: Mutex<HashMap<String, LimitEntry>>,
    limit: usize,
    window: Duration,
}

impl NotificationLimiter {
    /// 创建限频器
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            limit: limit.max(1),
            window,
        }
    }

    /// 判断该键的通知是否放行
    pub fn allow(&self, key: &str) -> bool {
        let mut entries = self.entries.lock();
        let now = Instant::now();

        // 键集合只会随渠道数缓慢增长，超过阈值时顺手清掉过期窗口
        if entries.len() > 256 {
            let window = self.window;
            entries.retain(|_, e| now.duration_since(e.window_start) < window);
        }

        let entry = entries.entry(key.to_string()).or_insert(LimitEntry {
            count: 0,
            window_start: now,
        });
        if now.duration_since(entry.window_start) >= self.window {
            entry.count = 0;
            entry.window_start = now;
        }

        if entry.count < self.limit {
            entry.count += 1;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limiter_allows_up_to_limit() {
        let limiter = NotificationLimiter::new(2, Duration::from_secs(3600));

        assert!(limiter.allow("channel_update_1_3"));
        assert!(limiter.allow("channel_update_1_3"));
        assert!(!limiter.allow("channel_update_1_3"));

        // 不同的键互不影响
        assert!(limiter.allow("channel_update_2_3"));
    }

    #[test]
    fn test_limiter_resets_after_window() {
        let limiter = NotificationLimiter::new(1, Duration::from_millis(30));

        assert!(limiter.allow("key"));
        assert!(!limiter.allow("key"));

        std::thread::sleep(Duration::from_millis(40));
        assert!(limiter.allow("key"));
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        assert!(LogNotifier.notify("subject", "content").await.is_ok());
    }
}
