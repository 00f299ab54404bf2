//! 已分类的上游调用错误
//!
//! 中继适配器把上游失败整理成这个结构后交给熔断器。分类本身（可重试、
//! 致命、跳过重试）由适配器在调用现场完成，这里只承载结论和原始信息。

use serde::{Deserialize, Serialize};

/// 上游错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamErrorKind {
    /// 瞬时错误（超时、网络抖动），不影响渠道状态
    Transient,
    /// 渠道级致命错误，无条件触发禁用判定
    Fatal,
    /// 明确要求跳过重试的错误，同样不触发禁用
    SkipRetry,
}

/// 一次上游调用的失败信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamError {
    /// 错误类别
    pub kind: UpstreamErrorKind,
    /// HTTP 状态码
    pub status_code: Option<u16>,
    /// 上游返回的错误码（如 invalid_api_key）
    pub code: Option<String>,
    /// 上游返回的错误类型（如 insufficient_quota）
    pub error_type: Option<String>,
    /// 错误消息
    pub message: String,
}

impl UpstreamError {
    /// 创建瞬时错误
    pub fn transient(message: impl Into<String>, status_code: Option<u16>) -> Self {
        Self {
            kind: UpstreamErrorKind::Transient,
            status_code,
            code: None,
            error_type: None,
            message: message.into(),
        }
    }

    /// 创建渠道级致命错误
    pub fn fatal(message: impl Into<String>, status_code: Option<u16>) -> Self {
        Self {
            kind: UpstreamErrorKind::Fatal,
            status_code,
            code: None,
            error_type: None,
            message: message.into(),
        }
    }

    /// 创建跳过重试的错误
    pub fn skip_retry(message: impl Into<String>, status_code: Option<u16>) -> Self {
        Self {
            kind: UpstreamErrorKind::SkipRetry,
            status_code,
            code: None,
            error_type: None,
            message: message.into(),
        }
    }

    /// 附加上游错误码
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// 附加上游错误类型
    pub fn with_error_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = Some(error_type.into());
        self
    }
}

impl std::fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status_code {
            Some(status) => write!(f, "[{status}] {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let err = UpstreamError::transient("connection reset", None);
        assert_eq!(err.kind, UpstreamErrorKind::Transient);
        assert!(err.code.is_none());

        let err = UpstreamError::fatal("invalid key", Some(401))
            .with_code("invalid_api_key")
            .with_error_type("authentication_error");
        assert_eq!(err.kind, UpstreamErrorKind::Fatal);
        assert_eq!(err.code.as_deref(), Some("invalid_api_key"));
        assert_eq!(err.error_type.as_deref(), Some("authentication_error"));
    }

    #[test]
    fn test_display_includes_status() {
        let err = UpstreamError::transient("upstream timeout", Some(504));
        assert_eq!(err.to_string(), "[504] upstream timeout");
    }
}
