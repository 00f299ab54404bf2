//! 错误类型模块
//!
//! 定义路由子系统的各种错误类型。
//!
//! ## 模块结构
//! - `router_error`: 路由域错误（选择失败、一致性错误等）
//! - `upstream_error`: 已分类的上游调用错误，供熔断器消费

pub mod router_error;
pub mod upstream_error;

pub use router_error::RouterError;
pub use upstream_error::{UpstreamError, UpstreamErrorKind};
