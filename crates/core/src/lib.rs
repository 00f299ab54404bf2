//! 核心类型和路由模块
//!
//! 包含 models, errors, config, database 等基础功能，以及渠道路由子系统
//! （注册表、选择器、多密钥解析）。

pub mod config;
pub mod database;
pub mod errors;
pub mod models;
pub mod routing;

pub use config::RouterConfig;
pub use errors::{RouterError, UpstreamError, UpstreamErrorKind};
pub use models::{Ability, Channel, ChannelInfo, ChannelStatus, ChannelType, MultiKeyMode};
pub use routing::{resolve_credential, ChannelRegistry, SMOOTHING_FACTOR};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
