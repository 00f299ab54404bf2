//! 路由服务层
//!
//! 把核心路由子系统（注册表、选择器、多密钥解析）组装成对外的服务门面：
//! 中继处理器从这里选渠道、拿凭证、上报调用结果，管理子系统从这里触发
//! 重建和配置变更。
//!
//! ## 模块结构
//!
//! - `channel_router_service` - 渠道路由门面与后台同步任务
//! - `channel_health_service` - 健康熔断器（自动禁用/自动恢复）
//! - `notification_service` - 管理员通知与限频

pub mod channel_health_service;
pub mod channel_router_service;
pub mod notification_service;

pub use channel_health_service::{should_auto_disable, ChannelHealthService};
pub use channel_router_service::ChannelRouterService;
pub use notification_service::{LogNotifier, NotificationLimiter, Notifier};
