//! 数据模型模块
//!
//! 定义渠道、能力等路由子系统使用的核心数据结构。

mod ability;
mod channel;

pub use ability::Ability;
pub use channel::{Channel, ChannelInfo, ChannelStatus, ChannelType, MultiKeyMode};
