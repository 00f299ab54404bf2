//! 渠道路由子系统
//!
//! 负责在每次中继请求时从几十个异构上游渠道里选出一个来服务请求。
//!
//! ## 模块结构
//!
//! - `registry` - 渠道注册表：内存快照的整体重建与原地变更
//! - `selector` - 选择算法：优先级分层 + 层内加权随机
//! - `multi_key` - 多密钥解析：随机或轮询地选出一个凭证
//!
//! ## 并发模型
//!
//! 多读单写：请求线程只持共享锁做查表，后台重建在锁外准备好全部数据后
//! 持独占锁换指针；状态翻转等原地变更与换指针共用同一把独占锁，不会交错
//! 出撕裂的快照。

mod multi_key;
mod registry;
mod selector;

pub use multi_key::resolve_credential;
pub use registry::{ChannelRegistry, RegistryStats};
pub use selector::{normalize_model_name, select_weighted, SMOOTHING_FACTOR};
