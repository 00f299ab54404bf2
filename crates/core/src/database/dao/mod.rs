//! DAO 模块
//!
//! 提供渠道表的数据库操作。

mod channel;

pub use channel::ChannelDao;
