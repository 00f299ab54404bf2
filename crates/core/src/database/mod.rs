//! 数据库模块
//!
//! 渠道存储建立在 SQLite 之上，连接用 `Arc<Mutex<Connection>>` 在各服务间
//! 共享。批量读取不开事务，重建窗口内的最终一致即可满足路由需求。

pub mod dao;

use rusqlite::Connection;
use std::sync::{Arc, Mutex, MutexGuard};

/// 共享数据库连接
pub type DbConnection = Arc<Mutex<Connection>>;

/// 获取数据库连接锁
pub fn lock_db(db: &DbConnection) -> Result<MutexGuard<'_, Connection>, String> {
    db.lock().map_err(|_| "数据库连接锁已中毒".to_string())
}

/// 打开数据库文件并初始化渠道表
pub fn open_database(path: impl AsRef<std::path::Path>) -> Result<DbConnection, String> {
    let conn = Connection::open(path.as_ref()).map_err(|e| format!("打开数据库失败: {e}"))?;
    dao::ChannelDao::create_tables(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// 打开内存数据库并初始化渠道表，测试用
pub fn open_in_memory() -> Result<DbConnection, String> {
    let conn = Connection::open_in_memory().map_err(|e| format!("打开内存数据库失败: {e}"))?;
    dao::ChannelDao::create_tables(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}
