//! 渠道 DAO 模块
//!
//! 提供渠道配置的数据库操作。状态翻转带原因字段落库，方便管理端回溯
//! 熔断历史。

use crate::models::{Channel, ChannelInfo, ChannelStatus, ChannelType, MultiKeyMode};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

/// 渠道 DAO
pub struct ChannelDao;

impl ChannelDao {
    /// 初始化渠道表
    pub fn create_tables(conn: &Connection) -> Result<(), String> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS channels (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                key TEXT NOT NULL,
                base_url TEXT,
                channel_type TEXT NOT NULL DEFAULT 'openai',
                channel_group TEXT NOT NULL DEFAULT 'default',
                models TEXT NOT NULL DEFAULT '',
                priority INTEGER NOT NULL DEFAULT 0,
                weight INTEGER NOT NULL DEFAULT 0,
                status INTEGER NOT NULL DEFAULT 1,
                auto_ban INTEGER NOT NULL DEFAULT 1,
                is_multi_key INTEGER NOT NULL DEFAULT 0,
                multi_key_mode TEXT NOT NULL DEFAULT 'random',
                status_reason TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_channels_status ON channels(status);",
        )
        .map_err(|e| format!("创建渠道表失败: {e}"))
    }

    /// 插入渠道，返回分配的 ID
    pub fn insert(conn: &Connection, channel: &Channel) -> Result<i64, String> {
        let now = Utc::now().timestamp();
        conn.execute(
            "INSERT INTO channels (name, key, base_url, channel_type, channel_group, models,
                                   priority, weight, status, auto_ban, is_multi_key,
                                   multi_key_mode, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                channel.name,
                channel.key,
                channel.base_url,
                channel.channel_type.config_key(),
                channel.group,
                channel.models,
                channel.priority,
                channel.weight,
                channel.status.as_i64(),
                channel.auto_ban,
                channel.info.is_multi_key,
                channel.info.multi_key_mode.config_key(),
                now,
                now,
            ],
        )
        .map_err(|e| format!("插入渠道失败: {e}"))?;
        Ok(conn.last_insert_rowid())
    }

    /// 读取全部渠道
    pub fn get_all(conn: &Connection) -> Result<Vec<Channel>, String> {
        Self::query_channels(conn, "SELECT * FROM channels ORDER BY id")
    }

    /// 只读取启用状态的渠道，内存缓存关闭时的选择数据源
    pub fn get_enabled(conn: &Connection) -> Result<Vec<Channel>, String> {
        Self::query_channels(
            conn,
            "SELECT * FROM channels WHERE status = 1 ORDER BY priority DESC, id",
        )
    }

    /// 按 ID 读取渠道
    pub fn get_by_id(conn: &Connection, id: i64) -> Result<Option<Channel>, String> {
        conn.query_row("SELECT * FROM channels WHERE id = ?1", params![id], |row| {
            Self::row_to_channel(row)
        })
        .optional()
        .map_err(|e| format!("查询渠道 #{id} 失败: {e}"))
    }

    /// 更新渠道的可编辑字段
    pub fn update(conn: &Connection, channel: &Channel) -> Result<bool, String> {
        let changed = conn
            .execute(
                "UPDATE channels SET name = ?1, key = ?2, base_url = ?3, channel_type = ?4,
                        channel_group = ?5, models = ?6, priority = ?7, weight = ?8,
                        status = ?9, auto_ban = ?10, is_multi_key = ?11, multi_key_mode = ?12,
                        updated_at = ?13
                 WHERE id = ?14",
                params![
                    channel.name,
                    channel.key,
                    channel.base_url,
                    channel.channel_type.config_key(),
                    channel.group,
                    channel.models,
                    channel.priority,
                    channel.weight,
                    channel.status.as_i64(),
                    channel.auto_ban,
                    channel.info.is_multi_key,
                    channel.info.multi_key_mode.config_key(),
                    Utc::now().timestamp(),
                    channel.id,
                ],
            )
            .map_err(|e| format!("更新渠道 #{} 失败: {e}", channel.id))?;
        Ok(changed > 0)
    }

    /// 更新渠道状态和原因
    pub fn update_status(
        conn: &Connection,
        id: i64,
        status: ChannelStatus,
        reason: Option<&str>,
    ) -> Result<bool, String> {
        let changed = conn
            .execute(
                "UPDATE channels SET status = ?1, status_reason = ?2, updated_at = ?3
                 WHERE id = ?4",
                params![status.as_i64(), reason, Utc::now().timestamp(), id],
            )
            .map_err(|e| format!("更新渠道 #{id} 状态失败: {e}"))?;
        Ok(changed > 0)
    }

    /// 删除渠道
    pub fn delete(conn: &Connection, id: i64) -> Result<bool, String> {
        let changed = conn
            .execute("DELETE FROM channels WHERE id = ?1", params![id])
            .map_err(|e| format!("删除渠道 #{id} 失败: {e}"))?;
        Ok(changed > 0)
    }

    fn query_channels(conn: &Connection, sql: &str) -> Result<Vec<Channel>, String> {
        let mut stmt = conn.prepare(sql).map_err(|e| e.to_string())?;
        let rows = stmt
            .query_map([], |row| Self::row_to_channel(row))
            .map_err(|e| e.to_string())?;

        let mut channels = Vec::new();
        for row in rows {
            channels.push(row.map_err(|e| e.to_string())?);
        }
        Ok(channels)
    }

    fn row_to_channel(row: &Row<'_>) -> rusqlite::Result<Channel> {
        let channel_type: String = row.get("channel_type")?;
        let multi_key_mode: String = row.get("multi_key_mode")?;
        let is_multi_key: bool = row.get("is_multi_key")?;
        let status: i64 = row.get("status")?;

        Ok(Channel {
            id: row.get("id")?,
            name: row.get("name")?,
            key: row.get("key")?,
            base_url: row.get("base_url")?,
            channel_type: ChannelType::from_config_key(&channel_type)
                .unwrap_or(ChannelType::Custom),
            group: row.get("channel_group")?,
            models: row.get("models")?,
            priority: row.get("priority")?,
            weight: row.get("weight")?,
            status: ChannelStatus::from_i64(status),
            auto_ban: row.get("auto_ban")?,
            info: ChannelInfo::new(is_multi_key, MultiKeyMode::from_config_key(&multi_key_mode)),
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}
