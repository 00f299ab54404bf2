//! 多密钥解析
//!
//! 一个渠道可以捆绑多个上游凭证，按随机或轮询策略为每次请求选出一个。
//! 轮询游标是渠道上的共享原子计数器，并发请求下无需额外加锁。

use crate::errors::RouterError;
use crate::models::{Channel, MultiKeyMode};
use rand::Rng;

/// 为一次请求解析出要使用的凭证
pub fn resolve_credential(channel: &Channel) -> Result<String, RouterError> {
    let keys = channel.keys();
    if keys.is_empty() {
        return Err(RouterError::EmptyKeyList {
            channel_id: channel.id,
        });
    }

    if !channel.info.is_multi_key || keys.len() == 1 {
        return Ok(keys[0].to_string());
    }

    let index = match channel.info.multi_key_mode {
        MultiKeyMode::Random => rand::thread_rng().gen_range(0..keys.len()),
        MultiKeyMode::Polling => channel.info.advance_polling_cursor() % keys.len(),
    };
    Ok(keys[index].to_string())
}
