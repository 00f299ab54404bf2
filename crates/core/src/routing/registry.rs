//! 渠道注册表
//!
//! 渠道存储的内存快照：一边是 分组→模型→渠道 ID 列表 的能力索引，另一边
//! 是包含全部渠道（含禁用）的 ID 映射。两张表在一把读写锁下整体换入，
//! 读者看不到新旧两代混杂的状态。
//!
//! 重建的全部准备工作（展开能力、建桶、排序）都在锁外完成，独占锁内只做
//! 游标续用和指针交换；状态翻转、渠道替换等原地变更与交换共用同一把锁。

use super::selector::{normalize_model_name, select_weighted};
use crate::errors::RouterError;
use crate::models::{Ability, Channel, ChannelInfo, ChannelStatus};
use parking_lot::RwLock;
use std::collections::HashMap;

/// 注册表快照
#[derive(Default)]
struct RegistrySnapshot {
    /// 分组 → 模型 → 渠道 ID 列表（按优先级降序）
    group2model2channels: HashMap<String, HashMap<String, Vec<i64>>>,
    /// 渠道 ID → 渠道，包含禁用渠道，供在途请求按 ID 直查
    channels: HashMap<i64, Channel>,
}

/// 注册表概览，重建后打日志用
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    /// 渠道总数（含禁用）
    pub channel_count: usize,
    /// 启用渠道数
    pub enabled_count: usize,
    /// (分组, 模型) 桶数
    pub bucket_count: usize,
}

/// 渠道注册表
///
/// 显式对象而不是包级全局量，每个测试可以独立构造自己的实例。
#[derive(Default)]
pub struct ChannelRegistry {
    snapshot: RwLock<RegistrySnapshot>,
}

impl ChannelRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 用一批渠道整体重建快照
    ///
    /// 轮询模式多密钥渠道的游标从上一代快照续用，重建不会打断轮询顺序；
    /// 新渠道和非轮询渠道的游标从零开始。
    pub fn rebuild(&self, channels: Vec<Channel>) {
        let mut id_map: HashMap<i64, Channel> = HashMap::with_capacity(channels.len());
        for channel in channels {
            id_map.insert(channel.id, channel);
        }

        let mut buckets: HashMap<String, HashMap<String, Vec<i64>>> = HashMap::new();
        for channel in id_map.values() {
            for ability in Ability::expand(channel) {
                buckets
                    .entry(ability.group)
                    .or_default()
                    .entry(ability.model)
                    .or_default()
                    .push(ability.channel_id);
            }
        }
        for model_map in buckets.values_mut() {
            for ids in model_map.values_mut() {
                ids.sort_by_key(|id| std::cmp::Reverse(id_map[id].priority));
            }
        }

        let mut snapshot = self.snapshot.write();
        for (id, channel) in id_map.iter_mut() {
            if !channel.is_polling_multi_key() {
                continue;
            }
            if let Some(old) = snapshot.channels.get(id) {
                if old.is_polling_multi_key() {
                    channel.info.share_polling_cursor(&old.info);
                }
            }
        }
        let channel_count = id_map.len();
        *snapshot = RegistrySnapshot {
            group2model2channels: buckets,
            channels: id_map,
        };
        drop(snapshot);

        tracing::debug!("渠道注册表已重建: {channel_count} 个渠道");
    }

    /// 为 (分组, 模型, 重试次数) 选出一个渠道
    ///
    /// 精确模型名没有桶时用归一化名再查一次。`Ok(None)` 表示确实没有
    /// 候选；一致性错误原样上浮。
    pub fn get_satisfied_channel(
        &self,
        group: &str,
        model: &str,
        retry: usize,
    ) -> Result<Option<Channel>, RouterError> {
        let snapshot = self.snapshot.read();
        let model_map = snapshot.group2model2channels.get(group);

        let mut candidates = model_map.and_then(|m| m.get(model));
        if candidates.map_or(true, |ids| ids.is_empty()) {
            let normalized = normalize_model_name(model);
            if normalized != model {
                candidates = model_map.and_then(|m| m.get(&normalized));
            }
        }

        match candidates {
            Some(ids) if !ids.is_empty() => select_weighted(ids, &snapshot.channels, retry),
            _ => Ok(None),
        }
    }

    /// 按 ID 读取渠道，禁用渠道同样可查
    pub fn get_channel(&self, id: i64) -> Option<Channel> {
        self.snapshot.read().channels.get(&id).cloned()
    }

    /// 按 ID 读取渠道的多密钥信息
    pub fn get_channel_info(&self, id: i64) -> Option<ChannelInfo> {
        self.snapshot
            .read()
            .channels
            .get(&id)
            .map(|c| c.info.clone())
    }

    /// 原地翻转渠道状态
    ///
    /// 状态不是启用时，立即把该 ID 从所有 (分组, 模型) 桶里摘除，并发中
    /// 的读者随即选不到它，不依赖下一次定时重建。重复调用是幂等的。
    pub fn update_channel_status(&self, id: i64, status: ChannelStatus) {
        let mut snapshot = self.snapshot.write();
        if let Some(channel) = snapshot.channels.get_mut(&id) {
            channel.status = status;
        }

        if !status.is_enabled() {
            for model_map in snapshot.group2model2channels.values_mut() {
                for ids in model_map.values_mut() {
                    if let Some(pos) = ids.iter().position(|x| *x == id) {
                        ids.remove(pos);
                    }
                }
            }
        }
    }

    /// 原地替换渠道
    ///
    /// 两侧都是轮询多密钥时续用旧游标。桶的成员资格不在这里刷新，等下
    /// 一次重建统一处理。
    pub fn update_channel(&self, mut channel: Channel) {
        let mut snapshot = self.snapshot.write();
        if let Some(old) = snapshot.channels.get(&channel.id) {
            if channel.is_polling_multi_key() && old.is_polling_multi_key() {
                channel.info.share_polling_cursor(&old.info);
            }
        }
        snapshot.channels.insert(channel.id, channel);
    }

    /// 快照概览
    pub fn stats(&self) -> RegistryStats {
        let snapshot = self.snapshot.read();
        RegistryStats {
            channel_count: snapshot.channels.len(),
            enabled_count: snapshot
                .channels
                .values()
                .filter(|c| c.is_enabled())
                .count(),
            bucket_count: snapshot
                .group2model2channels
                .values()
                .map(|m| m.len())
                .sum(),
        }
    }
}
