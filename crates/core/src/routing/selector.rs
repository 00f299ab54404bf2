//! 渠道选择算法
//!
//! 输入是一个 (分组, 模型) 桶里的候选渠道 ID 列表和渠道映射，输出恰好一个
//! 渠道或者"无渠道"。算法分两步：先按重试次数定位优先级层，再在层内做
//! 平滑加权随机。纯 CPU 计算，不持有任何锁，注册表和降级模式共用同一份
//! 实现以保证语义一致。

use crate::errors::RouterError;
use crate::models::Channel;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use std::collections::HashMap;

/// 加权随机的平滑因子
///
/// 每个候选的抽签权重是 `weight + SMOOTHING_FACTOR`，权重为 0 的渠道
/// 因此仍有非零的被选概率。
pub const SMOOTHING_FACTOR: i64 = 10;

/// 模型名末尾的日期后缀（gpt-4o-2024-08-06 / gemini-pro-20240806 一类）
static DATE_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-(\d{4}-\d{2}-\d{2}|\d{8})$").expect("日期后缀正则不合法"));

/// 归一化模型名，用于精确名未命中时的二次查找
pub fn normalize_model_name(model: &str) -> String {
    DATE_SUFFIX.replace(model, "").into_owned()
}

/// 从候选列表中选出一个渠道
///
/// `retry` 表示第几次重试：0 命中最高优先级层，每多一次下降一层，超出
/// 层数时停在最低层，不回绕。候选 ID 在渠道映射里缺失是一致性错误，
/// 立即上浮，绝不静默跳过。
pub fn select_weighted(
    candidates: &[i64],
    channels: &HashMap<i64, Channel>,
    retry: usize,
) -> Result<Option<Channel>, RouterError> {
    if candidates.is_empty() {
        return Ok(None);
    }

    if candidates.len() == 1 {
        return match channels.get(&candidates[0]) {
            Some(channel) => Ok(Some(channel.clone())),
            None => Err(RouterError::Consistency {
                channel_id: candidates[0],
            }),
        };
    }

    let mut resolved = Vec::with_capacity(candidates.len());
    for id in candidates {
        let channel = channels
            .get(id)
            .ok_or(RouterError::Consistency { channel_id: *id })?;
        resolved.push(channel);
    }

    // 去重后的优先级层，降序
    let mut tiers: Vec<i64> = resolved.iter().map(|c| c.priority).collect();
    tiers.sort_unstable_by(|a, b| b.cmp(a));
    tiers.dedup();

    let target_priority = tiers[retry.min(tiers.len() - 1)];
    let tier: Vec<&Channel> = resolved
        .iter()
        .filter(|c| c.priority == target_priority)
        .copied()
        .collect();

    Ok(Some(draw_weighted(&tier).clone()))
}

/// 层内平滑加权随机
fn draw_weighted<'a>(tier: &[&'a Channel]) -> &'a Channel {
    let total: i64 = tier.iter().map(|c| draw_weight(c)).sum();
    let mut roll = rand::thread_rng().gen_range(0..total);

    for channel in tier {
        roll -= draw_weight(channel);
        if roll < 0 {
            return *channel;
        }
    }
    // roll < total 保证循环内必然返回
    tier[tier.len() - 1]
}

fn draw_weight(channel: &Channel) -> i64 {
    channel.weight.max(0) + SMOOTHING_FACTOR
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChannelInfo, ChannelStatus, ChannelType};
    use proptest::prelude::*;

    fn make_channel(id: i64, priority: i64, weight: i64) -> Channel {
        Channel {
            id,
            name: format!("channel-{id}"),
            key: "sk-test".to_string(),
            base_url: None,
            channel_type: ChannelType::OpenAI,
            group: "default".to_string(),
            models: "gpt-4".to_string(),
            priority,
            weight,
            status: ChannelStatus::Enabled,
            auto_ban: true,
            info: ChannelInfo::default(),
            created_at: 0,
            updated_at: 0,
        }
    }

    fn make_pool(specs: &[(i64, i64, i64)]) -> (Vec<i64>, HashMap<i64, Channel>) {
        let mut ids = Vec::new();
        let mut channels = HashMap::new();
        for (id, priority, weight) in specs {
            ids.push(*id);
            channels.insert(*id, make_channel(*id, *priority, *weight));
        }
        ids.sort_by_key(|id| std::cmp::Reverse(channels[id].priority));
        (ids, channels)
    }

    #[test]
    fn test_empty_candidates() {
        let channels = HashMap::new();
        assert!(select_weighted(&[], &channels, 0).unwrap().is_none());
    }

    #[test]
    fn test_single_candidate_returns_directly() {
        let (ids, channels) = make_pool(&[(1, 10, 0)]);
        let selected = select_weighted(&ids, &channels, 0).unwrap().unwrap();
        assert_eq!(selected.id, 1);
    }

    #[test]
    fn test_single_candidate_missing_is_consistency_error() {
        // 模拟桶和渠道映射漂移：桶里有 ID，映射里没有
        let channels = HashMap::new();
        let err = select_weighted(&[42], &channels, 0).unwrap_err();
        assert!(matches!(err, RouterError::Consistency { channel_id: 42 }));
    }

    #[test]
    fn test_missing_candidate_among_many_is_consistency_error() {
        let (mut ids, channels) = make_pool(&[(1, 10, 0), (2, 5, 0)]);
        ids.push(99);
        let err = select_weighted(&ids, &channels, 0).unwrap_err();
        assert!(matches!(err, RouterError::Consistency { channel_id: 99 }));
    }

    #[test]
    fn test_retry_descends_one_tier_at_a_time() {
        let (ids, channels) = make_pool(&[(1, 30, 0), (2, 20, 0), (3, 10, 0)]);

        for (retry, expected) in [(0, 1), (1, 2), (2, 3)] {
            let selected = select_weighted(&ids, &channels, retry).unwrap().unwrap();
            assert_eq!(selected.id, expected, "retry={retry}");
        }
    }

    #[test]
    fn test_retry_clamps_to_lowest_tier() {
        let (ids, channels) = make_pool(&[(1, 30, 0), (2, 10, 0)]);

        for retry in [2, 5, 100] {
            let selected = select_weighted(&ids, &channels, retry).unwrap().unwrap();
            assert_eq!(selected.id, 2, "retry={retry}");
        }
    }

    #[test]
    fn test_weighted_frequency_matches_declared_weights() {
        // 权重 0 和 90，平滑后抽签权重 10:100，期望约 9% / 91%
        let (ids, channels) = make_pool(&[(1, 10, 0), (2, 10, 90)]);

        let draws = 10_000;
        let mut hits_low = 0;
        for _ in 0..draws {
            let selected = select_weighted(&ids, &channels, 0).unwrap().unwrap();
            if selected.id == 1 {
                hits_low += 1;
            }
        }

        let freq = hits_low as f64 / draws as f64;
        let expected = 10.0 / 110.0;
        assert!(
            (freq - expected).abs() < 0.03,
            "权重 0 渠道的实测频率 {freq} 偏离期望 {expected}"
        );
        assert!(hits_low > 0, "权重 0 的渠道必须仍有被选概率");
    }

    #[test]
    fn test_normalize_model_name() {
        assert_eq!(normalize_model_name("gpt-4o-2024-08-06"), "gpt-4o");
        assert_eq!(normalize_model_name("gemini-pro-20240806"), "gemini-pro");
        assert_eq!(normalize_model_name("gpt-4"), "gpt-4");
        assert_eq!(normalize_model_name("claude-3-5-sonnet"), "claude-3-5-sonnet");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// *对任意*候选集和重试次数，选出的渠道必须属于候选集，且其优先级
        /// 等于重试次数对应的那一层，绝不会跨层或选出集合外的渠道。
        #[test]
        fn prop_selection_stays_in_target_tier(
            specs in prop::collection::vec((1i64..100, 0i64..5, 0i64..100), 1..20),
            retry in 0usize..8,
        ) {
            // 去重 ID，保留首个出现
            let mut seen = std::collections::HashSet::new();
            let specs: Vec<_> = specs
                .into_iter()
                .filter(|(id, _, _)| seen.insert(*id))
                .collect();

            let (ids, channels) = make_pool(&specs);
            let selected = select_weighted(&ids, &channels, retry).unwrap().unwrap();

            prop_assert!(ids.contains(&selected.id));

            let mut tiers: Vec<i64> = channels.values().map(|c| c.priority).collect();
            tiers.sort_unstable_by(|a, b| b.cmp(a));
            tiers.dedup();
            let expected_priority = tiers[retry.min(tiers.len() - 1)];
            prop_assert_eq!(selected.priority, expected_priority);
        }
    }
}
