//! 能力元组
//!
//! 能力是从渠道的分组/模型列表展开出来的 (分组, 模型, 渠道) 路由事实，
//! 只在注册表重建时派生，不持久化。

use super::channel::Channel;
use serde::{Deserialize, Serialize};

/// 一条派生的路由事实
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ability {
    /// 分组名
    pub group: String,
    /// 模型名
    pub model: String,
    /// 渠道 ID
    pub channel_id: i64,
}

impl Ability {
    /// 展开一个渠道的全部能力
    ///
    /// 只有启用状态的渠道会贡献能力，禁用渠道返回空列表。
    pub fn expand(channel: &Channel) -> Vec<Ability> {
        if !channel.is_enabled() {
            return Vec::new();
        }

        let mut abilities = Vec::new();
        for group in channel.groups() {
            for model in channel.model_names() {
                abilities.push(Ability {
                    group: group.to_string(),
                    model: model.to_string(),
                    channel_id: channel.id,
                });
            }
        }
        abilities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChannelInfo, ChannelStatus, ChannelType};

    fn make_channel(group: &str, models: &str, status: ChannelStatus) -> Channel {
        Channel {
            id: 7,
            name: "test".to_string(),
            key: "sk-test".to_string(),
            base_url: None,
            channel_type: ChannelType::OpenAI,
            group: group.to_string(),
            models: models.to_string(),
            priority: 0,
            weight: 0,
            status,
            auto_ban: true,
            info: ChannelInfo::default(),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_expand_cross_product() {
        let channel = make_channel("default,vip", "gpt-4,gpt-4o", ChannelStatus::Enabled);
        let abilities = Ability::expand(&channel);

        assert_eq!(abilities.len(), 4);
        assert!(abilities.contains(&Ability {
            group: "vip".to_string(),
            model: "gpt-4o".to_string(),
            channel_id: 7,
        }));
    }

    #[test]
    fn test_disabled_channel_expands_to_nothing() {
        let channel = make_channel("default", "gpt-4", ChannelStatus::AutoDisabled);
        assert!(Ability::expand(&channel).is_empty());
    }
}
