//! 渠道路由门面
//!
//! 中继处理器和管理子系统面对的统一入口。内部组合渠道注册表与健康熔断器，
//! 并负责启动时的首次重建和定时的后台同步。
//!
//! 选择本身不做内部重试：调用方在拿到渠道、调用上游失败后，自行带着
//! `retry + 1` 再来选下一层。

use crate::channel_health_service::ChannelHealthService;
use crate::notification_service::{LogNotifier, Notifier};
use relaycast_core::database::{dao::ChannelDao, lock_db, DbConnection};
use relaycast_core::routing::{normalize_model_name, select_weighted};
use relaycast_core::{
    Channel, ChannelRegistry, ChannelStatus, RouterConfig, RouterError, UpstreamError,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// "auto" 虚拟分组名
const AUTO_GROUP: &str = "auto";

/// 渠道路由服务
pub struct ChannelRouterService {
    db: DbConnection,
    registry: Arc<ChannelRegistry>,
    config: RouterConfig,
    health: ChannelHealthService,
}

impl ChannelRouterService {
    /// 创建路由服务，通知走日志
    pub fn new(db: DbConnection, config: RouterConfig) -> Self {
        Self::with_notifier(db, config, Arc::new(LogNotifier))
    }

    /// 创建路由服务并指定通知投递实现
    pub fn with_notifier(
        db: DbConnection,
        config: RouterConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let registry = Arc::new(ChannelRegistry::new());
        let health =
            ChannelHealthService::new(db.clone(), Arc::clone(&registry), &config, notifier);
        Self {
            db,
            registry,
            config,
            health,
        }
    }

    /// 内部注册表，管理端查询接口用
    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    /// 启动时调用：做第一次整体重建
    pub fn init(&self) -> Result<(), RouterError> {
        self.force_rebuild()
    }

    /// 从渠道存储整体重建注册表
    ///
    /// 存储读取完全在锁外进行，读取失败时当前快照原样继续服务。
    pub fn force_rebuild(&self) -> Result<(), RouterError> {
        if !self.config.memory_cache_enabled {
            return Ok(());
        }

        let channels = {
            let conn = lock_db(&self.db).map_err(RouterError::Database)?;
            ChannelDao::get_all(&conn).map_err(RouterError::Database)?
        };
        self.registry.rebuild(channels);

        let stats = self.registry.stats();
        tracing::info!(
            "渠道缓存已同步: 渠道 {} 个（启用 {}），路由桶 {} 个",
            stats.channel_count,
            stats.enabled_count,
            stats.bucket_count
        );
        Ok(())
    }

    /// 启动定时同步任务
    pub fn spawn_sync_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let period = Duration::from_secs(service.config.sync_frequency_secs.max(1));
            loop {
                tokio::time::sleep(period).await;
                tracing::debug!("开始定时同步渠道缓存");
                if let Err(e) = service.force_rebuild() {
                    // 本轮读取失败只记录，旧快照继续服务，下个周期重试
                    tracing::warn!("渠道缓存同步失败: {e}");
                }
            }
        })
    }

    /// 为 (分组, 模型, 重试次数) 选出一个渠道
    ///
    /// 返回选中的渠道和实际命中的分组："auto" 会被解析成自动分组序列里
    /// 第一个能给出渠道的真实分组，供下游计费/限流使用。
    pub fn select_channel(
        &self,
        group: &str,
        model: &str,
        retry: usize,
    ) -> Result<(Channel, String), RouterError> {
        if group == AUTO_GROUP {
            if self.config.auto_groups.is_empty() {
                return Err(RouterError::AutoGroupsDisabled);
            }
            for auto_group in &self.config.auto_groups {
                // 自动分组固定从最高优先级层尝试，不透传重试深度
                match self.plain_select(auto_group, model, 0)? {
                    Some(channel) => return Ok((channel, auto_group.clone())),
                    None => continue,
                }
            }
            return Err(RouterError::AutoGroupsExhausted {
                model: model.to_string(),
            });
        }

        match self.plain_select(group, model, retry)? {
            Some(channel) => Ok((channel, group.to_string())),
            None => Err(RouterError::NoAvailableChannel {
                group: group.to_string(),
                model: model.to_string(),
            }),
        }
    }

    /// 按 ID 读取渠道
    pub fn get_channel_by_id(&self, id: i64) -> Result<Channel, RouterError> {
        if self.config.memory_cache_enabled {
            return self
                .registry
                .get_channel(id)
                .ok_or(RouterError::ChannelNotFound { channel_id: id });
        }

        let conn = lock_db(&self.db).map_err(RouterError::Database)?;
        ChannelDao::get_by_id(&conn, id)
            .map_err(RouterError::Database)?
            .ok_or(RouterError::ChannelNotFound { channel_id: id })
    }

    /// 为一次请求解析渠道凭证
    pub fn resolve_credential(&self, channel: &Channel) -> Result<String, RouterError> {
        relaycast_core::routing::resolve_credential(channel)
    }

    /// 上报失败的上游调用，驱动熔断器禁用路径
    pub async fn report_failure(&self, channel: &Channel, err: &UpstreamError) {
        self.health.report_failure(channel, err).await;
    }

    /// 上报干净完成的上游调用，驱动熔断器恢复路径
    pub async fn report_success(&self, channel: &Channel) {
        self.health.report_success(channel).await;
    }

    /// 管理端：更新渠道状态
    ///
    /// 先落库再改内存，禁用立即从所有路由桶摘除。
    pub fn update_channel_status(
        &self,
        id: i64,
        status: ChannelStatus,
    ) -> Result<bool, RouterError> {
        let changed = {
            let conn = lock_db(&self.db).map_err(RouterError::Database)?;
            ChannelDao::update_status(&conn, id, status, None).map_err(RouterError::Database)?
        };
        if self.config.memory_cache_enabled {
            self.registry.update_channel_status(id, status);
        }
        Ok(changed)
    }

    /// 管理端：更新渠道字段
    pub fn update_channel(&self, channel: Channel) -> Result<bool, RouterError> {
        let changed = {
            let conn = lock_db(&self.db).map_err(RouterError::Database)?;
            ChannelDao::update(&conn, &channel).map_err(RouterError::Database)?
        };
        if self.config.memory_cache_enabled {
            self.registry.update_channel(channel);
        }
        Ok(changed)
    }

    fn plain_select(
        &self,
        group: &str,
        model: &str,
        retry: usize,
    ) -> Result<Option<Channel>, RouterError> {
        if self.config.memory_cache_enabled {
            self.registry.get_satisfied_channel(group, model, retry)
        } else {
            self.select_from_store(group, model, retry)
        }
    }

    /// 降级模式：跳过内存缓存，直接用存储里的启用渠道做同一套选择
    fn select_from_store(
        &self,
        group: &str,
        model: &str,
        retry: usize,
    ) -> Result<Option<Channel>, RouterError> {
        let channels = {
            let conn = lock_db(&self.db).map_err(RouterError::Database)?;
            ChannelDao::get_enabled(&conn).map_err(RouterError::Database)?
        };

        let pool: Vec<Channel> = channels
            .into_iter()
            .filter(|c| c.groups().contains(&group))
            .collect();

        let ids_for = |target: &str| -> Vec<i64> {
            pool.iter()
                .filter(|c| c.model_names().contains(&target))
                .map(|c| c.id)
                .collect()
        };

        let mut candidates = ids_for(model);
        if candidates.is_empty() {
            let normalized = normalize_model_name(model);
            if normalized != model {
                candidates = ids_for(&normalized);
            }
        }
        if candidates.is_empty() {
            return Ok(None);
        }

        let id_map: HashMap<i64, Channel> = pool.into_iter().map(|c| (c.id, c)).collect();
        select_weighted(&candidates, &id_map, retry)
    }
}
