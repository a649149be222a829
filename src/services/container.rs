//! Service construction and wiring.

use std::sync::Arc;

use tracing::info;

use crate::cache::{KvStore, MemoryKvStore, RedisKvStore};
use crate::config::{AppConfig, CacheBackend};
use crate::crawler::{Crawler, HttpCrawler};
use crate::database::{self, DbPool};
use crate::database::repositories::{JobRepository, SqlxJobRepository};
use crate::dispatch::DispatchService;
use crate::jobs::{JobService, LiveStatusCache};
use crate::scheduler::{
    DefaultPriorityStrategy, ResourceEstimator, TaskScheduler, UserResourceLimiter,
    WorkerResourceMonitor,
};
use crate::transport::PartitionedChannelTransport;
use crate::Result;

/// All constructed services, wired once at startup.
pub struct ServiceContainer {
    pub pool: DbPool,
    pub repository: Arc<dyn JobRepository>,
    pub kv: Arc<dyn KvStore>,
    pub live_status: Arc<LiveStatusCache>,
    pub scheduler: Arc<TaskScheduler>,
    pub transport: Arc<PartitionedChannelTransport>,
    pub job_service: Arc<JobService>,
    pub dispatch: Arc<DispatchService>,
}

impl ServiceContainer {
    /// Build the service graph from configuration.
    pub async fn build(config: &AppConfig) -> Result<Self> {
        let pool = database::init_pool(&config.database_url).await?;
        database::run_migrations(&pool).await?;

        let repository: Arc<dyn JobRepository> = Arc::new(SqlxJobRepository::new(pool.clone()));

        let kv: Arc<dyn KvStore> = match config.cache_backend {
            CacheBackend::Redis => Arc::new(RedisKvStore::connect(&config.redis_url).await?),
            CacheBackend::Memory => {
                info!("Using in-process KV store (single-node mode)");
                Arc::new(MemoryKvStore::new())
            }
        };

        let live_status = Arc::new(LiveStatusCache::new(kv.clone()));
        let monitor = Arc::new(WorkerResourceMonitor::new(kv.clone(), config.worker));
        let limiter = Arc::new(UserResourceLimiter::new(kv.clone(), config.user_limits));
        let estimator =
            ResourceEstimator::new(repository.clone(), config.scheduler.estimate_sample_size);
        let strategy = Arc::new(DefaultPriorityStrategy::new(config.user_limits));
        let scheduler = Arc::new(TaskScheduler::new(
            strategy,
            estimator,
            monitor.clone(),
            limiter.clone(),
        ));

        let transport = Arc::new(PartitionedChannelTransport::new(config.transport.partitions));
        let crawler: Arc<dyn Crawler> = Arc::new(HttpCrawler::new()?);

        let job_service = Arc::new(JobService::new(
            repository.clone(),
            live_status.clone(),
            transport.clone(),
        ));

        let dispatch = Arc::new(DispatchService::new(
            scheduler.clone(),
            transport.clone(),
            repository.clone(),
            live_status.clone(),
            monitor,
            limiter,
            crawler,
            config.scheduler,
        ));

        Ok(Self {
            pool,
            repository,
            kv,
            live_status,
            scheduler,
            transport,
            job_service,
            dispatch,
        })
    }
}
