//! Application configuration.
//!
//! Every tunable has a default matching the documented operational
//! defaults; environment variables override them at startup.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Worker-cluster capacity configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WorkerResourceConfig {
    /// Number of worker instances in the cluster.
    pub total_instances: u32,
    /// Maximum crawl threads per instance.
    pub max_threads_per_instance: u32,
}

impl WorkerResourceConfig {
    /// Total crawl threads across the cluster.
    pub fn total_threads(&self) -> u32 {
        self.total_instances * self.max_threads_per_instance
    }
}

impl Default for WorkerResourceConfig {
    fn default() -> Self {
        Self {
            total_instances: 1,
            max_threads_per_instance: 10,
        }
    }
}

/// Per-user resource limits over a sliding window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UserResourceLimitConfig {
    /// Window length in seconds; doubles as the TTL of the per-user counters.
    pub time_window_secs: u64,
    /// Maximum concurrent crawl threads a user may hold within the window.
    pub max_threads_per_window: i64,
    /// Maximum jobs a user may start within the window.
    pub max_jobs_per_window: i64,
}

impl Default for UserResourceLimitConfig {
    fn default() -> Self {
        Self {
            time_window_secs: 3600,
            max_threads_per_window: 50,
            max_jobs_per_window: 10,
        }
    }
}

/// Scheduler loop intervals.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Dispatch tick interval in milliseconds.
    pub dispatch_interval_ms: u64,
    /// Resource-utilisation logging interval in milliseconds.
    pub stats_interval_ms: u64,
    /// Number of recently completed jobs sampled by the estimator.
    pub estimate_sample_size: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            dispatch_interval_ms: 2000,
            stats_interval_ms: 300_000,
            estimate_sample_size: 100,
        }
    }
}

/// Work-queue transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Topic the task records are published to.
    pub topic: String,
    /// Partition count; messages are keyed by job id.
    pub partitions: usize,
    /// Consumer group identifier.
    pub consumer_group: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            topic: "crawler-job-topic".to_string(),
            partitions: 3,
            consumer_group: "crawld-workers".to_string(),
        }
    }
}

/// Backend selection for the shared key-value store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Shared Redis instance; required for multi-process deployments.
    Redis,
    /// Process-local store; single-node runs and tests.
    Memory,
}

/// API server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiServerConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub redis_url: String,
    pub cache_backend: CacheBackend,
    pub worker: WorkerResourceConfig,
    pub user_limits: UserResourceLimitConfig,
    pub scheduler: SchedulerConfig,
    pub transport: TransportConfig,
    pub api: ApiServerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:crawld.db?mode=rwc".to_string(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            cache_backend: CacheBackend::Redis,
            worker: WorkerResourceConfig::default(),
            user_limits: UserResourceLimitConfig::default(),
            scheduler: SchedulerConfig::default(),
            transport: TransportConfig::default(),
            api: ApiServerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database_url = url;
        }
        if let Ok(url) = std::env::var("REDIS_URL") {
            config.redis_url = url;
        }
        if let Ok(backend) = std::env::var("CRAWLD_CACHE_BACKEND") {
            config.cache_backend = match backend.to_ascii_lowercase().as_str() {
                "redis" => CacheBackend::Redis,
                "memory" => CacheBackend::Memory,
                other => {
                    return Err(Error::config(format!(
                        "unknown cache backend '{other}' (expected 'redis' or 'memory')"
                    )));
                }
            };
        }

        config.worker.total_instances =
            env_parse("CRAWLD_WORKER_TOTAL_INSTANCES", config.worker.total_instances)?;
        config.worker.max_threads_per_instance = env_parse(
            "CRAWLD_WORKER_MAX_THREADS_PER_INSTANCE",
            config.worker.max_threads_per_instance,
        )?;

        config.user_limits.time_window_secs = env_parse(
            "CRAWLD_USER_LIMIT_TIME_WINDOW_SECS",
            config.user_limits.time_window_secs,
        )?;
        config.user_limits.max_threads_per_window = env_parse(
            "CRAWLD_USER_LIMIT_MAX_THREADS_PER_WINDOW",
            config.user_limits.max_threads_per_window,
        )?;
        config.user_limits.max_jobs_per_window = env_parse(
            "CRAWLD_USER_LIMIT_MAX_JOBS_PER_WINDOW",
            config.user_limits.max_jobs_per_window,
        )?;

        config.scheduler.dispatch_interval_ms = env_parse(
            "CRAWLD_DISPATCH_INTERVAL_MS",
            config.scheduler.dispatch_interval_ms,
        )?;
        config.scheduler.stats_interval_ms =
            env_parse("CRAWLD_STATS_INTERVAL_MS", config.scheduler.stats_interval_ms)?;

        if let Ok(topic) = std::env::var("CRAWLD_TRANSPORT_TOPIC") {
            config.transport.topic = topic;
        }
        config.transport.partitions =
            env_parse("CRAWLD_TRANSPORT_PARTITIONS", config.transport.partitions)?;
        if let Ok(group) = std::env::var("CRAWLD_TRANSPORT_CONSUMER_GROUP") {
            config.transport.consumer_group = group;
        }

        if let Ok(addr) = std::env::var("CRAWLD_API_BIND_ADDRESS") {
            config.api.bind_address = addr;
        }
        config.api.port = env_parse("CRAWLD_API_PORT", config.api.port)?;

        Ok(config)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| Error::config(format!("invalid value for {name}: '{raw}'"))),
        Err(_) => Ok(default),
    }
}
