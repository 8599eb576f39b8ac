use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use trestle_db::persistent::config::DbConfig;
use trestle_relayer::config::{MonitorConfig, QueueRetryConfig, WorkerConfig};

/// The configuration values that dictate the behavior of the relay node.
///
/// These values are operational rather than deployment-wide: two nodes pointed at
/// the same bridge can run with different values here and still agree on every
/// deposit. Deployment-wide values live in [`crate::params::Params`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Config {
    /// WebSocket URL of the source-side bridge node.
    pub source_rpc_url: String,

    /// WebSocket URL of the destination-side bridge node.
    pub dest_rpc_url: String,

    /// The directory to store all the data in.
    pub datadir: PathBuf,

    /// The RPC server addr for the relay node.
    pub rpc_addr: String,

    /// The number of tokio worker threads to use.
    pub num_threads: Option<u8>,

    /// The stack size per worker thread, in bytes.
    pub thread_stack_size: Option<usize>,

    /// How long to wait for in-flight work to wind down on shutdown.
    pub shutdown_timeout: Option<Duration>,

    /// The configuration for the sqlite3 database.
    pub db: DbConfig,

    /// The configuration for the deposit monitor.
    pub monitor: MonitorConfig,

    /// The configuration for the relay worker pool.
    pub worker: WorkerConfig,

    /// The redelivery policy of the durable job queue.
    pub queue: QueueRetryConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serde_toml() {
        let config = r#"
            source_rpc_url = "ws://localhost:8546"
            dest_rpc_url = "ws://localhost:9546"
            datadir = ".data"
            rpc_addr = "localhost:7546"
            num_threads = 4
            shutdown_timeout = { secs = 20, nanos = 0 }

            [db]
            max_retry_count = 3
            backoff_period = { secs = 1, nanos = 0 }

            [monitor]
            backfill_window = 200
            chunk_size = 50
            reconnect_base_delay = { secs = 1, nanos = 0 }
            reconnect_max_delay = { secs = 60, nanos = 0 }

            [worker]
            workers = 4
            poll_interval = { secs = 0, nanos = 500000000 }
            confirmation_poll_interval = { secs = 5, nanos = 0 }

            [queue]
            max_attempts = 5
            base_delay = { secs = 5, nanos = 0 }
        "#;

        let config = toml::from_str::<Config>(config);
        assert!(
            config.is_ok(),
            "must be able to deserialize config from toml but got: {}",
            config.unwrap_err()
        );

        let config = config.unwrap();
        assert_eq!(config.num_threads, Some(4));
        assert_eq!(config.thread_stack_size, None);
        assert_eq!(config.worker.workers, 4);

        let serialized = toml::to_string(&config).unwrap();
        let deserialized = toml::from_str::<Config>(&serialized).unwrap();
        assert_eq!(
            deserialized, config,
            "must be able to serialize and deserialize config to toml"
        );
    }
}
