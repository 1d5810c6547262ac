//! Node configuration loaded from environment variables.

use std::path::PathBuf;

use terranode_engine::EngineMode;
use terranode_pipeline::TestHooks;

/// Server and pipeline configuration.
///
/// All fields have defaults suitable for local development; production
/// deployments override via environment variables.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Root directory for task working directories.
    pub data_root: PathBuf,
    /// Tool execution mode: `live` or `replay`.
    pub engine_mode: EngineMode,
    /// Directory the reconstruction engine runs from.
    pub engine_dir: Option<PathBuf>,
    /// `LD_LIBRARY_PATH` override for the bundled tools.
    pub tool_lib_dir: Option<PathBuf>,
    /// S3 bucket for artifact uploads; storage is disabled when unset.
    pub s3_bucket: Option<String>,
    /// S3 region (default: `us-east-1`).
    pub s3_region: String,
    /// Custom S3 endpoint for compatible services.
    pub s3_endpoint: Option<String>,
    /// Remote key prefix for standalone-task uploads.
    pub storage_prefix: String,
    /// Deterministic test-only pipeline stages.
    pub hooks: TestHooks,
}

impl NodeConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default          |
    /// |------------------------|------------------|
    /// | `HOST`                 | `0.0.0.0`        |
    /// | `PORT`                 | `3000`           |
    /// | `CORS_ORIGINS`         | (empty)          |
    /// | `REQUEST_TIMEOUT_SECS` | `30`             |
    /// | `DATA_ROOT`            | `./data`         |
    /// | `ENGINE_MODE`          | `live`           |
    /// | `ENGINE_DIR`           | (unset)          |
    /// | `TOOL_LIB_DIR`         | (unset)          |
    /// | `S3_BUCKET`            | (unset)          |
    /// | `S3_REGION`            | `us-east-1`      |
    /// | `S3_ENDPOINT`          | (unset)          |
    /// | `STORAGE_PREFIX`       | `tasks`          |
    /// | `TEST_SLEEP_MILLIS`    | (unset)          |
    /// | `TEST_FAIL`            | `false`          |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let data_root =
            PathBuf::from(std::env::var("DATA_ROOT").unwrap_or_else(|_| "./data".into()));

        let engine_mode = EngineMode::from_str(
            &std::env::var("ENGINE_MODE").unwrap_or_else(|_| "live".into()),
        )
        .expect("ENGINE_MODE must be 'live' or 'replay'");

        let hooks = TestHooks {
            sleep_millis: std::env::var("TEST_SLEEP_MILLIS")
                .ok()
                .map(|v| v.parse().expect("TEST_SLEEP_MILLIS must be a valid u64")),
            fail: std::env::var("TEST_FAIL")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        };

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            data_root,
            engine_mode,
            engine_dir: std::env::var("ENGINE_DIR").ok().map(PathBuf::from),
            tool_lib_dir: std::env::var("TOOL_LIB_DIR").ok().map(PathBuf::from),
            s3_bucket: std::env::var("S3_BUCKET").ok().filter(|s| !s.is_empty()),
            s3_region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into()),
            s3_endpoint: std::env::var("S3_ENDPOINT").ok().filter(|s| !s.is_empty()),
            storage_prefix: std::env::var("STORAGE_PREFIX").unwrap_or_else(|_| "tasks".into()),
            hooks,
        }
    }
}
