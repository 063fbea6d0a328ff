use std::env;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use super::BoxError;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub workflow_db_path: PathBuf,
    pub sweep_interval: Duration,
    pub warehouse_reply_sla_hours: i64,
    pub cancel_retry_limit: u32,
    pub cancel_retry_base_delay: Duration,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, BoxError> {
        dotenvy::dotenv().ok();

        let host = env::var("CANCELLATION_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("CANCELLATION_SERVICE_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(9002);

        let workflow_db_path = resolve_path(env::var("WORKFLOW_DB_PATH").unwrap_or_else(|_| {
            default_runtime_root()
                .join("workflows.db")
                .to_string_lossy()
                .into_owned()
        }))?;

        let sweep_interval = env::var("SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|value| *value > 0)
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(60));
        let warehouse_reply_sla_hours = env::var("WAREHOUSE_REPLY_SLA_HOURS")
            .ok()
            .and_then(|value| value.parse::<i64>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(8);
        let cancel_retry_limit = env::var("CANCEL_RETRY_LIMIT")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(3);
        let cancel_retry_base_delay = env::var("CANCEL_RETRY_BASE_DELAY_MS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|value| *value > 0)
            .map(Duration::from_millis)
            .unwrap_or_else(|| Duration::from_secs(1));

        Ok(Self {
            host,
            port,
            workflow_db_path,
            sweep_interval,
            warehouse_reply_sla_hours,
            cancel_retry_limit,
            cancel_retry_base_delay,
        })
    }
}

fn default_runtime_root() -> PathBuf {
    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".cancellation-service").join("state")
}

fn resolve_path(raw: String) -> Result<PathBuf, io::Error> {
    let path = PathBuf::from(raw);
    if path.is_absolute() {
        Ok(path)
    } else {
        let cwd = env::current_dir()?;
        Ok(cwd.join(path))
    }
}
