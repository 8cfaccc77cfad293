// src/config.rs
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct NotifierConfig {
    /// 1セッションあたりの最大配信試行回数
    pub max_attempts: u32,
    /// リトライ間隔の基準値（試行回数に比例して伸びる）
    pub retry_backoff: Duration,
    /// 1回の配信試行の上限時間（超えたら一時的な失敗として扱う）
    pub delivery_timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct AccessConfig {
    pub notifier: NotifierConfig,
    /// セッションごとの権限スナップショットの有効期間
    pub session_cache_ttl: chrono::Duration,
    pub log_filter: String,
}

impl AccessConfig {
    pub fn from_env() -> Result<Self, String> {
        dotenv().ok(); // .env ファイルを読み込む (存在しなくてもエラーにしない)

        let max_attempts: u32 = env::var("ACCESS_NOTIFY_MAX_ATTEMPTS")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .map_err(|_| "Invalid ACCESS_NOTIFY_MAX_ATTEMPTS value")?;
        if max_attempts == 0 {
            return Err("ACCESS_NOTIFY_MAX_ATTEMPTS must be at least 1".to_string());
        }

        let backoff_ms: u64 = env::var("ACCESS_NOTIFY_RETRY_BACKOFF_MS")
            .unwrap_or_else(|_| "200".to_string())
            .parse()
            .map_err(|_| "Invalid ACCESS_NOTIFY_RETRY_BACKOFF_MS value")?;

        let timeout_ms: u64 = env::var("ACCESS_NOTIFY_TIMEOUT_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .map_err(|_| "Invalid ACCESS_NOTIFY_TIMEOUT_MS value")?;
        if timeout_ms == 0 {
            return Err("ACCESS_NOTIFY_TIMEOUT_MS must be at least 1".to_string());
        }

        let ttl_secs: i64 = env::var("ACCESS_SESSION_CACHE_TTL_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .map_err(|_| "Invalid ACCESS_SESSION_CACHE_TTL_SECS value")?;
        if ttl_secs < 0 {
            return Err("ACCESS_SESSION_CACHE_TTL_SECS must not be negative".to_string());
        }

        Ok(Self {
            notifier: NotifierConfig {
                max_attempts,
                retry_backoff: Duration::from_millis(backoff_ms),
                delivery_timeout: Duration::from_millis(timeout_ms),
            },
            session_cache_ttl: chrono::Duration::seconds(ttl_secs),
            log_filter: env::var("ACCESS_LOG_FILTER")
                .unwrap_or_else(|_| "role_access=info".to_string()),
        })
    }

    /// テスト用の設定を作成
    pub fn for_testing() -> Self {
        Self {
            notifier: NotifierConfig {
                max_attempts: 3,
                retry_backoff: Duration::from_millis(1),
                delivery_timeout: Duration::from_millis(200),
            },
            session_cache_ttl: chrono::Duration::minutes(5),
            log_filter: "role_access=debug".to_string(),
        }
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff: Duration::from_millis(200),
            delivery_timeout: Duration::from_secs(5),
        }
    }
}
