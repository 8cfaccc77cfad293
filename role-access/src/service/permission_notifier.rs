// role-access/src/service/permission_notifier.rs
//
// ロール更新・削除を対象セッションへ即時に伝播する
// 配信はロール更新の呼び出し経路をブロックしない（fire-and-forget）

use crate::config::NotifierConfig;
use crate::domain::permission::NestedPermissions;
use crate::domain::session_model::PermissionEvent;
use crate::error::{AppError, AppResult};
use crate::log_with_context;
use crate::service::session_registry::SessionRegistry;
use crate::utils::error_helper::internal_error;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio::task::{JoinHandle, JoinSet};

/// 1回の配信の失敗理由
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("session is not connected")]
    SessionGone,

    #[error("event channel is closed")]
    ChannelClosed,

    #[error("event channel is full")]
    Backpressure,

    #[error("transport error: {0}")]
    Transport(String),
}

impl DeliveryError {
    /// 再試行で回復しうるか
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeliveryError::Backpressure | DeliveryError::Transport(_))
    }
}

/// セッションへのイベント配信先（プッシュ通知の実装を差し替えられるようにする）
#[async_trait]
pub trait SessionEventSink: Send + Sync {
    async fn deliver(&self, event: &PermissionEvent) -> Result<(), DeliveryError>;
}

/// プロセス内のチャネルで配信する実装
pub struct ChannelEventSink {
    senders: RwLock<HashMap<String, mpsc::Sender<PermissionEvent>>>,
    capacity: usize,
}

impl ChannelEventSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            senders: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// セッションの受信側を作成（既存の購読は置き換える）
    pub async fn subscribe(&self, session_id: &str) -> mpsc::Receiver<PermissionEvent> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.senders.write().await.insert(session_id.to_string(), tx);
        rx
    }

    pub async fn unsubscribe(&self, session_id: &str) {
        self.senders.write().await.remove(session_id);
    }
}

impl Default for ChannelEventSink {
    fn default() -> Self {
        Self::new(16)
    }
}

#[async_trait]
impl SessionEventSink for ChannelEventSink {
    async fn deliver(&self, event: &PermissionEvent) -> Result<(), DeliveryError> {
        let senders = self.senders.read().await;
        let sender = senders
            .get(&event.session_id)
            .ok_or(DeliveryError::SessionGone)?;
        sender.try_send(event.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::ChannelClosed,
        })
    }
}

/// セッションごとの配信結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryOutcome {
    pub session_id: String,
    pub event_id: uuid::Uuid,
    pub attempts: u32,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 1回の通知全体の結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationReport {
    pub role_id: String,
    pub outcomes: Vec<DeliveryOutcome>,
}

impl NotificationReport {
    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.delivered).count()
    }

    pub fn failures(&self) -> Vec<&DeliveryOutcome> {
        self.outcomes.iter().filter(|o| !o.delivered).collect()
    }
}

/// バックグラウンドで進む通知のハンドル
///
/// 待つ必要がなければ破棄してよい（タスクは動き続ける）。
pub struct NotificationHandle {
    pub role_id: String,
    pub affected_sessions: Vec<String>,
    task: JoinHandle<NotificationReport>,
}

impl NotificationHandle {
    /// 配信完了まで待って結果を取得
    pub async fn wait(self) -> AppResult<NotificationReport> {
        self.task.await.map_err(|e| {
            internal_error(
                e,
                "permission_notifier::wait",
                "Notification task did not complete",
            )
        })
    }
}

/// 権限変更の伝播サービス
#[derive(Clone)]
pub struct PermissionNotifier {
    registry: SessionRegistry,
    sink: Arc<dyn SessionEventSink>,
    config: NotifierConfig,
}

impl PermissionNotifier {
    pub fn new(
        registry: SessionRegistry,
        sink: Arc<dyn SessionEventSink>,
        config: NotifierConfig,
    ) -> Self {
        Self {
            registry,
            sink,
            config,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// ロールの権限更新を伝播
    ///
    /// 対象セッションのキャッシュを破棄してから、新しい権限を載せたイベントを
    /// セッションごとに1件ずつ送る。配信はバックグラウンドで行い、失敗は記録するだけ。
    pub async fn notify_role_changed(
        &self,
        role_id: &str,
        permissions: NestedPermissions,
    ) -> NotificationHandle {
        let affected = self.registry.invalidate_role(role_id).await;
        let events = affected
            .iter()
            .map(|session_id| {
                PermissionEvent::permissions_updated(session_id, role_id, permissions.clone())
            })
            .collect();

        log_with_context!(
            tracing::Level::INFO,
            "Propagating role permission change",
            "role_id" => role_id,
            "sessions" => affected.len()
        );

        self.dispatch(role_id, affected, events)
    }

    /// ロール削除を伝播（対象セッションは登録解除し、再認証を要求する）
    pub async fn notify_role_deleted(&self, role_id: &str) -> NotificationHandle {
        let revoked = self.registry.revoke_role(role_id).await;
        let events = revoked
            .iter()
            .map(|session_id| PermissionEvent::reauthentication_required(session_id, role_id))
            .collect();

        log_with_context!(
            tracing::Level::INFO,
            "Requesting re-authentication for deleted role",
            "role_id" => role_id,
            "sessions" => revoked.len()
        );

        self.dispatch(role_id, revoked, events)
    }

    fn dispatch(
        &self,
        role_id: &str,
        affected_sessions: Vec<String>,
        events: Vec<PermissionEvent>,
    ) -> NotificationHandle {
        let sink = self.sink.clone();
        let config = self.config.clone();
        let report_role_id = role_id.to_string();

        let task = tokio::spawn(async move {
            let mut deliveries = JoinSet::new();
            for event in events {
                deliveries.spawn(deliver_with_retry(sink.clone(), event, config.clone()));
            }

            let mut outcomes = Vec::new();
            while let Some(joined) = deliveries.join_next().await {
                match joined {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(e) => log_with_context!(
                        tracing::Level::ERROR,
                        "Delivery task aborted",
                        "role_id" => &report_role_id,
                        "error" => e.to_string()
                    ),
                }
            }
            outcomes.sort_by(|a, b| a.session_id.cmp(&b.session_id));

            NotificationReport {
                role_id: report_role_id,
                outcomes,
            }
        });

        NotificationHandle {
            role_id: role_id.to_string(),
            affected_sessions,
            task,
        }
    }
}

/// 上限回数まで線形バックオフで再試行する
async fn deliver_with_retry(
    sink: Arc<dyn SessionEventSink>,
    event: PermissionEvent,
    config: NotifierConfig,
) -> DeliveryOutcome {
    let max_attempts = config.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;
        let result = tokio::time::timeout(config.delivery_timeout, sink.deliver(&event))
            .await
            .unwrap_or_else(|_| {
                Err(DeliveryError::Transport(format!(
                    "delivery timed out after {:?}",
                    config.delivery_timeout
                )))
            });
        let error = match result {
            Ok(()) => {
                log_with_context!(
                    tracing::Level::DEBUG,
                    "Permission event delivered",
                    "session_id" => &event.session_id,
                    "event_id" => event.event_id,
                    "attempts" => attempts
                );
                return DeliveryOutcome {
                    session_id: event.session_id,
                    event_id: event.event_id,
                    attempts,
                    delivered: true,
                    error: None,
                };
            }
            Err(e) => e,
        };

        if error.is_retryable() && attempts < max_attempts {
            log_with_context!(
                tracing::Level::WARN,
                "Permission event delivery failed, retrying",
                "session_id" => &event.session_id,
                "attempt" => attempts,
                "error" => error.to_string()
            );
            tokio::time::sleep(config.retry_backoff * attempts).await;
            continue;
        }

        let failure = AppError::NotificationDeliveryFailure {
            session_id: event.session_id.clone(),
            attempts,
            reason: error.to_string(),
        };
        log_with_context!(
            tracing::Level::ERROR,
            "Permission event was not delivered",
            "error_type" => failure.error_type(),
            "role_id" => &event.role_id,
            "error" => failure.to_string()
        );

        return DeliveryOutcome {
            session_id: event.session_id,
            event_id: event.event_id,
            attempts,
            delivered: false,
            error: Some(failure.to_string()),
        };
    }
}
