// tests/common/mod.rs
#![allow(dead_code)]

use async_trait::async_trait;
use role_access::domain::permission::NestedPermissions;
use role_access::domain::role_model::{Role, RoleDraft, RoleRecord};
use role_access::domain::session_model::PermissionEvent;
use role_access::error::AppResult;
use role_access::repository::role_repository::{InMemoryRoleRepository, RoleRepository};
use role_access::service::permission_notifier::{DeliveryError, SessionEventSink};
use std::sync::{Arc, Mutex, Once};

// テスト環境の初期化を一度だけ実行
static INIT: Once = Once::new();

/// テスト環境を初期化
pub fn init_test_env() {
    INIT.call_once(|| {
        dotenvy::from_filename(".env.test").ok();

        // テスト用のログ設定
        let _ = tracing_subscriber::fmt()
            .with_env_filter("role_access=debug")
            .with_test_writer()
            .try_init();
    });
}

/// `(キー, アクション)` の組からネスト表現を作成
pub fn nested(entries: Vec<(&str, Vec<&str>)>) -> NestedPermissions {
    let mut permissions = NestedPermissions::new();
    for (key, actions) in entries {
        permissions.set(key, actions);
    }
    permissions
}

pub fn role(id: &str, reports_to: &[&str]) -> Role {
    Role::new(id, &format!("Role {}", id)).with_reporting_ids(reports_to.iter().copied())
}

pub fn draft(id: &str, reports_to: &[&str]) -> RoleDraft {
    RoleDraft::new(&format!("Role {}", id))
        .with_id(id)
        .reporting_to(reports_to.iter().copied())
}

/// 受け取ったイベントを記録するだけのシンク
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<PermissionEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PermissionEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionEventSink for RecordingSink {
    async fn deliver(&self, event: &PermissionEvent) -> Result<(), DeliveryError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// 常に一時的なエラーを返すシンク
#[derive(Clone, Default)]
pub struct FailingSink {
    attempts: Arc<Mutex<u32>>,
}

impl FailingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> u32 {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl SessionEventSink for FailingSink {
    async fn deliver(&self, _event: &PermissionEvent) -> Result<(), DeliveryError> {
        *self.attempts.lock().unwrap() += 1;
        Err(DeliveryError::Transport("push gateway unavailable".to_string()))
    }
}

/// 一覧の取得直後に実行を譲るリポジトリ
///
/// 並行する書き込みが同じ古い一覧を見た状態を再現する。
#[derive(Clone, Default)]
pub struct YieldingRepository {
    inner: InMemoryRoleRepository,
}

#[async_trait]
impl RoleRepository for YieldingRepository {
    async fn list(&self) -> AppResult<Vec<RoleRecord>> {
        let snapshot = self.inner.list().await?;
        tokio::task::yield_now().await;
        Ok(snapshot)
    }

    async fn find_by_id(&self, role_id: &str) -> AppResult<Option<RoleRecord>> {
        self.inner.find_by_id(role_id).await
    }

    async fn insert(&self, record: RoleRecord) -> AppResult<RoleRecord> {
        self.inner.insert(record).await
    }

    async fn replace(&self, record: RoleRecord) -> AppResult<RoleRecord> {
        self.inner.replace(record).await
    }

    async fn delete_if_no_subordinates(&self, role_id: &str) -> AppResult<RoleRecord> {
        self.inner.delete_if_no_subordinates(role_id).await
    }
}
