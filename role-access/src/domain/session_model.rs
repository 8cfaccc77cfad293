// role-access/src/domain/session_model.rs
use crate::domain::permission::NestedPermissions;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 認証済みセッション（発行は外部の認証層が行う）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSession {
    pub session_id: String,
    pub user_id: String,
    /// セッションの実効ロール
    pub role_id: String,
    /// キャッシュ済みの権限スナップショット
    pub cached_permissions: Option<NestedPermissions>,
    pub cached_at: Option<DateTime<Utc>>,
    pub registered_at: DateTime<Utc>,
}

impl ActiveSession {
    pub fn new(session_id: &str, user_id: &str, role_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            role_id: role_id.to_string(),
            cached_permissions: None,
            cached_at: None,
            registered_at: Utc::now(),
        }
    }

    /// キャッシュが有効期限内か
    pub fn has_fresh_cache(&self, ttl: chrono::Duration) -> bool {
        match (&self.cached_permissions, self.cached_at) {
            (Some(_), Some(cached_at)) => Utc::now() - cached_at < ttl,
            _ => false,
        }
    }

    pub fn clear_cache(&mut self) {
        self.cached_permissions = None;
        self.cached_at = None;
    }
}

/// セッションへ送る権限イベントの種類
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PermissionEventKind {
    /// ロールの権限が更新された（新しい権限を同梱）
    PermissionsUpdated { permissions: NestedPermissions },
    /// ロールが削除された（再認証が必要）
    ReauthenticationRequired,
}

/// セッション単位の権限イベント
///
/// 配信は少なくとも1回（at-least-once）なので、受信側は `event_id` で重複を除去できる。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionEvent {
    pub event_id: Uuid,
    pub session_id: String,
    pub role_id: String,
    pub emitted_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: PermissionEventKind,
}

impl PermissionEvent {
    pub fn new(session_id: &str, role_id: &str, kind: PermissionEventKind) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            role_id: role_id.to_string(),
            emitted_at: Utc::now(),
            kind,
        }
    }

    pub fn permissions_updated(
        session_id: &str,
        role_id: &str,
        permissions: NestedPermissions,
    ) -> Self {
        Self::new(
            session_id,
            role_id,
            PermissionEventKind::PermissionsUpdated { permissions },
        )
    }

    pub fn reauthentication_required(session_id: &str, role_id: &str) -> Self {
        Self::new(
            session_id,
            role_id,
            PermissionEventKind::ReauthenticationRequired,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cache_freshness() {
        let mut session = ActiveSession::new("s-1", "u-1", "manager");
        assert!(!session.has_fresh_cache(chrono::Duration::minutes(5)));

        session.cached_permissions = Some(NestedPermissions::new());
        session.cached_at = Some(Utc::now());
        assert!(session.has_fresh_cache(chrono::Duration::minutes(5)));

        session.cached_at = Some(Utc::now() - chrono::Duration::minutes(10));
        assert!(!session.has_fresh_cache(chrono::Duration::minutes(5)));

        session.clear_cache();
        assert!(session.cached_permissions.is_none());
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = PermissionEvent::reauthentication_required("s-1", "manager");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "reauthentication_required");
        assert_eq!(json["session_id"], "s-1");

        let permissions: NestedPermissions =
            [("attendance", vec!["all"])].into_iter().collect();
        let event = PermissionEvent::permissions_updated("s-2", "manager", permissions);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "permissions_updated");
        assert_eq!(json["permissions"]["attendance"][0], "all");
    }
}
