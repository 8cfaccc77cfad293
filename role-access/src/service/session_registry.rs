// role-access/src/service/session_registry.rs
//
// 認証済みセッションとその権限スナップショットの管理

use crate::domain::permission::NestedPermissions;
use crate::domain::session_model::ActiveSession;
use crate::error::AppResult;
use crate::log_with_context;
use crate::utils::error_helper::not_found_error;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// セッションレジストリ
///
/// セッションの発行は外部の認証層が行い、ここでは実効ロールとキャッシュだけを持つ。
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, ActiveSession>>>,
    cache_ttl: chrono::Duration,
}

impl SessionRegistry {
    pub fn new(cache_ttl: chrono::Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            cache_ttl,
        }
    }

    /// セッションを登録（同じIDがあれば置き換える）
    pub async fn register(&self, session: ActiveSession) {
        log_with_context!(
            tracing::Level::DEBUG,
            "Registering session",
            "session_id" => &session.session_id,
            "role_id" => &session.role_id
        );
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.session_id.clone(), session);
    }

    pub async fn unregister(&self, session_id: &str) -> Option<ActiveSession> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(session_id)
    }

    pub async fn get(&self, session_id: &str) -> Option<ActiveSession> {
        let sessions = self.sessions.read().await;
        sessions.get(session_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// 指定ロールを実効ロールとするセッションID（ソート済み）
    pub async fn sessions_for_role(&self, role_id: &str) -> Vec<String> {
        let sessions = self.sessions.read().await;
        let mut ids: Vec<String> = sessions
            .values()
            .filter(|s| s.role_id == role_id)
            .map(|s| s.session_id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// 権限スナップショットをキャッシュ
    pub async fn cache_permissions(
        &self,
        session_id: &str,
        permissions: NestedPermissions,
    ) -> AppResult<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(session_id).ok_or_else(|| {
            not_found_error(
                "Session",
                session_id,
                "session_registry::cache_permissions",
            )
        })?;
        session.cached_permissions = Some(permissions);
        session.cached_at = Some(Utc::now());
        Ok(())
    }

    /// 有効期限内のキャッシュを取得
    pub async fn cached_permissions(&self, session_id: &str) -> Option<NestedPermissions> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .filter(|s| s.has_fresh_cache(self.cache_ttl))
            .and_then(|s| s.cached_permissions.clone())
    }

    /// ロールを持つセッションのキャッシュを破棄し、対象セッションIDを返す
    pub async fn invalidate_role(&self, role_id: &str) -> Vec<String> {
        let mut sessions = self.sessions.write().await;
        let mut affected = Vec::new();
        for session in sessions.values_mut().filter(|s| s.role_id == role_id) {
            session.clear_cache();
            affected.push(session.session_id.clone());
        }
        affected.sort();

        log_with_context!(
            tracing::Level::DEBUG,
            "Invalidated cached permissions",
            "role_id" => role_id,
            "sessions" => affected.len()
        );
        affected
    }

    /// ロールを持つセッションを登録解除し、対象セッションIDを返す
    pub async fn revoke_role(&self, role_id: &str) -> Vec<String> {
        let mut sessions = self.sessions.write().await;
        let mut revoked: Vec<String> = sessions
            .values()
            .filter(|s| s.role_id == role_id)
            .map(|s| s.session_id.clone())
            .collect();
        revoked.sort();
        for session_id in &revoked {
            sessions.remove(session_id);
        }

        log_with_context!(
            tracing::Level::INFO,
            "Revoked sessions of deleted role",
            "role_id" => role_id,
            "sessions" => revoked.len()
        );
        revoked
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(chrono::Duration::minutes(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn registry_with_sessions() -> SessionRegistry {
        let registry = SessionRegistry::default();
        registry.register(ActiveSession::new("s-1", "u-1", "manager")).await;
        registry.register(ActiveSession::new("s-2", "u-2", "manager")).await;
        registry.register(ActiveSession::new("s-3", "u-3", "clerk")).await;
        registry
    }

    #[tokio::test]
    async fn test_sessions_for_role() {
        let registry = registry_with_sessions().await;
        assert_eq!(
            registry.sessions_for_role("manager").await,
            vec!["s-1".to_string(), "s-2".to_string()]
        );
        assert!(registry.sessions_for_role("nobody").await.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_only_touches_role() {
        let registry = registry_with_sessions().await;
        let permissions: NestedPermissions = [("tasks", vec!["show"])].into_iter().collect();
        for id in ["s-1", "s-3"] {
            registry
                .cache_permissions(id, permissions.clone())
                .await
                .unwrap();
        }

        let affected = registry.invalidate_role("manager").await;
        assert_eq!(affected, vec!["s-1".to_string(), "s-2".to_string()]);
        assert!(registry.cached_permissions("s-1").await.is_none());
        assert_eq!(registry.cached_permissions("s-3").await, Some(permissions));
    }

    #[tokio::test]
    async fn test_expired_cache_is_not_returned() {
        let registry = SessionRegistry::new(chrono::Duration::zero());
        registry.register(ActiveSession::new("s-1", "u-1", "manager")).await;
        registry
            .cache_permissions("s-1", NestedPermissions::new())
            .await
            .unwrap();
        assert!(registry.cached_permissions("s-1").await.is_none());
    }

    #[tokio::test]
    async fn test_revoke_role_removes_sessions() {
        let registry = registry_with_sessions().await;
        let revoked = registry.revoke_role("manager").await;
        assert_eq!(revoked.len(), 2);
        assert_eq!(registry.len().await, 1);
        assert!(registry.get("s-3").await.is_some());

        assert!(registry.unregister("s-3").await.is_some());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_cache_for_unknown_session_fails() {
        let registry = SessionRegistry::default();
        let result = registry
            .cache_permissions("missing", NestedPermissions::new())
            .await;
        assert!(result.is_err());
    }
}
