// role-access/src/service/role_service.rs

use crate::domain::catalog::PermissionCatalog;
use crate::domain::role_model::{Role, RoleDraft, RoleLink, RoleRecord};
use crate::error::{AppError, AppResult};
use crate::log_with_context;
use crate::repository::role_repository::RoleRepository;
use crate::service::deletion_guard::{can_delete, DeletionCheck};
use crate::service::permission_codec::PermissionCodec;
use crate::service::permission_notifier::{NotificationHandle, PermissionNotifier};
use crate::service::role_hierarchy::{build_forest, find_cycle_from, RoleForest};
use crate::utils::error_helper::{convert_validation_errors, not_found_error, validation_error};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

/// 更新結果（通知はバックグラウンドで進む）
pub struct RoleUpdate {
    pub role: Role,
    pub notification: Option<NotificationHandle>,
}

/// 削除結果
pub struct RoleDeletion {
    pub record: RoleRecord,
    pub notification: Option<NotificationHandle>,
}

/// ロールサービス
#[derive(Clone)]
pub struct RoleService {
    repository: Arc<dyn RoleRepository>,
    codec: PermissionCodec,
    notifier: Option<PermissionNotifier>,
}

impl RoleService {
    /// 新しいロールサービスを作成
    pub fn new(repository: Arc<dyn RoleRepository>, catalog: Arc<PermissionCatalog>) -> Self {
        Self {
            repository,
            codec: PermissionCodec::new(catalog),
            notifier: None,
        }
    }

    /// 更新・削除をセッションへ伝播する通知サービスを設定
    pub fn with_notifier(mut self, notifier: PermissionNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn codec(&self) -> &PermissionCodec {
        &self.codec
    }

    // --- 参照 ---

    /// すべてのロールを取得（権限はネスト表現に復元）
    pub async fn list_roles(&self) -> AppResult<Vec<Role>> {
        let records = self.repository.list().await?;
        records
            .iter()
            .map(|record| self.codec.from_record(record))
            .collect()
    }

    /// IDでロールを取得
    pub async fn get_role(&self, role_id: &str) -> AppResult<Role> {
        let record = self
            .repository
            .find_by_id(role_id)
            .await?
            .ok_or_else(|| not_found_error("Role", role_id, "role_service::get_role"))?;
        self.codec.from_record(&record)
    }

    /// 報告ツリーを構築（読み取りのたびに作り直す）
    pub async fn role_forest(&self) -> AppResult<RoleForest<Role>> {
        let roles = self.list_roles().await?;
        Ok(build_forest(&roles))
    }

    /// 削除可否のプレビュー
    pub async fn check_delete(&self, role_id: &str) -> AppResult<DeletionCheck> {
        let records = self.repository.list().await?;
        if !records.iter().any(|r| r.id == role_id) {
            return Err(not_found_error("Role", role_id, "role_service::check_delete"));
        }
        Ok(can_delete(role_id, &records))
    }

    // --- 書き込み ---

    /// 新しいロールを作成
    pub async fn create_role(&self, draft: RoleDraft) -> AppResult<Role> {
        draft
            .validate()
            .map_err(|e| convert_validation_errors(e, "role_service::create_role"))?;

        let role_id = draft
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let role = Role::from_draft(&role_id, draft);
        let record = self.codec.to_record(&role)?;

        let existing = self.repository.list().await?;
        if existing.iter().any(|r| r.id == role_id) {
            return Err(AppError::Conflict(format!("Role {} already exists", role_id)));
        }
        check_reporting_links(&record, existing)?;

        let stored = self.repository.insert(record).await?;
        let role = self.codec.from_record(&stored)?;

        info!(
            role_id = %role.id,
            role_name = %role.name,
            "Role created successfully"
        );

        Ok(role)
    }

    /// ロールを丸ごと置き換え、保持しているセッションへ伝播する
    ///
    /// 通知の失敗は更新結果に影響しない。
    pub async fn update_role(&self, role_id: &str, draft: RoleDraft) -> AppResult<RoleUpdate> {
        draft
            .validate()
            .map_err(|e| convert_validation_errors(e, "role_service::update_role"))?;

        if draft.id.as_deref().is_some_and(|id| id != role_id) {
            return Err(validation_error("id", "Role id cannot be changed"));
        }

        let existing = self.repository.list().await?;
        if !existing.iter().any(|r| r.id == role_id) {
            return Err(not_found_error("Role", role_id, "role_service::update_role"));
        }

        let role = Role::from_draft(role_id, draft);
        let record = self.codec.to_record(&role)?;
        check_reporting_links(&record, existing)?;

        let stored = self.repository.replace(record).await?;
        let role = self.codec.from_record(&stored)?;

        info!(
            role_id = %role.id,
            role_name = %role.name,
            "Role updated successfully"
        );

        let notification = match &self.notifier {
            Some(notifier) => Some(
                notifier
                    .notify_role_changed(&role.id, role.permissions.clone())
                    .await,
            ),
            None => None,
        };

        Ok(RoleUpdate { role, notification })
    }

    /// ロールを削除
    ///
    /// 直前に読み直した一覧でガードを評価してから、リポジトリの原子的な削除を呼ぶ。
    pub async fn delete_role(&self, role_id: &str) -> AppResult<RoleDeletion> {
        let existing = self.repository.list().await?;
        if !existing.iter().any(|r| r.id == role_id) {
            return Err(not_found_error("Role", role_id, "role_service::delete_role"));
        }

        if let Err(e) = can_delete(role_id, &existing).into_result(role_id) {
            warn!(role_id = %role_id, error = %e, "Role deletion blocked");
            return Err(e);
        }

        let record = self
            .repository
            .delete_if_no_subordinates(role_id)
            .await
            .inspect_err(|e| {
                warn!(role_id = %role_id, error = %e, "Role deletion rejected by repository");
            })?;

        info!(
            role_id = %record.id,
            role_name = %record.name,
            "Role deleted successfully"
        );

        let notification = match &self.notifier {
            Some(notifier) => Some(notifier.notify_role_deleted(role_id).await),
            None => None,
        };

        Ok(RoleDeletion {
            record,
            notification,
        })
    }
}

/// 書き込み前に報告先を検証（自己参照・未知のロール・循環）
fn check_reporting_links(record: &RoleRecord, existing: Vec<RoleRecord>) -> AppResult<()> {
    if record.reports_to_self() {
        warn!(role_id = %record.id, "Role cannot report to itself");
        return Err(validation_error(
            "reporting_ids",
            "A role cannot report to itself",
        ));
    }

    let mut candidate: Vec<RoleRecord> = existing
        .into_iter()
        .filter(|r| r.id != record.id)
        .collect();

    let unknown: Vec<&str> = record
        .reporting_ids
        .iter()
        .filter(|id| !candidate.iter().any(|r| r.id == id.as_str()))
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        return Err(validation_error(
            "reporting_ids",
            &format!("unknown role(s) {}", unknown.join(", ")),
        ));
    }

    candidate.push(record.clone());
    if let Some(path) = find_cycle_from(&record.id, &candidate) {
        log_with_context!(
            tracing::Level::WARN,
            "Reporting cycle rejected",
            "role_id" => &record.id,
            "path" => path.join(" -> ")
        );
        return Err(AppError::CycleDetected {
            role_id: record.id.clone(),
            path,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::permission::NestedPermissions;
    use crate::repository::role_repository::InMemoryRoleRepository;

    fn service() -> RoleService {
        RoleService::new(
            Arc::new(InMemoryRoleRepository::new()),
            PermissionCatalog::standard(),
        )
    }

    #[tokio::test]
    async fn test_create_generates_id_when_missing() {
        let service = service();
        let role = service.create_role(RoleDraft::new("Director")).await.unwrap();
        assert!(Uuid::parse_str(&role.id).is_ok());
        assert_eq!(service.get_role(&role.id).await.unwrap().name, "Director");
    }

    #[tokio::test]
    async fn test_create_rejects_self_report() {
        let service = service();
        let err = service
            .create_role(RoleDraft::new("Loop").with_id("A").reporting_to(["A"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_update_rejects_cycle() {
        let service = service();
        service
            .create_role(RoleDraft::new("A").with_id("A"))
            .await
            .unwrap();
        service
            .create_role(RoleDraft::new("B").with_id("B").reporting_to(["A"]))
            .await
            .unwrap();

        let err = service
            .update_role("A", RoleDraft::new("A").reporting_to(["B"]))
            .await
            .err()
            .unwrap();
        match err {
            AppError::CycleDetected { role_id, path } => {
                assert_eq!(role_id, "A");
                assert_eq!(path, vec!["A", "B", "A"]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_replaces_permissions_wholesale() {
        let service = service();
        let first: NestedPermissions = [("tasks", vec!["show", "add"]), ("leave", vec!["own"])]
            .into_iter()
            .collect();
        service
            .create_role(RoleDraft::new("Clerk").with_id("clerk").with_permissions(first))
            .await
            .unwrap();

        let second: NestedPermissions = [("tasks", vec!["show"])].into_iter().collect();
        let update = service
            .update_role("clerk", RoleDraft::new("Clerk").with_permissions(second.clone()))
            .await
            .unwrap();

        assert_eq!(update.role.permissions, second);
        assert!(update.notification.is_none());
    }
}
