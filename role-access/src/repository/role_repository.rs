// role-access/src/repository/role_repository.rs

use crate::domain::role_model::{RoleLink, RoleRecord};
use crate::error::{AppError, AppResult};
use crate::log_with_context;
use crate::service::deletion_guard::can_delete;
use crate::service::role_hierarchy::find_cycle_from;
use crate::utils::error_helper::{conflict_error, not_found_error};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// ロールの永続化層との境界
///
/// 実装は次の検査を書き込みと同じ原子的な操作の中で行うこと（条件付き書き込みなど）。
///
/// - `insert` / `replace`: 報告先がすべて存在し、書き込み後の一覧に循環がないこと
/// - `delete_if_no_subordinates`: 削除対象を報告先に持つロールがないこと
#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// 全ロールのスナップショット
    async fn list(&self) -> AppResult<Vec<RoleRecord>>;

    async fn find_by_id(&self, role_id: &str) -> AppResult<Option<RoleRecord>>;

    /// 新規作成（同じIDがあれば `Conflict`、循環ができるなら `CycleDetected`）
    async fn insert(&self, record: RoleRecord) -> AppResult<RoleRecord>;

    /// 丸ごと置き換え（存在しなければ `NotFound`、循環ができるなら `CycleDetected`）
    async fn replace(&self, record: RoleRecord) -> AppResult<RoleRecord>;

    /// 部下がいなければ削除し、削除したロールを返す
    async fn delete_if_no_subordinates(&self, role_id: &str) -> AppResult<RoleRecord>;
}

/// メモリ上の実装（組み込み・テスト用）
#[derive(Clone, Default)]
pub struct InMemoryRoleRepository {
    roles: Arc<RwLock<Vec<RoleRecord>>>,
}

impl InMemoryRoleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_roles(roles: Vec<RoleRecord>) -> Self {
        Self {
            roles: Arc::new(RwLock::new(roles)),
        }
    }
}

fn ensure_managers_exist(record: &RoleRecord, roles: &[RoleRecord]) -> AppResult<()> {
    let missing: Vec<&str> = record
        .reporting_ids()
        .iter()
        .filter(|id| !roles.iter().any(|r| &r.id == *id))
        .map(String::as_str)
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(AppError::ValidationError(format!(
        "reporting_ids: unknown role(s) {}",
        missing.join(", ")
    )))
}

/// 書き込み後の一覧を組み立て、そこに `record` を通る循環がないことを確認
fn ensure_acyclic(record: &RoleRecord, roles: &[RoleRecord], context: &str) -> AppResult<()> {
    let candidate: Vec<RoleRecord> = roles
        .iter()
        .filter(|r| r.id != record.id)
        .cloned()
        .chain(std::iter::once(record.clone()))
        .collect();

    match find_cycle_from(&record.id, &candidate) {
        None => Ok(()),
        Some(path) => {
            log_with_context!(
                tracing::Level::WARN,
                "Reporting cycle rejected at write time",
                "context" => context,
                "role_id" => &record.id,
                "path" => path.join(" -> ")
            );
            Err(AppError::CycleDetected {
                role_id: record.id.clone(),
                path,
            })
        }
    }
}

#[async_trait]
impl RoleRepository for InMemoryRoleRepository {
    async fn list(&self) -> AppResult<Vec<RoleRecord>> {
        Ok(self.roles.read().await.clone())
    }

    async fn find_by_id(&self, role_id: &str) -> AppResult<Option<RoleRecord>> {
        let roles = self.roles.read().await;
        Ok(roles.iter().find(|r| r.id == role_id).cloned())
    }

    async fn insert(&self, record: RoleRecord) -> AppResult<RoleRecord> {
        let mut roles = self.roles.write().await;
        if roles.iter().any(|r| r.id == record.id) {
            return Err(conflict_error(
                &format!("Role {} already exists", record.id),
                "role_repository::insert",
            ));
        }
        ensure_managers_exist(&record, &roles)?;
        ensure_acyclic(&record, &roles, "role_repository::insert")?;
        roles.push(record.clone());
        Ok(record)
    }

    async fn replace(&self, record: RoleRecord) -> AppResult<RoleRecord> {
        let mut roles = self.roles.write().await;
        ensure_managers_exist(&record, &roles)?;
        if !roles.iter().any(|r| r.id == record.id) {
            return Err(not_found_error("Role", &record.id, "role_repository::replace"));
        }
        ensure_acyclic(&record, &roles, "role_repository::replace")?;
        let slot = roles
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or_else(|| not_found_error("Role", &record.id, "role_repository::replace"))?;
        *slot = record.clone();
        Ok(record)
    }

    async fn delete_if_no_subordinates(&self, role_id: &str) -> AppResult<RoleRecord> {
        // 判定と削除を同じ書き込みロックの中で行う
        let mut roles = self.roles.write().await;
        let position = roles.iter().position(|r| r.id == role_id).ok_or_else(|| {
            not_found_error("Role", role_id, "role_repository::delete_if_no_subordinates")
        })?;
        can_delete(role_id, &roles).into_result(role_id)?;
        Ok(roles.remove(position))
    }
}
