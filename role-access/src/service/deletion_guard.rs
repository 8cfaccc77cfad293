// role-access/src/service/deletion_guard.rs

use crate::domain::role_model::RoleLink;
use crate::error::{AppError, AppResult};
use serde::Serialize;

/// 削除可否の判定結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeletionCheck {
    Allowed,
    Blocked {
        subordinate_count: usize,
        subordinate_names: Vec<String>,
    },
}

impl DeletionCheck {
    pub fn is_allowed(&self) -> bool {
        matches!(self, DeletionCheck::Allowed)
    }

    pub fn into_result(self, role_id: &str) -> AppResult<()> {
        match self {
            DeletionCheck::Allowed => Ok(()),
            DeletionCheck::Blocked {
                subordinate_count,
                subordinate_names,
            } => Err(AppError::DeleteBlocked {
                role_id: role_id.to_string(),
                subordinate_count,
                subordinate_names,
            }),
        }
    }
}

/// 直属の部下（`reporting_ids` のどこかに候補IDを含むロール）
pub fn subordinates_of<'a, R: RoleLink>(role_id: &str, roles: &'a [R]) -> Vec<&'a R> {
    roles
        .iter()
        .filter(|role| role.role_id() != role_id && role.reports_to(role_id))
        .collect()
}

/// ロールを削除してよいか判定
///
/// 主たる上長に限らず、報告先に一度でも挙がっていれば部下とみなす。
/// 呼び出し側はキャッシュしたフォレストではなく、直前に読み直した一覧を渡すこと。
pub fn can_delete<R: RoleLink>(role_id: &str, roles: &[R]) -> DeletionCheck {
    let subordinates = subordinates_of(role_id, roles);
    if subordinates.is_empty() {
        return DeletionCheck::Allowed;
    }
    DeletionCheck::Blocked {
        subordinate_count: subordinates.len(),
        subordinate_names: subordinates
            .iter()
            .map(|role| role.role_name().to_string())
            .collect(),
    }
}
