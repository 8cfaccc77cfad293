// src/error.rs

use serde::Serialize;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Multiple validation errors")]
    ValidationErrors(Vec<String>),

    #[error("Reporting cycle detected for role {role_id}: {}", .path.join(" -> "))]
    CycleDetected { role_id: String, path: Vec<String> },

    #[error("Role {role_id} still has {subordinate_count} direct subordinate(s)")]
    DeleteBlocked {
        role_id: String,
        subordinate_count: usize,
        subordinate_names: Vec<String>,
    },

    #[error("Failed to deliver permission update to session {session_id} after {attempts} attempt(s): {reason}")]
    NotificationDeliveryFailure {
        session_id: String,
        attempts: u32,
        reason: String,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// エラー種別を表す安定した識別子
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::ValidationError(_) => "validation_error",
            AppError::ValidationErrors(_) => "validation_errors",
            AppError::CycleDetected { .. } => "cycle_detected",
            AppError::DeleteBlocked { .. } => "delete_blocked",
            AppError::NotificationDeliveryFailure { .. } => "notification_delivery_failure",
            AppError::Conflict(_) => "conflict",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// 書き込み前に拒否されるべき入力エラーかどうか
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::ValidationError(_)
                | AppError::ValidationErrors(_)
                | AppError::CycleDetected { .. }
        )
    }

    /// トランスポート層で共通に使えるエラーレスポンスへ変換
    pub fn to_error_response(&self) -> ErrorResponse {
        let message = self.to_string();
        let (details, errors) = match self {
            AppError::ValidationErrors(errors) => (
                None,
                Some(errors.iter().map(|e| json!({ "message": e })).collect()),
            ),
            AppError::CycleDetected { role_id, path } => {
                (Some(json!({ "role_id": role_id, "path": path })), None)
            }
            AppError::DeleteBlocked {
                role_id,
                subordinate_count,
                subordinate_names,
            } => (
                Some(json!({
                    "role_id": role_id,
                    "subordinate_count": subordinate_count,
                    "subordinate_names": subordinate_names,
                })),
                None,
            ),
            AppError::NotificationDeliveryFailure {
                session_id,
                attempts,
                ..
            } => (
                Some(json!({ "session_id": session_id, "attempts": attempts })),
                None,
            ),
            _ => (None, None),
        };

        // 内部エラーの詳細はクライアントに返さない
        let message = match self {
            AppError::Internal(_) => "An internal error occurred".to_string(),
            _ => message,
        };

        ErrorResponse {
            success: false,
            error: message.clone(),
            message,
            details,
            errors,
            error_type: self.error_type().to_string(),
        }
    }
}

// Result 型のエイリアス
pub type AppResult<T> = Result<T, AppError>;

/// 統一的なエラーレスポンス構造
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<serde_json::Value>>,
    pub error_type: String,
}
