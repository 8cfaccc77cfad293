// role-access/src/utils/error_helper.rs

//! エラーハンドリングの統一化ヘルパー
//!
//! コーデック・サービス層で共通して使用するエラー処理パターンを提供します。

use crate::error::AppError;
use tracing::{error, warn};
use validator::ValidationErrors;

// =============================================================================
// バリデーションエラー処理の統一
// =============================================================================

/// validatorのValidationErrorsをAppErrorに変換する統一処理
///
/// # Arguments
/// * `validation_errors` - validator crate からのバリデーションエラー
/// * `context` - エラーが発生したコンテキスト（ログ用）
pub fn convert_validation_errors(validation_errors: ValidationErrors, context: &str) -> AppError {
    warn!(
        context = %context,
        error_count = validation_errors.field_errors().len(),
        "Validation failed"
    );

    let mut errors: Vec<String> = validation_errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |error| {
                let message = error
                    .message
                    .as_ref()
                    .map_or_else(|| error.code.to_string(), |cow| cow.to_string());
                format!("{}: {}", field, message)
            })
        })
        .collect();
    errors.sort();

    AppError::ValidationErrors(errors)
}

/// 単一のバリデーションエラーメッセージを生成
pub fn validation_error(field: &str, message: &str) -> AppError {
    AppError::ValidationError(format!("{}: {}", field, message))
}

/// 蓄積したエラーメッセージをまとめて返す
///
/// 0件なら成功、1件なら `ValidationError`、複数件なら `ValidationErrors`。
pub fn collect_validation(errors: Vec<String>, context: &str) -> Result<(), AppError> {
    match errors.len() {
        0 => Ok(()),
        1 => {
            warn!(context = %context, error = %errors[0], "Validation failed");
            Err(AppError::ValidationError(errors[0].clone()))
        }
        n => {
            warn!(context = %context, error_count = n, "Validation failed");
            Err(AppError::ValidationErrors(errors))
        }
    }
}

// =============================================================================
// ログ付きエラー変換パターン
// =============================================================================

/// 内部エラーをログ付きで生成
pub fn internal_error<E: std::fmt::Display>(error: E, context: &str, message: &str) -> AppError {
    error!(
        error = %error,
        context = %context,
        "Internal error occurred"
    );
    AppError::Internal(message.to_string())
}

/// リソース未発見エラーをログ付きで生成
pub fn not_found_error(resource: &str, identifier: &str, context: &str) -> AppError {
    warn!(
        context = %context,
        resource = %resource,
        identifier = %identifier,
        "Resource not found"
    );
    AppError::NotFound(format!(
        "{} with identifier {} not found",
        resource, identifier
    ))
}

/// 競合エラーをログ付きで生成
pub fn conflict_error(message: &str, context: &str) -> AppError {
    warn!(
        context = %context,
        message = %message,
        "Resource conflict occurred"
    );
    AppError::Conflict(message.to_string())
}
