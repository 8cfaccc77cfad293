// role-access/src/domain/role_model.rs
use crate::domain::permission::NestedPermissions;
use crate::domain::wire::WirePermission;
use crate::utils::validation::{validate_not_blank, validate_unique_ids};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// 階層構築・削除ガードが必要とするロールの最小限の情報
///
/// ネスト表現の [`Role`] と永続化形式の [`RoleRecord`] の両方が実装する。
pub trait RoleLink {
    fn role_id(&self) -> &str;
    fn role_name(&self) -> &str;
    /// 報告先ロールID（先頭が主たる上長）
    fn reporting_ids(&self) -> &[String];

    /// 主たる上長（`reporting_ids` の先頭）
    fn primary_manager_id(&self) -> Option<&str> {
        self.reporting_ids().first().map(String::as_str)
    }

    /// 指定ロールに報告しているか（主たる上長に限らない）
    fn reports_to(&self, manager_id: &str) -> bool {
        self.reporting_ids().iter().any(|id| id == manager_id)
    }

    /// 自分自身を報告先に含んでいるか（書き込み時に拒否すべき状態）
    fn reports_to_self(&self) -> bool {
        self.reports_to(self.role_id())
    }
}

/// ロール（ネストした権限表現を持つ）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department_id: Option<String>,
    #[serde(default)]
    pub reporting_ids: Vec<String>,
    #[serde(default)]
    pub permissions: NestedPermissions,
}

impl Role {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            department_id: None,
            reporting_ids: Vec::new(),
            permissions: NestedPermissions::new(),
        }
    }

    pub fn with_reporting_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reporting_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_permissions(mut self, permissions: NestedPermissions) -> Self {
        self.permissions = permissions;
        self
    }

    /// 下書きから作成（権限は丸ごと置き換え）
    pub fn from_draft(id: &str, draft: RoleDraft) -> Self {
        Self {
            id: id.to_string(),
            name: draft.name.trim().to_string(),
            description: draft.description,
            department_id: draft.department_id,
            reporting_ids: draft.reporting_ids,
            permissions: draft.permissions,
        }
    }

    /// トップレベル（報告先なし）かどうか
    pub fn is_top_level(&self) -> bool {
        self.reporting_ids.is_empty()
    }
}

impl RoleLink for Role {
    fn role_id(&self) -> &str {
        &self.id
    }

    fn role_name(&self) -> &str {
        &self.name
    }

    fn reporting_ids(&self) -> &[String] {
        &self.reporting_ids
    }
}

/// 永続化・送信用のロール（フラットな権限レコードを持つ）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department_id: Option<String>,
    #[serde(default)]
    pub reporting_ids: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<WirePermission>,
}

impl RoleLink for RoleRecord {
    fn role_id(&self) -> &str {
        &self.id
    }

    fn role_name(&self) -> &str {
        &self.name
    }

    fn reporting_ids(&self) -> &[String] {
        &self.reporting_ids
    }
}

/// ロール作成・更新の入力
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct RoleDraft {
    /// 作成時のみ使用。省略時はUUIDを採番する
    #[serde(default)]
    #[validate(length(min = 1, max = 64, message = "Role id must be 1-64 characters"))]
    pub id: Option<String>,

    #[validate(
        length(min = 1, max = 100, message = "Role name must be 1-100 characters"),
        custom(function = validate_not_blank, message = "Role name must not be blank")
    )]
    pub name: String,

    #[serde(default)]
    #[validate(length(max = 500, message = "Description must be at most 500 characters"))]
    pub description: Option<String>,

    #[serde(default)]
    pub department_id: Option<String>,

    #[serde(default)]
    #[validate(custom(
        function = validate_unique_ids,
        message = "Reporting ids must not contain duplicates"
    ))]
    pub reporting_ids: Vec<String>,

    #[serde(default)]
    pub permissions: NestedPermissions,
}

impl RoleDraft {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn reporting_to<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reporting_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_permissions(mut self, permissions: NestedPermissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}
