// role-access/src/domain/wire.rs
//
// 永続化・送信に使うフラットな権限レコード
// [{"page": "leads.create_lead", "actions": ["show","add"]}] または
// [{"page": "*", "actions": "*"}]

use crate::domain::catalog::PermissionCatalog;
use crate::domain::permission::WILDCARD;
use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// `actions` フィールド（配列または `"*"`）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawActions", into = "RawActions")]
pub enum WireActions {
    Wildcard,
    List(Vec<String>),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawActions {
    Star(String),
    List(Vec<String>),
}

impl TryFrom<RawActions> for WireActions {
    type Error = String;

    fn try_from(raw: RawActions) -> Result<Self, Self::Error> {
        match raw {
            RawActions::Star(s) if s == WILDCARD => Ok(WireActions::Wildcard),
            RawActions::Star(s) => Err(format!(
                "actions must be an array or \"*\", got string \"{}\"",
                s
            )),
            RawActions::List(list) => Ok(WireActions::List(list)),
        }
    }
}

impl From<WireActions> for RawActions {
    fn from(actions: WireActions) -> Self {
        match actions {
            WireActions::Wildcard => RawActions::Star(WILDCARD.to_string()),
            WireActions::List(list) => RawActions::List(list),
        }
    }
}

impl WireActions {
    /// 配列の場合のみアクション一覧を返す
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            WireActions::Wildcard => None,
            WireActions::List(list) => Some(list.as_slice()),
        }
    }
}

/// ワイヤー上の権限レコード
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WirePermission {
    pub page: String,
    pub actions: WireActions,
}

impl WirePermission {
    pub fn new<I, S>(page: &str, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            page: page.to_string(),
            actions: WireActions::List(actions.into_iter().map(Into::into).collect()),
        }
    }

    /// スーパー管理者レコード `{page:"*", actions:"*"}`
    pub fn wildcard() -> Self {
        Self {
            page: WILDCARD.to_string(),
            actions: WireActions::Wildcard,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.page == WILDCARD && self.actions == WireActions::Wildcard
    }

    /// レコードの形だけを検証（カタログとの照合は行わない）
    pub fn validate_shape(&self) -> AppResult<()> {
        if self.page.trim().is_empty() {
            return Err(AppError::ValidationError(
                "page: must not be empty".to_string(),
            ));
        }
        match (&self.actions, self.page == WILDCARD) {
            (WireActions::Wildcard, true) | (WireActions::List(_), false) => Ok(()),
            (WireActions::List(_), true) => Err(AppError::ValidationError(
                "page: \"*\" must be paired with actions \"*\"".to_string(),
            )),
            (WireActions::Wildcard, false) => Err(AppError::ValidationError(format!(
                "actions: \"*\" is only allowed with page \"*\" (got page '{}')",
                self.page
            ))),
        }
    }
}

/// ページキーの種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WirePage<'a> {
    /// `*`
    Wildcard,
    /// セクション付きモジュールのページキーのみ（旧形式の集約レコード、例: `leads`）
    LegacyAggregate(&'a str),
    /// `module.section`
    Sectioned { parent: &'a str, section: &'a str },
    /// フラットなモジュール
    Flat(&'a str),
}

impl<'a> WirePage<'a> {
    /// カタログを参照してページキーを分類する
    pub fn parse(page: &'a str, catalog: &PermissionCatalog) -> Self {
        if page == WILDCARD {
            return WirePage::Wildcard;
        }
        if let Some((parent, section)) = page.split_once('.') {
            return WirePage::Sectioned { parent, section };
        }
        match catalog.module_by_page(page) {
            Some(module) if module.is_sectioned() && module.legacy_aggregate => {
                WirePage::LegacyAggregate(page)
            }
            _ => WirePage::Flat(page),
        }
    }
}
