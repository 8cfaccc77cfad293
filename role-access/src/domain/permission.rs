// role-access/src/domain/permission.rs

use serde::{Deserialize, Serialize};
use std::collections::{btree_map, BTreeMap, BTreeSet};

/// スーパー管理者を表す番兵モジュール名
pub const SUPER_ADMIN_KEY: &str = "SuperAdmin";

/// ワイヤー表現のワイルドカード
pub const WILDCARD: &str = "*";

/// 付与されたアクションの集合
pub type ActionSet = BTreeSet<String>;

/// 権限スコープ（レコードの可視範囲）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionScope {
    Own,    // 自分のデータのみ
    Junior, // 部下のデータ
    All,    // 全データ
}

impl PermissionScope {
    pub const ALL_TIERS: [PermissionScope; 3] = [
        PermissionScope::Own,
        PermissionScope::Junior,
        PermissionScope::All,
    ];

    /// スコープレベルを数値で取得（高いほど広範囲）
    pub fn level(&self) -> u8 {
        match self {
            PermissionScope::Own => 1,
            PermissionScope::Junior => 2,
            PermissionScope::All => 3,
        }
    }

    /// 指定されたスコープ以上かチェック
    pub fn includes(&self, other: &PermissionScope) -> bool {
        self.level() >= other.level()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionScope::Own => "own",
            PermissionScope::Junior => "junior",
            PermissionScope::All => "all",
        }
    }

    /// アクショントークンからスコープを取得
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "own" => Some(PermissionScope::Own),
            "junior" => Some(PermissionScope::Junior),
            "all" => Some(PermissionScope::All),
            _ => None,
        }
    }

    /// スコープの説明を取得
    pub fn description(&self) -> &str {
        match self {
            PermissionScope::Own => "Access to own records only",
            PermissionScope::Junior => "Access to own and subordinates' records",
            PermissionScope::All => "Access to all records in the module",
        }
    }
}

impl std::fmt::Display for PermissionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// ネスト表現のキー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NestedKey<'a> {
    SuperAdmin,
    /// フラットなモジュール（キーはワイヤーのページ名と同じ）
    Module(&'a str),
    /// `モジュール表示名.セクション表示名`
    Section { module: &'a str, section: &'a str },
}

impl<'a> NestedKey<'a> {
    pub fn parse(key: &'a str) -> Self {
        if key == SUPER_ADMIN_KEY {
            return NestedKey::SuperAdmin;
        }
        match key.split_once('.') {
            Some((module, section)) => NestedKey::Section { module, section },
            None => NestedKey::Module(key),
        }
    }

    pub fn section_key(module: &str, section: &str) -> String {
        format!("{}.{}", module, section)
    }
}

/// UI側で扱うネストした権限表現
///
/// キーはモジュール名（`attendance`）、`モジュール.セクション`（`Leads CRM.Create LEAD`）、
/// または番兵の `SuperAdmin`。更新は常に丸ごと置き換える。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NestedPermissions(BTreeMap<String, ActionSet>);

impl NestedPermissions {
    pub fn new() -> Self {
        Self::default()
    }

    /// スーパー管理者権限のみを持つ表現
    pub fn super_admin() -> Self {
        let mut permissions = Self::new();
        permissions.grant(SUPER_ADMIN_KEY, [WILDCARD]);
        permissions
    }

    /// 空でないアクションを持つ `SuperAdmin` が含まれているか
    pub fn is_super_admin(&self) -> bool {
        self.0
            .get(SUPER_ADMIN_KEY)
            .is_some_and(|actions| !actions.is_empty())
    }

    /// キーにアクションを追加（キーが無ければ空集合で作成）
    pub fn grant<I, S>(&mut self, key: &str, actions: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0
            .entry(key.to_string())
            .or_default()
            .extend(actions.into_iter().map(Into::into));
    }

    /// キーのアクション集合を置き換える
    pub fn set<I, S>(&mut self, key: &str, actions: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0
            .insert(key.to_string(), actions.into_iter().map(Into::into).collect());
    }

    pub fn get(&self, key: &str) -> Option<&ActionSet> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<ActionSet> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, ActionSet> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// ワイヤー形式を経由しても失われない正規形
    ///
    /// フラットモジュールの空集合はエンコード時に省略されるため取り除く。
    /// セクションの空集合は「明示的に剥奪した」という意味を持つので残す。
    pub fn canonical(&self) -> Self {
        if self.is_super_admin() {
            return Self::super_admin();
        }
        let entries = self
            .0
            .iter()
            .filter(|(key, actions)| match NestedKey::parse(key) {
                NestedKey::SuperAdmin => false,
                NestedKey::Module(_) => !actions.is_empty(),
                NestedKey::Section { .. } => true,
            })
            .map(|(key, actions)| (key.clone(), actions.clone()))
            .collect();
        Self(entries)
    }
}

impl<K, I, S> FromIterator<(K, I)> for NestedPermissions
where
    K: Into<String>,
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, I)>>(iter: T) -> Self {
        let mut permissions = Self::new();
        for (key, actions) in iter {
            let key: String = key.into();
            permissions.grant(&key, actions);
        }
        permissions
    }
}

impl<'a> IntoIterator for &'a NestedPermissions {
    type Item = (&'a String, &'a ActionSet);
    type IntoIter = btree_map::Iter<'a, String, ActionSet>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
