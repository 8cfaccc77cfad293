// role-access/src/service/authorization.rs
//
// ページ・アクション単位の認可判定

use crate::domain::catalog::{has_scope_tiers, PermissionCatalog};
use crate::domain::permission::{ActionSet, NestedPermissions, PermissionScope};
use crate::domain::wire::{WireActions, WirePage, WirePermission};
use crate::error::AppResult;
use crate::log_with_context;
use crate::service::permission_codec::PermissionCodec;
use std::sync::Arc;

/// 認可リゾルバー
///
/// カタログは起動時に一度だけ構築したものを注入する。判定は入力だけに依存する純粋関数で、
/// 複数スレッドから同時に呼び出してよい。
#[derive(Debug, Clone)]
pub struct Authorizer {
    catalog: Arc<PermissionCatalog>,
    codec: PermissionCodec,
}

impl Authorizer {
    pub fn new(catalog: Arc<PermissionCatalog>) -> Self {
        Self {
            codec: PermissionCodec::new(catalog.clone()),
            catalog,
        }
    }

    /// ワイヤー表現の権限で `(page, action)` を判定
    ///
    /// - `{page:"*", actions:"*"}` を持てば無条件に許可
    /// - ページのレコードが無い、または空配列なら拒否
    /// - 語彙に `own ⊂ junior ⊂ all` があるモジュールでは、広いスコープが狭いスコープを含む
    pub fn authorize(&self, records: &[WirePermission], page: &str, action: &str) -> bool {
        if records.iter().any(WirePermission::is_wildcard) {
            return true;
        }

        let Some(vocabulary) = self.catalog.vocabulary_for_page(page) else {
            log_with_context!(
                tracing::Level::DEBUG,
                "Authorization denied for unknown page",
                "page" => page,
                "action" => action
            );
            return false;
        };

        let granted = match self.effective_actions(records, page) {
            Some(granted) if !granted.is_empty() => granted,
            _ => return false,
        };

        if granted.contains(action) {
            return true;
        }

        // スコープの包含はスコープ系アクションの判定にだけ適用する
        match PermissionScope::from_token(action) {
            Some(requested) if has_scope_tiers(vocabulary.iter().copied()) => granted
                .iter()
                .filter_map(|token| PermissionScope::from_token(token))
                .any(|held| held.includes(&requested)),
            _ => false,
        }
    }

    /// ネスト表現の権限で判定（内部でワイヤー表現に変換する）
    pub fn authorize_nested(
        &self,
        permissions: &NestedPermissions,
        page: &str,
        action: &str,
    ) -> AppResult<bool> {
        let records = self.codec.encode(permissions)?;
        Ok(self.authorize(&records, page, action))
    }

    /// ページに対して実際に付与されているアクション
    ///
    /// 同じページのレコードが複数あれば和集合をとる。`module.section` のレコードが
    /// 一つも無いモジュールでは、旧形式の集約レコードをセクションの語彙で絞り込んで使う。
    /// レコードが存在しなければ `None`（空集合の `Some` とは区別する）。
    pub fn effective_actions(&self, records: &[WirePermission], page: &str) -> Option<ActionSet> {
        let mut granted: Option<ActionSet> = None;
        for record in records.iter().filter(|r| r.page == page) {
            if let WireActions::List(actions) = &record.actions {
                granted
                    .get_or_insert_with(ActionSet::new)
                    .extend(actions.iter().cloned());
            }
        }
        if granted.is_some() {
            return granted;
        }

        let WirePage::Sectioned { parent, section } = WirePage::parse(page, &self.catalog) else {
            return None;
        };
        let module = self
            .catalog
            .module_by_page(parent)
            .filter(|m| m.legacy_aggregate)?;
        let section = module.section_by_token(section)?;

        let nested_prefix = format!("{}.", parent);
        if records.iter().any(|r| r.page.starts_with(&nested_prefix)) {
            return None;
        }

        let mut legacy: Option<ActionSet> = None;
        for record in records.iter().filter(|r| r.page == parent) {
            if let WireActions::List(actions) = &record.actions {
                legacy.get_or_insert_with(ActionSet::new).extend(
                    actions
                        .iter()
                        .filter(|action| section.has_action(action))
                        .cloned(),
                );
            }
        }
        legacy
    }
}

impl Default for Authorizer {
    fn default() -> Self {
        Self::new(PermissionCatalog::standard())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authorizer() -> Authorizer {
        Authorizer::default()
    }

    #[test]
    fn test_wildcard_allows_everything() {
        let records = vec![WirePermission::wildcard()];
        assert!(authorizer().authorize(&records, "settings", "edit"));
        assert!(authorizer().authorize(&records, "payroll", "anything"));
    }

    #[test]
    fn test_empty_but_present_record_denies() {
        let records = vec![WirePermission::new("leads.create_lead", Vec::<String>::new())];
        assert!(!authorizer().authorize(&records, "leads.create_lead", "show"));
        assert_eq!(
            authorizer().effective_actions(&records, "leads.create_lead"),
            Some(ActionSet::new())
        );
    }

    #[test]
    fn test_broader_scope_implies_narrower() {
        let records = vec![WirePermission::new("attendance", ["all"])];
        let authorizer = authorizer();
        assert!(authorizer.authorize(&records, "attendance", "own"));
        assert!(authorizer.authorize(&records, "attendance", "junior"));
        assert!(authorizer.authorize(&records, "attendance", "all"));

        let records = vec![WirePermission::new("attendance", ["own"])];
        assert!(!authorizer.authorize(&records, "attendance", "junior"));
    }

    #[test]
    fn test_scope_does_not_imply_mutations() {
        let records = vec![WirePermission::new("tasks", ["all"])];
        assert!(!authorizer().authorize(&records, "tasks", "edit"));
        assert!(!authorizer().authorize(&records, "tasks", "show"));
    }

    #[test]
    fn test_no_prefix_matching() {
        let records = vec![WirePermission::new("leads.create_lead", ["show"])];
        assert!(!authorizer().authorize(&records, "leads", "show"));
        assert!(!authorizer().authorize(&records, "leads.pl_odd_leads", "show"));
    }

    #[test]
    fn test_legacy_record_applies_without_nested_entries() {
        let authorizer = authorizer();
        let records = vec![WirePermission::new("leads", ["show", "assign"])];
        assert!(authorizer.authorize(&records, "leads.pl_odd_leads", "assign"));
        assert!(!authorizer.authorize(&records, "leads.create_lead", "assign"));

        let records = vec![
            WirePermission::new("leads", ["show", "assign"]),
            WirePermission::new("leads.create_lead", ["show"]),
        ];
        assert!(!authorizer.authorize(&records, "leads.pl_odd_leads", "assign"));
    }

    #[test]
    fn test_duplicate_records_are_unioned() {
        let records = vec![
            WirePermission::new("tickets", ["show"]),
            WirePermission::new("tickets", ["assign"]),
        ];
        assert!(authorizer().authorize(&records, "tickets", "assign"));
    }

    #[test]
    fn test_authorize_nested() {
        let permissions: NestedPermissions =
            [("Leads CRM.PL & ODD LEADS", vec!["junior"])].into_iter().collect();
        let authorizer = authorizer();
        assert!(authorizer
            .authorize_nested(&permissions, "leads.pl_odd_leads", "own")
            .unwrap());
        assert!(!authorizer
            .authorize_nested(&permissions, "leads.pl_odd_leads", "all")
            .unwrap());
        assert!(authorizer
            .authorize_nested(&NestedPermissions::super_admin(), "roles", "delete")
            .unwrap());
    }
}
