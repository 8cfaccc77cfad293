// role-access/src/service/permission_codec.rs
//
// ネストした権限表現 ⇔ フラットなワイヤー表現の相互変換

use crate::domain::catalog::{ActionSpec, CatalogModule, ModuleActions, PermissionCatalog};
use crate::domain::permission::{ActionSet, NestedKey, NestedPermissions};
use crate::domain::role_model::{Role, RoleRecord};
use crate::domain::wire::{WireActions, WirePage, WirePermission};
use crate::error::AppResult;
use crate::log_with_context;
use crate::utils::error_helper::collect_validation;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

/// 権限コーデック
#[derive(Debug, Clone)]
pub struct PermissionCodec {
    catalog: Arc<PermissionCatalog>,
}

impl PermissionCodec {
    pub fn new(catalog: Arc<PermissionCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &PermissionCatalog {
        &self.catalog
    }

    /// ネスト表現 → ワイヤー表現
    ///
    /// `SuperAdmin` があれば `{page:"*", actions:"*"}` のみを出力し、他のキーは無視する。
    /// レコードはカタログの定義順に並ぶ。
    pub fn encode(&self, nested: &NestedPermissions) -> AppResult<Vec<WirePermission>> {
        if nested.is_super_admin() {
            if nested.len() > 1 {
                log_with_context!(
                    tracing::Level::DEBUG,
                    "Ignoring permissions granted alongside SuperAdmin",
                    "ignored_keys" => nested.len() - 1
                );
            }
            return Ok(vec![WirePermission::wildcard()]);
        }

        self.validate_nested(nested)?;

        let mut records = Vec::new();
        for module in self.catalog.modules() {
            match &module.actions {
                ModuleActions::Flat(vocabulary) => {
                    // 空のフラットモジュールは出力しない
                    if let Some(actions) = nested.get(&module.page).filter(|a| !a.is_empty()) {
                        records.push(WirePermission::new(
                            &module.page,
                            ordered_tokens(vocabulary, actions),
                        ));
                    }
                }
                ModuleActions::Sectioned(sections) => {
                    let mut touched = false;
                    let mut union = ActionSet::new();
                    for section in sections {
                        // セクションは空でも出力する（明示的な剥奪を表す）
                        if let Some(actions) = nested.get(&module.section_key(section)) {
                            touched = true;
                            union.extend(actions.iter().cloned());
                            records.push(WirePermission::new(
                                &module.section_page(section),
                                ordered_tokens(&section.actions, actions),
                            ));
                        }
                    }
                    if module.legacy_aggregate && touched && !union.is_empty() {
                        records.push(WirePermission::new(
                            &module.page,
                            ordered_union(module, &union),
                        ));
                    }
                }
            }
        }

        Ok(records)
    }

    /// ワイヤー表現 → ネスト表現
    ///
    /// 旧形式の集約レコード（`leads`）は、同じモジュールのネストしたレコードが
    /// 一つも無い場合に限り、カタログのセクション語彙で振り分けて取り込む。
    pub fn decode(&self, records: &[WirePermission]) -> AppResult<NestedPermissions> {
        for record in records {
            record.validate_shape()?;
        }

        if records.iter().any(WirePermission::is_wildcard) {
            return Ok(NestedPermissions::super_admin());
        }

        // 1パス目: ネストしたレコードを持つ親ページを記録
        let nested_parents: HashSet<&str> = records
            .iter()
            .filter_map(|r| match WirePage::parse(&r.page, &self.catalog) {
                WirePage::Sectioned { parent, .. } => Some(parent),
                _ => None,
            })
            .collect();

        let mut nested = NestedPermissions::new();
        let mut errors = Vec::new();

        for record in records {
            let actions = match &record.actions {
                WireActions::List(actions) => actions.as_slice(),
                WireActions::Wildcard => continue,
            };

            match WirePage::parse(&record.page, &self.catalog) {
                WirePage::Wildcard => {}
                WirePage::LegacyAggregate(page) => {
                    if nested_parents.contains(page) {
                        log_with_context!(
                            tracing::Level::DEBUG,
                            "Discarding legacy aggregate record in favour of nested entries",
                            "page" => page
                        );
                        continue;
                    }
                    let Some(module) = self.catalog.module_by_page(page) else {
                        continue;
                    };
                    self.split_legacy_aggregate(module, actions, &mut nested, &mut errors);
                }
                WirePage::Sectioned { parent, section } => {
                    let Some(module) = self
                        .catalog
                        .module_by_page(parent)
                        .filter(|m| m.is_sectioned())
                    else {
                        errors.push(format!("page: unknown module '{}'", record.page));
                        continue;
                    };
                    let Some(section) = module.section_by_token(section) else {
                        errors.push(format!("page: unknown section '{}'", record.page));
                        continue;
                    };
                    check_tokens(&record.page, &section.actions, actions, &mut errors);
                    nested.grant(&module.section_key(section), actions.iter().cloned());
                }
                WirePage::Flat(page) => match self.catalog.module_by_page(page) {
                    Some(CatalogModule {
                        actions: ModuleActions::Flat(vocabulary),
                        ..
                    }) => {
                        check_tokens(page, vocabulary, actions, &mut errors);
                        nested.grant(page, actions.iter().cloned());
                    }
                    Some(_) => errors.push(format!("page: '{}' requires a section", page)),
                    None => errors.push(format!("page: unknown module '{}'", page)),
                },
            }
        }

        collect_validation(errors, "permission_codec::decode")?;
        Ok(nested)
    }

    /// ネスト表現をカタログに照らして検証
    pub fn validate_nested(&self, nested: &NestedPermissions) -> AppResult<()> {
        let mut errors = Vec::new();
        for (key, actions) in nested {
            match NestedKey::parse(key) {
                // 空の SuperAdmin は「付与なし」として扱う
                NestedKey::SuperAdmin => {}
                NestedKey::Module(_) | NestedKey::Section { .. } => {
                    match self.catalog.vocabulary_for_key(key) {
                        Some(vocabulary) => {
                            let tokens: Vec<String> = actions.iter().cloned().collect();
                            check_tokens(key, vocabulary, &tokens, &mut errors);
                        }
                        None => errors.push(format!("permissions: unknown key '{}'", key)),
                    }
                }
            }
        }
        collect_validation(errors, "permission_codec::validate_nested")
    }

    /// ロールを永続化形式へ変換
    pub fn to_record(&self, role: &Role) -> AppResult<RoleRecord> {
        Ok(RoleRecord {
            id: role.id.clone(),
            name: role.name.clone(),
            description: role.description.clone(),
            department_id: role.department_id.clone(),
            reporting_ids: role.reporting_ids.clone(),
            permissions: self.encode(&role.permissions)?,
        })
    }

    /// 永続化形式からロールを復元
    pub fn from_record(&self, record: &RoleRecord) -> AppResult<Role> {
        let permissions = self.decode(&record.permissions).map_err(|e| {
            log_with_context!(
                tracing::Level::WARN,
                "Stored role carries invalid permissions",
                "role_id" => &record.id,
                "error" => e.to_string()
            );
            e
        })?;

        Ok(Role {
            id: record.id.clone(),
            name: record.name.clone(),
            description: record.description.clone(),
            department_id: record.department_id.clone(),
            reporting_ids: record.reporting_ids.clone(),
            permissions,
        })
    }

    fn split_legacy_aggregate(
        &self,
        module: &CatalogModule,
        actions: &[String],
        nested: &mut NestedPermissions,
        errors: &mut Vec<String>,
    ) {
        for action in actions {
            let mut placed = false;
            // 複数セクションで有効なアクション（show など）はすべてに振り分ける
            for section in module.sections() {
                if section.has_action(action) {
                    nested.grant(&module.section_key(section), [action.as_str()]);
                    placed = true;
                }
            }
            if !placed {
                errors.push(format!(
                    "actions: '{}' is not valid for any section of '{}'",
                    action, module.page
                ));
            }
        }
    }
}

impl Default for PermissionCodec {
    fn default() -> Self {
        Self::new(PermissionCatalog::standard())
    }
}

/// 語彙の定義順に並べたトークン
fn ordered_tokens(vocabulary: &[ActionSpec], actions: &ActionSet) -> Vec<String> {
    vocabulary
        .iter()
        .filter(|spec| actions.contains(&spec.token))
        .map(|spec| spec.token.clone())
        .collect()
}

/// 全セクションの語彙順に並べた和集合（重複なし）
fn ordered_union(module: &CatalogModule, union: &ActionSet) -> Vec<String> {
    let mut seen = BTreeSet::new();
    module
        .sections()
        .iter()
        .flat_map(|section| section.actions.iter())
        .filter(|spec| union.contains(&spec.token) && seen.insert(spec.token.as_str()))
        .map(|spec| spec.token.clone())
        .collect()
}

fn check_tokens(page: &str, vocabulary: &[ActionSpec], actions: &[String], errors: &mut Vec<String>) {
    for action in actions {
        if !vocabulary.iter().any(|spec| &spec.token == action) {
            errors.push(format!("actions: '{}' is not valid for '{}'", action, page));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    fn codec() -> PermissionCodec {
        PermissionCodec::default()
    }

    fn nested(entries: Vec<(&str, Vec<&str>)>) -> NestedPermissions {
        let mut permissions = NestedPermissions::new();
        for (key, actions) in entries {
            permissions.set(key, actions);
        }
        permissions
    }

    #[test]
    fn test_encode_super_admin_drops_everything_else() {
        let input = nested(vec![("SuperAdmin", vec!["*"]), ("attendance", vec!["show"])]);
        let wire = codec().encode(&input).unwrap();
        assert_eq!(wire, vec![WirePermission::wildcard()]);
    }

    #[test]
    fn test_encode_omits_empty_flat_but_keeps_empty_section() {
        let input = nested(vec![
            ("attendance", vec![]),
            ("Leads CRM.Create LEAD", vec![]),
            ("tasks", vec!["add", "show"]),
        ]);
        let wire = codec().encode(&input).unwrap();

        assert_eq!(
            wire,
            vec![
                WirePermission::new("tasks", ["show", "add"]),
                WirePermission::new("leads.create_lead", Vec::<String>::new()),
            ]
        );
    }

    #[test]
    fn test_encode_emits_legacy_aggregate_union() {
        let input = nested(vec![
            ("Leads CRM.Create LEAD", vec!["show", "add"]),
            ("Leads CRM.PL & ODD LEADS", vec!["assign", "show"]),
        ]);
        let wire = codec().encode(&input).unwrap();

        assert_eq!(
            wire,
            vec![
                WirePermission::new("leads.create_lead", ["show", "add"]),
                WirePermission::new("leads.pl_odd_leads", ["show", "assign"]),
                WirePermission::new("leads", ["show", "add", "assign"]),
            ]
        );
    }

    #[test]
    fn test_encode_rejects_unknown_keys_and_actions() {
        let input = nested(vec![("payroll", vec!["show"]), ("attendance", vec!["fly"])]);
        match codec().encode(&input) {
            Err(AppError::ValidationErrors(errors)) => {
                assert!(errors.iter().any(|e| e.contains("payroll")));
                assert!(errors.iter().any(|e| e.contains("fly")));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_decode_legacy_aggregate_partitions_by_section() {
        let wire = vec![WirePermission::new("leads", ["show", "add", "assign"])];
        let decoded = codec().decode(&wire).unwrap();

        assert_eq!(
            decoded,
            nested(vec![
                ("Leads CRM.Create LEAD", vec!["show", "add"]),
                ("Leads CRM.PL & ODD LEADS", vec!["show", "assign"]),
            ])
        );
    }

    #[test]
    fn test_decode_discards_legacy_when_nested_present() {
        let wire = vec![
            WirePermission::new("leads", ["show", "add", "delete"]),
            WirePermission::new("leads.create_lead", ["show"]),
        ];
        let decoded = codec().decode(&wire).unwrap();

        assert_eq!(decoded, nested(vec![("Leads CRM.Create LEAD", vec!["show"])]));
        assert!(!decoded.contains_key("Leads CRM.PL & ODD LEADS"));
    }

    #[test]
    fn test_decode_wildcard_wins() {
        let wire = vec![
            WirePermission::new("attendance", ["own"]),
            WirePermission::wildcard(),
        ];
        assert_eq!(
            codec().decode(&wire).unwrap(),
            NestedPermissions::super_admin()
        );
    }

    #[test]
    fn test_decode_merges_duplicate_pages() {
        let wire = vec![
            WirePermission::new("attendance", ["own"]),
            WirePermission::new("attendance", ["junior", "own"]),
        ];
        let decoded = codec().decode(&wire).unwrap();
        assert_eq!(decoded, nested(vec![("attendance", vec!["own", "junior"])]));
    }

    #[test]
    fn test_decode_rejects_unknown_pages() {
        for page in ["payroll", "leads.unknown", "attendance.daily"] {
            let wire = vec![WirePermission::new(page, ["show"])];
            let err = codec().decode(&wire).unwrap_err();
            assert!(err.is_validation(), "page {} should be rejected", page);
        }
    }

    #[test]
    fn test_decode_rejects_legacy_action_outside_every_section() {
        let wire = vec![WirePermission::new("leads", ["show", "approve"])];
        assert!(codec().decode(&wire).is_err());
    }

    #[test]
    fn test_round_trip_with_empty_section() {
        let input = nested(vec![
            ("attendance", vec!["own", "junior"]),
            ("Leads CRM.PL & ODD LEADS", vec![]),
            ("Leads CRM.Create LEAD", vec!["edit"]),
        ]);
        let codec = codec();
        let decoded = codec.decode(&codec.encode(&input).unwrap()).unwrap();
        assert_eq!(decoded, input.canonical());
    }

    #[test]
    fn test_record_conversion() {
        let role = Role::new("B", "Team Lead")
            .with_reporting_ids(["A"])
            .with_permissions(nested(vec![("attendance", vec!["junior"])]));
        let codec = codec();

        let record = codec.to_record(&role).unwrap();
        assert_eq!(record.permissions, vec![WirePermission::new("attendance", ["junior"])]);
        assert_eq!(codec.from_record(&record).unwrap(), role);
    }
}
