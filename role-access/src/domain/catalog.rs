// role-access/src/domain/catalog.rs
//
// 権限カタログ
// モジュール（およびセクション）ごとに認識されるアクションの語彙を定義する。
// 起動時に一度だけ構築し、以降は読み取り専用で共有する。

use crate::domain::permission::{NestedKey, PermissionScope, SUPER_ADMIN_KEY, WILDCARD};
use crate::error::AppResult;
use crate::utils::error_helper::collect_validation;
use crate::utils::validation::TOKEN_REGEX;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// 標準カタログのバージョン
pub const STANDARD_CATALOG_VERSION: &str = "2024.1";

/// アクション定義
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub token: String,
    pub description: String,
}

impl ActionSpec {
    pub fn new(token: &str, description: &str) -> Self {
        Self {
            token: token.to_string(),
            description: description.to_string(),
        }
    }
}

/// モジュール内のセクション
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSection {
    /// 表示名（例: `PL & ODD LEADS`）
    pub name: String,
    pub actions: Vec<ActionSpec>,
}

impl CatalogSection {
    pub fn new(name: &str, actions: Vec<ActionSpec>) -> Self {
        Self {
            name: name.to_string(),
            actions,
        }
    }

    /// ワイヤー上のセクショントークン
    pub fn token(&self) -> String {
        normalize_segment(&self.name)
    }

    pub fn has_action(&self, token: &str) -> bool {
        self.actions.iter().any(|a| a.token == token)
    }
}

/// モジュールのアクション構成
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleActions {
    Flat(Vec<ActionSpec>),
    Sectioned(Vec<CatalogSection>),
}

/// カタログのモジュール
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogModule {
    /// ワイヤー上のページキー（例: `attendance`, `leads`）
    pub page: String,
    /// 表示名（セクション付きモジュールのネストキーに使う。例: `Leads CRM`）
    pub name: String,
    pub actions: ModuleActions,
    /// ページキーのみの集約レコードも読み書きする（ネストキー非対応の旧クライアント向け）
    #[serde(default)]
    pub legacy_aggregate: bool,
}

impl CatalogModule {
    pub fn flat(page: &str, name: &str, actions: Vec<ActionSpec>) -> Self {
        Self {
            page: page.to_string(),
            name: name.to_string(),
            actions: ModuleActions::Flat(actions),
            legacy_aggregate: false,
        }
    }

    pub fn sectioned(page: &str, name: &str, sections: Vec<CatalogSection>) -> Self {
        Self {
            page: page.to_string(),
            name: name.to_string(),
            actions: ModuleActions::Sectioned(sections),
            legacy_aggregate: false,
        }
    }

    pub fn with_legacy_aggregate(mut self) -> Self {
        self.legacy_aggregate = true;
        self
    }

    pub fn sections(&self) -> &[CatalogSection] {
        match &self.actions {
            ModuleActions::Sectioned(sections) => sections,
            ModuleActions::Flat(_) => &[],
        }
    }

    pub fn is_sectioned(&self) -> bool {
        matches!(self.actions, ModuleActions::Sectioned(_))
    }

    /// 表示名でセクションを検索
    pub fn section_by_name(&self, name: &str) -> Option<&CatalogSection> {
        self.sections().iter().find(|s| s.name == name)
    }

    /// ワイヤー上のトークンでセクションを検索（正規化の逆変換）
    pub fn section_by_token(&self, token: &str) -> Option<&CatalogSection> {
        self.sections().iter().find(|s| s.token() == token)
    }

    /// セクションのネストキー（`Leads CRM.Create LEAD`）
    pub fn section_key(&self, section: &CatalogSection) -> String {
        NestedKey::section_key(&self.name, &section.name)
    }

    /// セクションのワイヤーページ（`leads.create_lead`）
    pub fn section_page(&self, section: &CatalogSection) -> String {
        format!("{}.{}", self.page, section.token())
    }
}

/// 権限カタログ
#[derive(Debug, Clone)]
pub struct PermissionCatalog {
    version: String,
    modules: Vec<CatalogModule>,
    by_page: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
}

static STANDARD_CATALOG: Lazy<Arc<PermissionCatalog>> = Lazy::new(|| {
    Arc::new(
        PermissionCatalog::new(STANDARD_CATALOG_VERSION, standard_modules())
            .expect("standard permission catalog must be valid"),
    )
});

impl PermissionCatalog {
    /// カタログを構築して検証する
    pub fn new(version: &str, modules: Vec<CatalogModule>) -> AppResult<Self> {
        validate_modules(&modules)?;

        let by_page = modules
            .iter()
            .enumerate()
            .map(|(i, m)| (m.page.clone(), i))
            .collect();
        let by_name = modules
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_sectioned())
            .map(|(i, m)| (m.name.clone(), i))
            .collect();

        Ok(Self {
            version: version.to_string(),
            modules,
            by_page,
            by_name,
        })
    }

    /// プロセス全体で共有する標準カタログ
    pub fn standard() -> Arc<PermissionCatalog> {
        Arc::clone(&STANDARD_CATALOG)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn modules(&self) -> &[CatalogModule] {
        &self.modules
    }

    pub fn module_by_page(&self, page: &str) -> Option<&CatalogModule> {
        self.by_page.get(page).map(|&i| &self.modules[i])
    }

    /// セクション付きモジュールを表示名で検索
    pub fn sectioned_module_by_name(&self, name: &str) -> Option<&CatalogModule> {
        self.by_name.get(name).map(|&i| &self.modules[i])
    }

    /// ネストキーに対応するアクション語彙
    pub fn vocabulary_for_key(&self, key: &str) -> Option<&[ActionSpec]> {
        match NestedKey::parse(key) {
            NestedKey::SuperAdmin => None,
            NestedKey::Module(page) => match &self.module_by_page(page)?.actions {
                ModuleActions::Flat(actions) => Some(actions.as_slice()),
                ModuleActions::Sectioned(_) => None,
            },
            NestedKey::Section { module, section } => self
                .sectioned_module_by_name(module)?
                .section_by_name(section)
                .map(|s| s.actions.as_slice()),
        }
    }

    /// ワイヤーのページに対応するアクショントークン
    ///
    /// 集約ページ（`leads`）は全セクションの語彙の和集合になる。
    pub fn vocabulary_for_page(&self, page: &str) -> Option<Vec<&str>> {
        if let Some((parent, token)) = page.split_once('.') {
            let section = self.module_by_page(parent)?.section_by_token(token)?;
            return Some(section.actions.iter().map(|a| a.token.as_str()).collect());
        }

        let module = self.module_by_page(page)?;
        match &module.actions {
            ModuleActions::Flat(actions) => Some(actions.iter().map(|a| a.token.as_str()).collect()),
            ModuleActions::Sectioned(sections) if module.legacy_aggregate => {
                let mut tokens: Vec<&str> = Vec::new();
                for action in sections.iter().flat_map(|s| &s.actions) {
                    if !tokens.contains(&action.token.as_str()) {
                        tokens.push(action.token.as_str());
                    }
                }
                Some(tokens)
            }
            ModuleActions::Sectioned(_) => None,
        }
    }
}

/// 語彙に `own ⊂ junior ⊂ all` の三段階が揃っているか
pub fn has_scope_tiers<'a, I>(tokens: I) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    let present: HashSet<PermissionScope> = tokens
        .into_iter()
        .filter_map(PermissionScope::from_token)
        .collect();
    PermissionScope::ALL_TIERS
        .iter()
        .all(|tier| present.contains(tier))
}

/// 表示名をワイヤー上のトークンに正規化
///
/// 小文字化し、`" & "` を `_` に、残りの空白も `_` に置き換える。
pub fn normalize_segment(segment: &str) -> String {
    segment.to_lowercase().replace(" & ", "_").replace(' ', "_")
}

fn validate_modules(modules: &[CatalogModule]) -> AppResult<()> {
    let mut errors = Vec::new();
    let mut pages = HashSet::new();
    let mut names = HashSet::new();

    for module in modules {
        if module.page == WILDCARD || !TOKEN_REGEX.is_match(&module.page) {
            errors.push(format!("catalog: invalid page key '{}'", module.page));
        }
        if !pages.insert(module.page.as_str()) {
            errors.push(format!("catalog: duplicate page '{}'", module.page));
        }
        if module.name == SUPER_ADMIN_KEY || module.name.contains('.') || module.name.is_empty() {
            errors.push(format!("catalog: invalid module name '{}'", module.name));
        }

        match &module.actions {
            ModuleActions::Flat(actions) => {
                if module.legacy_aggregate {
                    errors.push(format!(
                        "catalog: flat module '{}' cannot carry a legacy aggregate",
                        module.page
                    ));
                }
                validate_actions(&module.page, actions, &mut errors);
            }
            ModuleActions::Sectioned(sections) => {
                if !names.insert(module.name.as_str()) {
                    errors.push(format!("catalog: duplicate module name '{}'", module.name));
                }
                if sections.is_empty() {
                    errors.push(format!("catalog: module '{}' has no sections", module.page));
                }
                let mut tokens = HashSet::new();
                for section in sections {
                    let token = section.token();
                    if section.name.contains('.') || !TOKEN_REGEX.is_match(&token) {
                        errors.push(format!(
                            "catalog: invalid section name '{}' in '{}'",
                            section.name, module.page
                        ));
                    }
                    if !tokens.insert(token) {
                        errors.push(format!(
                            "catalog: duplicate section '{}' in '{}'",
                            section.name, module.page
                        ));
                    }
                    validate_actions(
                        &format!("{}.{}", module.page, section.token()),
                        &section.actions,
                        &mut errors,
                    );
                }
            }
        }
    }

    collect_validation(errors, "permission_catalog::new")
}

fn validate_actions(page: &str, actions: &[ActionSpec], errors: &mut Vec<String>) {
    if actions.is_empty() {
        errors.push(format!("catalog: '{}' has no actions", page));
    }
    let mut seen = HashSet::new();
    for action in actions {
        if !TOKEN_REGEX.is_match(&action.token) {
            errors.push(format!(
                "catalog: invalid action token '{}' in '{}'",
                action.token, page
            ));
        }
        if !seen.insert(action.token.as_str()) {
            errors.push(format!(
                "catalog: duplicate action '{}' in '{}'",
                action.token, page
            ));
        }
    }
}

fn scope_actions() -> Vec<ActionSpec> {
    vec![
        ActionSpec::new("own", "View own records"),
        ActionSpec::new("junior", "View records of subordinates"),
        ActionSpec::new("all", "View every record"),
    ]
}

fn standard_modules() -> Vec<CatalogModule> {
    let with_scope = |extra: Vec<ActionSpec>| {
        let mut actions = vec![ActionSpec::new("show", "Open the module")];
        actions.extend(scope_actions());
        actions.extend(extra);
        actions
    };

    vec![
        CatalogModule::flat(
            "attendance",
            "Attendance",
            with_scope(vec![
                ActionSpec::new("edit", "Correct attendance entries"),
                ActionSpec::new("download", "Export attendance sheets"),
            ]),
        ),
        CatalogModule::flat(
            "leave",
            "Leave",
            with_scope(vec![
                ActionSpec::new("add", "Apply for leave"),
                ActionSpec::new("approve", "Approve or reject leave requests"),
            ]),
        ),
        CatalogModule::flat(
            "employees",
            "Employees",
            with_scope(vec![
                ActionSpec::new("add", "Onboard employees"),
                ActionSpec::new("edit", "Edit employee profiles"),
                ActionSpec::new("delete", "Remove employees"),
            ]),
        ),
        CatalogModule::flat(
            "tasks",
            "Tasks",
            with_scope(vec![
                ActionSpec::new("add", "Create tasks"),
                ActionSpec::new("edit", "Edit tasks"),
                ActionSpec::new("delete", "Delete tasks"),
                ActionSpec::new("assign", "Assign tasks to others"),
            ]),
        ),
        CatalogModule::flat(
            "tickets",
            "Tickets",
            with_scope(vec![
                ActionSpec::new("add", "Raise tickets"),
                ActionSpec::new("assign", "Route tickets"),
                ActionSpec::new("status_update", "Change ticket status"),
            ]),
        ),
        CatalogModule::flat(
            "loans",
            "Loans",
            with_scope(vec![
                ActionSpec::new("add", "Create loan applications"),
                ActionSpec::new("edit", "Edit loan applications"),
                ActionSpec::new("approve", "Sanction loans"),
            ]),
        ),
        CatalogModule::flat(
            "departments",
            "Departments",
            vec![
                ActionSpec::new("show", "View departments"),
                ActionSpec::new("add", "Create departments"),
                ActionSpec::new("edit", "Edit departments"),
                ActionSpec::new("delete", "Delete departments"),
            ],
        ),
        CatalogModule::flat(
            "roles",
            "Roles",
            vec![
                ActionSpec::new("show", "View roles and the reporting tree"),
                ActionSpec::new("add", "Create roles"),
                ActionSpec::new("edit", "Edit roles and their permissions"),
                ActionSpec::new("delete", "Delete roles"),
            ],
        ),
        CatalogModule::flat(
            "reports",
            "Reports",
            vec![
                ActionSpec::new("show", "View reports"),
                ActionSpec::new("download", "Export reports"),
            ],
        ),
        CatalogModule::flat(
            "settings",
            "Settings",
            vec![
                ActionSpec::new("show", "View settings"),
                ActionSpec::new("edit", "Change settings"),
            ],
        ),
        CatalogModule::sectioned(
            "leads",
            "Leads CRM",
            vec![
                CatalogSection::new(
                    "Create LEAD",
                    vec![
                        ActionSpec::new("show", "Open the lead creation screen"),
                        ActionSpec::new("add", "Create leads"),
                        ActionSpec::new("edit", "Edit leads"),
                        ActionSpec::new("delete", "Delete leads"),
                    ],
                ),
                CatalogSection::new(
                    "PL & ODD LEADS",
                    vec![
                        ActionSpec::new("show", "Open the PL & ODD lead list"),
                        ActionSpec::new("own", "View own leads"),
                        ActionSpec::new("junior", "View leads of subordinates"),
                        ActionSpec::new("all", "View every lead"),
                        ActionSpec::new("assign", "Reassign leads"),
                        ActionSpec::new("download_obligation", "Download obligation sheets"),
                        ActionSpec::new("status_update", "Update lead status"),
                        ActionSpec::new("delete", "Delete leads"),
                    ],
                ),
            ],
        )
        .with_legacy_aggregate(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[test]
    fn test_normalize_segment() {
        assert_eq!(normalize_segment("Create LEAD"), "create_lead");
        assert_eq!(normalize_segment("PL & ODD LEADS"), "pl_odd_leads");
        assert_eq!(normalize_segment("attendance"), "attendance");
    }

    #[test]
    fn test_standard_catalog_lookups() {
        let catalog = PermissionCatalog::standard();
        assert_eq!(catalog.version(), STANDARD_CATALOG_VERSION);

        let leads = catalog.module_by_page("leads").unwrap();
        assert!(leads.legacy_aggregate);
        assert_eq!(
            leads.section_by_token("pl_odd_leads").unwrap().name,
            "PL & ODD LEADS"
        );
        assert_eq!(
            catalog.sectioned_module_by_name("Leads CRM").unwrap().page,
            "leads"
        );
        assert!(catalog.sectioned_module_by_name("Attendance").is_none());
    }

    #[test]
    fn test_vocabulary_for_page() {
        let catalog = PermissionCatalog::standard();

        let create = catalog.vocabulary_for_page("leads.create_lead").unwrap();
        assert_eq!(create, vec!["show", "add", "edit", "delete"]);

        let aggregate = catalog.vocabulary_for_page("leads").unwrap();
        assert!(aggregate.contains(&"download_obligation"));
        assert_eq!(
            aggregate.iter().filter(|t| **t == "show").count(),
            1,
            "aggregate vocabulary is deduplicated"
        );

        assert!(catalog.vocabulary_for_page("leads.unknown").is_none());
        assert!(catalog.vocabulary_for_page("payroll").is_none());
    }

    #[test]
    fn test_vocabulary_for_key() {
        let catalog = PermissionCatalog::standard();
        assert!(catalog.vocabulary_for_key("attendance").is_some());
        assert!(catalog
            .vocabulary_for_key("Leads CRM.Create LEAD")
            .is_some());
        assert!(catalog.vocabulary_for_key("leads").is_none());
        assert!(catalog.vocabulary_for_key("SuperAdmin").is_none());
    }

    #[test]
    fn test_scope_tiers_detection() {
        assert!(has_scope_tiers(["show", "own", "junior", "all"]));
        assert!(!has_scope_tiers(["show", "own", "all"]));
        assert!(!has_scope_tiers(["show", "add"]));
    }

    #[test]
    fn test_catalog_rejects_invalid_definitions() {
        let result = PermissionCatalog::new(
            "test",
            vec![
                CatalogModule::flat("attendance", "Attendance", vec![ActionSpec::new("show", "")]),
                CatalogModule::flat("attendance", "Attendance", vec![ActionSpec::new("Show", "")]),
            ],
        );

        match result {
            Err(AppError::ValidationErrors(errors)) => {
                assert!(errors.iter().any(|e| e.contains("duplicate page")));
                assert!(errors.iter().any(|e| e.contains("invalid action token")));
            }
            other => panic!("unexpected result: {:?}", other.map(|c| c.version().to_string())),
        }
    }

    #[test]
    fn test_catalog_rejects_empty_vocabulary() {
        let result = PermissionCatalog::new(
            "test",
            vec![CatalogModule::flat("reports", "Reports", vec![])],
        );
        assert!(matches!(result, Err(AppError::ValidationError(_))));
    }
}
