// tests/hierarchy_tests.rs
mod common;

use common::role;
use role_access::domain::role_model::RoleRecord;
use role_access::service::deletion_guard::{can_delete, subordinates_of, DeletionCheck};
use role_access::service::role_hierarchy::{build_forest, find_cycle, has_cycle};

#[test]
fn test_forest_places_multi_manager_role_once() {
    common::init_test_env();
    let roles = vec![role("A", &[]), role("B", &["A"]), role("C", &["B", "A"])];
    let forest = build_forest(&roles);

    let ids: Vec<(usize, String)> = forest
        .walk()
        .into_iter()
        .map(|(depth, node)| (depth, node.role.id.clone()))
        .collect();
    assert_eq!(
        ids,
        vec![
            (0, "A".to_string()),
            (1, "B".to_string()),
            (2, "C".to_string())
        ]
    );

    // 追加の報告先は表示用にノードへ残る
    let c = forest.find("C").unwrap();
    assert_eq!(c.role.reporting_ids, vec!["B".to_string(), "A".to_string()]);
}

#[test]
fn test_deletion_denied_when_any_role_lists_candidate() {
    let roles = vec![role("A", &[]), role("B", &["A"]), role("C", &["B", "A"])];

    match can_delete("A", &roles) {
        DeletionCheck::Blocked {
            subordinate_count,
            subordinate_names,
        } => {
            assert_eq!(subordinate_count, 2);
            assert_eq!(subordinate_names, vec!["Role B", "Role C"]);
        }
        DeletionCheck::Allowed => panic!("A has subordinates"),
    }
    assert_eq!(subordinates_of("B", &roles).len(), 1);
}

#[test]
fn test_mutual_reporting_is_a_cycle() {
    let roles = vec![role("A", &["B"]), role("B", &["A"])];
    assert!(has_cycle(&roles));

    // 構築は無限ループせず、循環上のロールを切り離して報告する
    let forest = build_forest(&roles);
    assert!(forest.roots.is_empty());
    assert_eq!(forest.detached_role_ids.len(), 2);
}

#[test]
fn test_long_cycle_path() {
    let roles = vec![
        role("A", &["C"]),
        role("B", &["A"]),
        role("C", &["B"]),
        role("D", &[]),
    ];
    let path = find_cycle(&roles).unwrap();
    assert_eq!(path.first(), path.last());
    assert_eq!(path.len(), 4);
}

#[test]
fn test_builder_accepts_persisted_records() {
    let records: Vec<RoleRecord> = serde_json::from_str(
        r#"[
            {"id": "hr", "name": "HR Head", "permissions": [{"page": "*", "actions": "*"}]},
            {"id": "recruiter", "name": "Recruiter", "reporting_ids": ["hr"]}
        ]"#,
    )
    .unwrap();

    let forest = build_forest(&records);
    assert_eq!(forest.roots.len(), 1);
    assert_eq!(forest.roots[0].children[0].role.name, "Recruiter");
    assert!(!can_delete("hr", &records).is_allowed());
}
