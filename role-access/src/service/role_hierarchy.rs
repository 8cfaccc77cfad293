// role-access/src/service/role_hierarchy.rs
//
// フラットなロール一覧から報告ツリー（フォレスト）を構築する

use crate::domain::role_model::RoleLink;
use crate::log_with_context;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// フォレストのノード（ロール本体 + 子ノード）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleNode<R> {
    #[serde(flatten)]
    pub role: R,
    pub children: Vec<RoleNode<R>>,
}

// 深い報告チェーンでも再帰的な解放にならないよう、子を平らに取り出してから破棄する
impl<R> Drop for RoleNode<R> {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

/// 報告ツリーの集合
///
/// 読み取りのたびに構築し直す派生データ。元のロール一覧とは独立して変更しない。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleForest<R> {
    pub roots: Vec<RoleNode<R>>,
    /// 主たる上長の連鎖が循環していて、どのルートからも到達できないロール
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub detached_role_ids: Vec<String>,
}

impl<R: RoleLink> RoleForest<R> {
    /// 深さ優先でノードを列挙（`(深さ, ノード)`）
    ///
    /// 同じIDに再度入った場合はそこで打ち切る。
    pub fn walk(&self) -> Vec<(usize, &RoleNode<R>)> {
        let mut visited = HashSet::new();
        let mut out = Vec::new();
        let mut stack: Vec<(usize, &RoleNode<R>)> =
            self.roots.iter().rev().map(|node| (0, node)).collect();

        while let Some((depth, node)) = stack.pop() {
            if !visited.insert(node.role.role_id()) {
                log_with_context!(
                    tracing::Level::WARN,
                    "Role visited twice while walking the forest",
                    "role_id" => node.role.role_id()
                );
                continue;
            }
            out.push((depth, node));
            stack.extend(node.children.iter().rev().map(|child| (depth + 1, child)));
        }
        out
    }

    /// フォレストに含まれるノード数
    pub fn len(&self) -> usize {
        self.walk().len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn find(&self, role_id: &str) -> Option<&RoleNode<R>> {
        self.walk()
            .into_iter()
            .map(|(_, node)| node)
            .find(|node| node.role.role_id() == role_id)
    }
}

/// ロール一覧からフォレストを構築
///
/// 親は `reporting_ids` の先頭だけで決める。先頭が空・未解決・自分自身ならルートになる。
/// 入力順は子の並び順として保たれる。同じIDが重複していれば最初のものを使う。
pub fn build_forest<R>(roles: &[R]) -> RoleForest<R>
where
    R: RoleLink + Clone,
{
    let mut index: HashMap<&str, usize> = HashMap::new();
    for (i, role) in roles.iter().enumerate() {
        index.entry(role.role_id()).or_insert(i);
    }

    let mut roots = Vec::new();
    let mut children: HashMap<usize, Vec<usize>> = HashMap::new();
    for (i, role) in roles.iter().enumerate() {
        if index.get(role.role_id()) != Some(&i) {
            log_with_context!(
                tracing::Level::WARN,
                "Duplicate role id ignored while building forest",
                "role_id" => role.role_id()
            );
            continue;
        }
        let parent = role
            .primary_manager_id()
            .filter(|id| *id != role.role_id())
            .and_then(|id| index.get(id).copied());
        match parent {
            Some(parent) => children.entry(parent).or_default().push(i),
            None => roots.push(i),
        }
    }

    let mut placed = HashSet::new();
    let roots: Vec<RoleNode<R>> = roots
        .into_iter()
        .filter_map(|i| assemble(i, roles, &children, &mut placed))
        .collect();

    let detached_role_ids: Vec<String> = index
        .values()
        .filter(|i| !placed.contains(*i))
        .map(|&i| roles[i].role_id().to_string())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();

    if !detached_role_ids.is_empty() {
        log_with_context!(
            tracing::Level::WARN,
            "Roles on a reporting cycle were left out of the forest",
            "role_ids" => detached_role_ids.join(",")
        );
    }

    RoleForest {
        roots,
        detached_role_ids,
    }
}

/// `root` 以下の部分木を組み立てる
///
/// 先行順で対象を集めてから逆順に組み立てるので、チェーンの深さに関係なく再帰しない。
fn assemble<R: RoleLink + Clone>(
    root: usize,
    roles: &[R],
    children: &HashMap<usize, Vec<usize>>,
    placed: &mut HashSet<usize>,
) -> Option<RoleNode<R>> {
    let mut order = Vec::new();
    let mut stack = vec![root];
    while let Some(i) = stack.pop() {
        if !placed.insert(i) {
            continue;
        }
        order.push(i);
        if let Some(kids) = children.get(&i) {
            stack.extend(kids.iter().rev().filter(|k| !placed.contains(*k)));
        }
    }

    let mut built: HashMap<usize, RoleNode<R>> = HashMap::new();
    for &i in order.iter().rev() {
        let kids: Vec<RoleNode<R>> = children
            .get(&i)
            .map(|kids| kids.iter().filter_map(|k| built.remove(k)).collect())
            .unwrap_or_default();
        built.insert(
            i,
            RoleNode {
                role: roles[i].clone(),
                children: kids,
            },
        );
    }
    built.remove(&root)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// 報告関係の循環を探す
///
/// 全ての報告先（主たる上長以外も含む）を辺とみなす。見つかれば `[A, B, A]` のような
/// 経路を返す。自己参照は長さ1の循環。未解決のIDは無視する。
pub fn find_cycle<R: RoleLink>(roles: &[R]) -> Option<Vec<String>> {
    let graph = Graph::new(roles);
    let mut marks = HashMap::new();
    roles
        .iter()
        .find_map(|role| graph.search(role.role_id(), &mut marks))
}

/// 指定ロールから辿れる循環を探す（書き込み前の検査用）
pub fn find_cycle_from<R: RoleLink>(start_id: &str, roles: &[R]) -> Option<Vec<String>> {
    let graph = Graph::new(roles);
    graph.search(start_id, &mut HashMap::new())
}

pub fn has_cycle<R: RoleLink>(roles: &[R]) -> bool {
    find_cycle(roles).is_some()
}

struct Graph<'a> {
    edges: HashMap<&'a str, &'a [String]>,
}

impl<'a> Graph<'a> {
    fn new<R: RoleLink>(roles: &'a [R]) -> Self {
        let mut edges = HashMap::new();
        for role in roles {
            edges.entry(role.role_id()).or_insert(role.reporting_ids());
        }
        Self { edges }
    }

    /// 三色の深さ優先探索（明示的なスタックで辿る）
    ///
    /// スタックの各要素は `(ロールID, 報告先, 次に見る報告先の位置)`。
    /// スタック上のIDの並びがそのまま現在の経路になる。
    fn search(&self, start: &'a str, marks: &mut HashMap<&'a str, Mark>) -> Option<Vec<String>> {
        if marks.contains_key(start) {
            return None;
        }
        let managers: &'a [String] = self.edges.get(start).copied()?;
        marks.insert(start, Mark::Visiting);
        let mut stack: Vec<(&'a str, &'a [String], usize)> = vec![(start, managers, 0)];

        while let Some(top) = stack.last_mut() {
            let (id, managers, next) = *top;
            let Some(manager) = managers.get(next) else {
                marks.insert(id, Mark::Done);
                stack.pop();
                continue;
            };
            top.2 += 1;

            let manager = manager.as_str();
            match marks.get(manager) {
                Some(Mark::Done) => {}
                Some(Mark::Visiting) => {
                    let from = stack.iter().position(|(p, _, _)| *p == manager).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        stack[from..].iter().map(|(p, _, _)| p.to_string()).collect();
                    cycle.push(manager.to_string());
                    return Some(cycle);
                }
                None => {
                    // 未解決のIDは辺として扱わない
                    if let Some(next_managers) = self.edges.get(manager).copied() {
                        marks.insert(manager, Mark::Visiting);
                        stack.push((manager, next_managers, 0));
                    }
                }
            }
        }
        None
    }
}
