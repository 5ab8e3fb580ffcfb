//! Grouping ordered units into execution groups.
//!
//! Units that touch the same owner (a table, enum or sequence) share a group
//! whenever their dependencies allow it. Otherwise a unit that depends on a
//! different owner's unit in the open group starts a new group, so a drop
//! runs after the group that released what it drops has committed.

use std::collections::BTreeMap;

use super::graph::Graph;
use super::rewrite::Unit;

/// A group before its changes are materialized.
#[derive(Debug, Default)]
pub(crate) struct Draft {
    pub units: Vec<usize>,
    pub standalone: bool,
}

fn owner(unit: &Unit) -> String {
    let target = unit.primary.target();
    match target.table() {
        Some(table) => format!("table:{table}"),
        None => format!("type:{target}"),
    }
}

/// Assigns each unit of `order` to a group.
///
/// `order` must be topologically sorted. Standalone units get a group of
/// their own. A group grows up to `max_size` units, except that a unit whose
/// owner already has a group joins it regardless of size.
pub(crate) fn assign(units: &[Unit], order: &[usize], graph: &Graph, max_size: usize) -> Vec<Draft> {
    let mut groups: Vec<Draft> = Vec::new();
    let mut placed: BTreeMap<usize, usize> = BTreeMap::new();
    let mut owner_group: BTreeMap<String, usize> = BTreeMap::new();

    for &u in order {
        let floor = graph.preds(u).iter().filter_map(|p| placed.get(p)).max().copied();

        if units[u].standalone {
            groups.push(Draft {
                units: vec![u],
                standalone: true,
            });
            placed.insert(u, groups.len() - 1);
            continue;
        }

        let own = owner(&units[u]);
        let joined = match owner_group.get(&own) {
            Some(&g) if floor.is_none_or(|f| f <= g) => Some(g),
            _ => groups.len().checked_sub(1).filter(|&g| {
                let open = &groups[g];
                let related = graph
                    .preds(u)
                    .iter()
                    .any(|p| placed.get(p) == Some(&g) && owner(&units[*p]) != own);
                !open.standalone && open.units.len() < max_size && !related
            }),
        };

        let g = joined.unwrap_or_else(|| {
            groups.push(Draft::default());
            groups.len() - 1
        });
        groups[g].units.push(u);
        placed.insert(u, g);
        owner_group.insert(own, g);
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::Change;
    use crate::plan::rewrite::Context;
    use crate::schema::{Column, ForeignKey, Table};

    fn draft(changes: Vec<Change>, max_size: usize) -> Vec<Vec<String>> {
        let units: Vec<Unit> = changes.into_iter().map(Unit::native).collect();
        let graph = Graph::build(&units, &Context::default());
        let all: Vec<usize> = (0..units.len()).collect();
        let order = graph.order(&units, &all).unwrap();
        assign(&units, &order, &graph, max_size)
            .into_iter()
            .map(|d| d.units.iter().map(|&u| units[u].primary.target().to_string()).collect())
            .collect()
    }

    #[test]
    fn test_unrelated_changes_share_a_group() {
        let groups = draft(
            vec![
                Change::add_column("a", Column::new("x", "int")),
                Change::add_column("b", Column::new("y", "int")),
            ],
            64,
        );
        assert_eq!(groups, vec![vec!["a.x", "b.y"]]);
    }

    #[test]
    fn test_cross_object_dependency_splits() {
        let sessions = Table::new("sessions").column(Column::new("id", "int")).primary_key(["id"]);
        let groups = draft(
            vec![
                Change::drop_table(sessions),
                Change::drop_foreign_key(
                    "audit_log",
                    ForeignKey::new("fk_session", ["session_id"], "sessions", ["id"]),
                ),
            ],
            64,
        );
        assert_eq!(groups, vec![vec!["audit_log.fk_session"], vec!["sessions"]]);
    }

    #[test]
    fn test_max_size_does_not_split_an_owner() {
        let groups = draft(
            vec![
                Change::add_column("a", Column::new("x", "int")),
                Change::add_column("a", Column::new("y", "int")),
                Change::add_column("b", Column::new("z", "int")),
            ],
            1,
        );
        assert_eq!(groups, vec![vec!["a.x", "a.y"], vec!["b.z"]]);
    }
}
