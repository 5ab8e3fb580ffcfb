//! Dependency graph over planning units.
//!
//! Every step of a unit is described by the schema objects it creates,
//! requires, removes or releases. Edges follow from those facts:
//!
//! - a creator runs before every unit that requires the object;
//! - a unit that releases an object runs before the unit that removes it;
//! - a unit that only removes an object runs before a unit that creates an
//!   object with the same identity.
//!
//! A unit that both removes and creates an object (a rebuild) replaces it
//! and counts as requiring it.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use tracing::debug;

use super::rewrite::{Context, Unit};
use crate::change::{Change, PRIMARY_KEY_NAME};
use crate::error::{Result, StrataError};
use crate::expr;
use crate::schema::{Column, ForeignKey, Index, IndexPart};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Object {
    Table(String),
    Column(String, String),
    Index(String, String),
    Constraint(String, String),
    /// A set of columns that is unique, keyed by its sorted columns.
    Key(String, Vec<String>),
    Enum(String),
    Sequence(String),
}

fn table(name: &str) -> Object {
    Object::Table(name.to_string())
}

fn column(table: &str, name: &str) -> Object {
    Object::Column(table.to_string(), name.to_string())
}

fn constraint(table: &str, name: &str) -> Object {
    Object::Constraint(table.to_string(), name.to_string())
}

fn key<S: AsRef<str>>(table: &str, columns: impl IntoIterator<Item = S>) -> Object {
    let mut columns: Vec<String> = columns.into_iter().map(|c| c.as_ref().to_string()).collect();
    columns.sort();
    Object::Key(table.to_string(), columns)
}

#[derive(Debug, Default)]
struct Facts {
    creates: BTreeSet<Object>,
    requires: BTreeSet<Object>,
    removes: BTreeSet<Object>,
    releases: BTreeSet<Object>,
}

impl Facts {
    fn of_unit(unit: &Unit, ctx: &Context) -> Self {
        let mut facts = Self::default();
        for step in &unit.steps {
            facts.add_change(step, ctx);
        }
        let replaced: Vec<Object> = facts.removes.intersection(&facts.creates).cloned().collect();
        facts.requires.extend(replaced);
        facts
    }

    fn column_needs(&mut self, table_name: &str, col: &Column, ctx: &Context) {
        if let Some(name) = col.logical_type().enum_name() {
            self.requires.insert(Object::Enum(name.to_string()));
        }
        if let Some(default) = &col.default {
            for seq in ctx.sequences.iter().filter(|s| expr::contains_word(default, s)) {
                self.requires.insert(Object::Sequence(seq.clone()));
            }
        }
        if let Some(generated) = &col.generated {
            for id in expr::identifiers(&generated.expr) {
                if id != col.name {
                    self.requires.insert(column(table_name, &id));
                }
            }
        }
    }

    fn column_frees(&mut self, col: &Column, ctx: &Context) {
        if let Some(name) = col.logical_type().enum_name() {
            self.releases.insert(Object::Enum(name.to_string()));
        }
        if let Some(default) = &col.default {
            for seq in ctx.sequences.iter().filter(|s| expr::contains_word(default, s)) {
                self.releases.insert(Object::Sequence(seq.clone()));
            }
        }
    }

    fn index_reads(table_name: &str, index: &Index) -> BTreeSet<Object> {
        let mut read = BTreeSet::new();
        for part in &index.parts {
            match part {
                IndexPart::Column(c) => {
                    read.insert(column(table_name, c));
                }
                IndexPart::Expression(e) => {
                    read.extend(expr::identifiers(e).iter().map(|id| column(table_name, id)));
                }
            }
        }
        if let Some(predicate) = &index.predicate {
            read.extend(expr::identifiers(predicate).iter().map(|id| column(table_name, id)));
        }
        read
    }

    fn index_key(table_name: &str, index: &Index) -> Option<Object> {
        let plain = index.parts.iter().all(|p| matches!(p, IndexPart::Column(_)));
        (index.unique && plain && index.predicate.is_none()).then(|| key(table_name, index.columns()))
    }

    fn foreign_key_reads(table_name: &str, fk: &ForeignKey) -> Vec<Object> {
        let mut read = vec![table(table_name), table(&fk.ref_table)];
        read.extend(fk.columns.iter().map(|c| column(table_name, c)));
        read.extend(fk.ref_columns.iter().map(|c| column(&fk.ref_table, c)));
        read.push(key(&fk.ref_table, &fk.ref_columns));
        read
    }

    #[allow(clippy::too_many_lines)]
    fn add_change(&mut self, change: &Change, ctx: &Context) {
        if let Some(t) = change.table() {
            if !matches!(
                change,
                Change::AddTable { .. } | Change::DropTable { .. } | Change::RenameTable { .. }
            ) {
                self.requires.insert(table(t));
                self.releases.insert(table(t));
            }
        }

        match change {
            Change::AddTable { table: t } => {
                self.creates.insert(table(&t.name));
                for col in &t.columns {
                    self.creates.insert(column(&t.name, &col.name));
                    self.column_needs(&t.name, col, ctx);
                }
                self.requires.retain(|o| !matches!(o, Object::Column(owner, _) if *owner == t.name));
                if let Some(pk) = &t.primary_key {
                    self.creates.insert(key(&t.name, &pk.columns));
                }
                for u in &t.uniques {
                    self.creates.insert(constraint(&t.name, &u.name));
                    self.creates.insert(key(&t.name, &u.columns));
                }
                for c in &t.checks {
                    self.creates.insert(constraint(&t.name, &c.name));
                }
                for fk in &t.foreign_keys {
                    self.creates.insert(constraint(&t.name, &fk.name));
                    if !ctx.in_same_cycle(&t.name, &fk.ref_table) {
                        self.requires.extend(
                            Self::foreign_key_reads(&t.name, fk)
                                .into_iter()
                                .filter(|o| o.owner() != Some(t.name.as_str())),
                        );
                    }
                }
                for i in &t.indexes {
                    self.creates.insert(Object::Index(t.name.clone(), i.name.clone()));
                }
            }
            Change::DropTable { table: t } => {
                self.removes.insert(table(&t.name));
                for col in &t.columns {
                    self.removes.insert(column(&t.name, &col.name));
                    self.column_frees(col, ctx);
                }
                if let Some(pk) = &t.primary_key {
                    self.removes.insert(key(&t.name, &pk.columns));
                }
                for u in &t.uniques {
                    self.removes.insert(constraint(&t.name, &u.name));
                    self.removes.insert(key(&t.name, &u.columns));
                }
                for c in &t.checks {
                    self.removes.insert(constraint(&t.name, &c.name));
                }
                for i in &t.indexes {
                    self.removes.insert(Object::Index(t.name.clone(), i.name.clone()));
                }
                for fk in &t.foreign_keys {
                    self.removes.insert(constraint(&t.name, &fk.name));
                    if fk.ref_table != t.name {
                        self.releases.extend(Self::foreign_key_reads(&t.name, fk));
                    }
                }
                self.releases.retain(|o| o.owner() != Some(t.name.as_str()));
            }
            Change::RenameTable { from, to } => {
                self.removes.insert(table(from));
                self.creates.insert(table(to));
            }
            Change::AddColumn { table: t, column: col } => {
                self.creates.insert(column(t, &col.name));
                self.column_needs(t, col, ctx);
            }
            Change::DropColumn { table: t, column: col } => {
                self.removes.insert(column(t, &col.name));
                self.column_frees(col, ctx);
            }
            Change::RenameColumn { table: t, from, to } => {
                self.removes.insert(column(t, from));
                self.creates.insert(column(t, to));
            }
            Change::ModifyColumn {
                table: t, from, to, ..
            } => {
                self.requires.insert(column(t, &to.name));
                self.column_needs(t, to, ctx);
                self.column_frees(from, ctx);
            }
            Change::AddIndex { table: t, index, .. } => {
                self.creates.insert(Object::Index(t.clone(), index.name.clone()));
                self.requires.extend(Self::index_reads(t, index));
                self.creates.extend(Self::index_key(t, index));
            }
            Change::DropIndex { table: t, index } => {
                self.removes.insert(Object::Index(t.clone(), index.name.clone()));
                self.releases.extend(Self::index_reads(t, index));
                self.removes.extend(Self::index_key(t, index));
            }
            Change::ModifyIndex { table: t, from, to } => {
                self.requires.insert(Object::Index(t.clone(), to.name.clone()));
                self.requires.extend(Self::index_reads(t, to));
                self.releases.extend(Self::index_reads(t, from));
                self.removes.extend(Self::index_key(t, from));
                self.creates.extend(Self::index_key(t, to));
            }
            Change::AddForeignKey { table: t, foreign_key } => {
                self.creates.insert(constraint(t, &foreign_key.name));
                self.requires.extend(Self::foreign_key_reads(t, foreign_key));
            }
            Change::DropForeignKey { table: t, foreign_key } => {
                self.removes.insert(constraint(t, &foreign_key.name));
                self.releases.extend(Self::foreign_key_reads(t, foreign_key));
            }
            Change::AddCheck { table: t, check } => {
                self.creates.insert(constraint(t, &check.name));
                self.requires.extend(expr::identifiers(&check.expr).iter().map(|id| column(t, id)));
            }
            Change::DropCheck { table: t, check } => {
                self.removes.insert(constraint(t, &check.name));
                self.releases.extend(expr::identifiers(&check.expr).iter().map(|id| column(t, id)));
            }
            Change::AddUnique { table: t, unique } => {
                self.creates.insert(constraint(t, &unique.name));
                self.creates.insert(key(t, &unique.columns));
                self.requires.extend(unique.columns.iter().map(|c| column(t, c)));
            }
            Change::DropUnique { table: t, unique } => {
                self.removes.insert(constraint(t, &unique.name));
                self.removes.insert(key(t, &unique.columns));
                self.releases.extend(unique.columns.iter().map(|c| column(t, c)));
            }
            Change::ModifyPrimaryKey { table: t, from, to } => {
                if let Some(pk) = from {
                    let name = pk.name.as_deref().unwrap_or(PRIMARY_KEY_NAME);
                    self.removes.insert(constraint(t, name));
                    self.removes.insert(key(t, &pk.columns));
                    self.releases.extend(pk.columns.iter().map(|c| column(t, c)));
                }
                if let Some(pk) = to {
                    let name = pk.name.as_deref().unwrap_or(PRIMARY_KEY_NAME);
                    self.creates.insert(constraint(t, name));
                    self.creates.insert(key(t, &pk.columns));
                    self.requires.extend(pk.columns.iter().map(|c| column(t, c)));
                }
            }
            Change::AddEnum { enum_type } | Change::ModifyEnum { to: enum_type, .. } => {
                self.creates.insert(Object::Enum(enum_type.name.clone()));
            }
            Change::DropEnum { enum_type } => {
                self.removes.insert(Object::Enum(enum_type.name.clone()));
            }
            Change::AddSequence { sequence } | Change::ModifySequence { to: sequence, .. } => {
                self.creates.insert(Object::Sequence(sequence.name.clone()));
            }
            Change::DropSequence { sequence } => {
                self.removes.insert(Object::Sequence(sequence.name.clone()));
            }
            Change::AlterTableOptions { .. } | Change::ModifyTable { .. } => {}
        }
    }
}

impl Object {
    fn owner(&self) -> Option<&str> {
        match self {
            Self::Table(t)
            | Self::Column(t, _)
            | Self::Index(t, _)
            | Self::Constraint(t, _)
            | Self::Key(t, _) => Some(t),
            Self::Enum(_) | Self::Sequence(_) => None,
        }
    }
}

/// Directed graph over unit indexes; an edge `a -> b` means `a` runs first.
#[derive(Debug)]
pub(crate) struct Graph {
    preds: Vec<BTreeSet<usize>>,
    succs: Vec<BTreeSet<usize>>,
}

#[derive(Default)]
struct Roles {
    creators: Vec<usize>,
    requirers: Vec<usize>,
    removers: Vec<usize>,
    releasers: Vec<usize>,
}

impl Graph {
    /// Derives the edges between units from their facts.
    pub fn build(units: &[Unit], ctx: &Context) -> Self {
        let facts: Vec<Facts> = units.iter().map(|u| Facts::of_unit(u, ctx)).collect();

        let mut roles: BTreeMap<&Object, Roles> = BTreeMap::new();
        for (i, f) in facts.iter().enumerate() {
            for o in &f.creates {
                roles.entry(o).or_default().creators.push(i);
            }
            for o in &f.requires {
                roles.entry(o).or_default().requirers.push(i);
            }
            for o in &f.removes {
                roles.entry(o).or_default().removers.push(i);
            }
            for o in &f.releases {
                roles.entry(o).or_default().releasers.push(i);
            }
        }

        let mut graph = Self {
            preds: vec![BTreeSet::new(); units.len()],
            succs: vec![BTreeSet::new(); units.len()],
        };
        for (object, r) in &roles {
            for &c in &r.creators {
                for &q in &r.requirers {
                    graph.edge(c, q);
                }
            }
            for &d in &r.removers {
                let replaces = facts[d].creates.contains(*object);
                for &l in &r.releasers {
                    if !(replaces && facts[l].requires.contains(*object)) {
                        graph.edge(l, d);
                    }
                }
                if !replaces {
                    for &c in &r.creators {
                        graph.edge(d, c);
                    }
                }
            }
        }
        graph
    }

    fn edge(&mut self, from: usize, to: usize) {
        if from != to {
            self.succs[from].insert(to);
            self.preds[to].insert(from);
        }
    }

    /// Units that must run before `unit`.
    pub fn preds(&self, unit: usize) -> &BTreeSet<usize> {
        &self.preds[unit]
    }

    /// Topologically sorts the selected units.
    ///
    /// Ready units are taken by (kind priority, object name, index), so the
    /// order only depends on the units themselves.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::CircularDependency`] naming one cycle among the
    /// units that could not be ordered.
    pub fn order(&self, units: &[Unit], selected: &[usize]) -> Result<Vec<usize>> {
        let members: BTreeSet<usize> = selected.iter().copied().collect();
        let mut in_degree: BTreeMap<usize, usize> = members
            .iter()
            .map(|&u| (u, self.preds[u].intersection(&members).count()))
            .collect();

        let entry = |u: usize| {
            let primary = &units[u].primary;
            Reverse((primary.kind().priority(), primary.target().to_string(), u))
        };
        let mut ready: BinaryHeap<_> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(&u, _)| entry(u))
            .collect();

        let mut order = Vec::with_capacity(members.len());
        while let Some(Reverse((_, _, u))) = ready.pop() {
            order.push(u);
            for &s in self.succs[u].intersection(&members) {
                if let Some(d) = in_degree.get_mut(&s) {
                    *d -= 1;
                    if *d == 0 {
                        ready.push(entry(s));
                    }
                }
            }
        }

        if order.len() == members.len() {
            return Ok(order);
        }
        let placed: BTreeSet<usize> = order.iter().copied().collect();
        let left: BTreeSet<usize> = members.difference(&placed).copied().collect();
        Err(StrataError::CircularDependency(
            self.find_cycle(&left)
                .into_iter()
                .map(|u| units[u].primary.description())
                .collect(),
        ))
    }

    /// Walks predecessors inside `left` until a unit repeats.
    fn find_cycle(&self, left: &BTreeSet<usize>) -> Vec<usize> {
        let Some(&start) = left.iter().next() else {
            return Vec::new();
        };
        let mut path = vec![start];
        let mut seen = BTreeMap::from([(start, 0)]);
        let mut current = start;
        while let Some(&p) = self.preds[current].intersection(left).next() {
            if let Some(&at) = seen.get(&p) {
                let mut cycle = path.split_off(at);
                cycle.reverse();
                return cycle;
            }
            seen.insert(p, path.len());
            path.push(p);
            current = p;
        }
        path
    }
}

struct Tarjan<'a> {
    edges: &'a BTreeMap<String, BTreeSet<String>>,
    next: usize,
    index: BTreeMap<&'a str, usize>,
    low: BTreeMap<&'a str, usize>,
    stack: Vec<&'a str>,
    on_stack: BTreeSet<&'a str>,
    components: Vec<BTreeSet<String>>,
}

impl<'a> Tarjan<'a> {
    fn visit(&mut self, v: &'a str) {
        self.index.insert(v, self.next);
        self.low.insert(v, self.next);
        self.next += 1;
        self.stack.push(v);
        self.on_stack.insert(v);

        let edges = self.edges;
        for w in edges.get(v).into_iter().flatten() {
            let w = w.as_str();
            let reached = if let Some(&i) = self.index.get(w) {
                self.on_stack.contains(w).then_some(i)
            } else {
                self.visit(w);
                self.low.get(w).copied()
            };
            if let (Some(r), Some(l)) = (reached, self.low.get_mut(v)) {
                *l = (*l).min(r);
            }
        }

        if self.low.get(v) == self.index.get(v) {
            let mut component = BTreeSet::new();
            while let Some(w) = self.stack.pop() {
                self.on_stack.remove(w);
                component.insert(w.to_string());
                if w == v {
                    break;
                }
            }
            self.components.push(component);
        }
    }
}

/// Strongly connected components with more than one member.
pub(crate) fn cycles(edges: &BTreeMap<String, BTreeSet<String>>) -> Vec<BTreeSet<String>> {
    let mut tarjan = Tarjan {
        edges,
        next: 0,
        index: BTreeMap::new(),
        low: BTreeMap::new(),
        stack: Vec::new(),
        on_stack: BTreeSet::new(),
        components: Vec::new(),
    };
    for v in edges.keys() {
        if !tarjan.index.contains_key(v.as_str()) {
            tarjan.visit(v);
        }
    }
    tarjan.components.retain(|c| c.len() > 1);
    tarjan.components
}

pub(crate) fn component_of(components: &[BTreeSet<String>]) -> BTreeMap<String, usize> {
    components
        .iter()
        .enumerate()
        .flat_map(|(i, c)| c.iter().map(move |t| (t.clone(), i)))
        .collect()
}

/// Marks every AddForeignKey unit owned by a table of a foreign-key cycle as
/// deferred to the final group.
pub(crate) fn defer_foreign_key_cycles(units: &mut [Unit]) {
    let mut edges: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for unit in units.iter() {
        if let Change::AddForeignKey { table, foreign_key } = &unit.primary {
            if *table != foreign_key.ref_table {
                edges
                    .entry(table.clone())
                    .or_default()
                    .insert(foreign_key.ref_table.clone());
            }
        }
    }
    let component = component_of(&cycles(&edges));
    if component.is_empty() {
        return;
    }
    for unit in units.iter_mut() {
        if let Change::AddForeignKey { table, foreign_key } = &unit.primary {
            if component.contains_key(table) {
                debug!(table = %table, foreign_key = %foreign_key.name, "Deferred foreign key of cycle table");
                unit.deferred = true;
            }
        }
    }
}

/// Splits foreign keys out of dropped tables that reference each other in a
/// cycle, so each table can be dropped once nothing references it.
pub(crate) fn break_drop_cycles(units: &mut Vec<Unit>) {
    let dropped: BTreeSet<String> = units
        .iter()
        .filter_map(|u| match &u.primary {
            Change::DropTable { table } => Some(table.name.clone()),
            _ => None,
        })
        .collect();

    let mut edges: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for unit in units.iter() {
        if let Change::DropTable { table } = &unit.primary {
            for fk in &table.foreign_keys {
                if fk.ref_table != table.name && dropped.contains(&fk.ref_table) {
                    edges
                        .entry(table.name.clone())
                        .or_default()
                        .insert(fk.ref_table.clone());
                }
            }
        }
    }
    let component = component_of(&cycles(&edges));
    if component.is_empty() {
        return;
    }

    let mut split = Vec::new();
    for unit in units.iter_mut() {
        let Change::DropTable { table } = &mut unit.primary else {
            continue;
        };
        let Some(&c) = component.get(&table.name) else {
            continue;
        };
        let name = table.name.clone();
        let (cut, kept): (Vec<ForeignKey>, Vec<ForeignKey>) = std::mem::take(&mut table.foreign_keys)
            .into_iter()
            .partition(|fk| fk.ref_table != name && component.get(&fk.ref_table) == Some(&c));
        table.foreign_keys = kept;
        unit.steps = vec![unit.primary.clone()];
        for fk in cut {
            debug!(table = %name, foreign_key = %fk.name, "Dropping foreign key ahead of table cycle");
            let mut drop = Unit::native(Change::drop_foreign_key(name.as_str(), fk));
            drop.synthesized = true;
            split.push(drop);
        }
    }
    units.extend(split);
}
