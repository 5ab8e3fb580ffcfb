//! Human-readable and JSON rendering of diffs, plans and diagnostics.

use std::fmt::Write;

use serde::Serialize;
use strata_core::diff::SchemaDiff;
use strata_core::history::{HistorySum, MigrationRecord};
use strata_core::lint::{LintReport, Severity};
use strata_core::plan::Plan;

/// JSON document printed by `strata plan --json`.
#[derive(Debug, Serialize)]
pub struct PlanOutput<'a> {
    /// The plan.
    pub plan: &'a Plan,
    /// Diagnostics for the plan.
    pub lint: &'a LintReport,
}

fn marker(severity: Severity) -> &'static str {
    match severity {
        Severity::Notice => " ",
        Severity::Warning => "!",
        Severity::Destructive => "X",
    }
}

/// Renders the changes and findings of a diff.
#[must_use]
pub fn render_diff(diff: &SchemaDiff) -> String {
    let mut out = String::new();
    if diff.is_empty() {
        out.push_str("Schemas are identical.\n");
    }
    for change in &diff.changes {
        let _ = writeln!(out, "{change}");
        if let strata_core::change::Change::ModifyTable { changes, .. } = change {
            for sub in changes {
                let _ = writeln!(out, "  {sub}");
            }
        }
    }
    for ambiguous in &diff.ambiguous {
        let _ = writeln!(
            out,
            "ambiguous {} rename of '{}': {} (score {:.2})",
            ambiguous.scope,
            ambiguous.dropped,
            ambiguous.candidates.join(", "),
            ambiguous.score
        );
    }
    for warning in &diff.warnings {
        let _ = writeln!(out, "warning: {}", serde_json::to_string(warning).unwrap_or_default());
    }
    out
}

/// Renders a plan group by group, with each change's diagnostics beneath it.
#[must_use]
pub fn render_plan(plan: &Plan, lint: &LintReport) -> String {
    let mut out = String::new();
    if plan.is_empty() {
        out.push_str("Nothing to do.\n");
        return out;
    }

    let mut position = 0;
    for (g, group) in plan.groups.iter().enumerate() {
        let _ = writeln!(
            out,
            "Group {} ({}, lock: {}{})",
            g + 1,
            if group.transactional { "transactional" } else { "no transaction" },
            group.lock,
            if group.reversible { "" } else { ", irreversible" }
        );
        let _ = writeln!(out, "{:-<60}", "");
        for planned in &group.changes {
            let via = planned
                .rewrite
                .and_then(|r| plan.rewrites.get(r))
                .map(|r| format!("  [rewrite: {}]", r.capability))
                .unwrap_or_default();
            let _ = writeln!(out, "  {}{via}", planned.change);
            for diagnostic in lint.iter().filter(|d| d.position == position) {
                if diagnostic.severity > Severity::Notice {
                    let _ = writeln!(out, "    {} {}", marker(diagnostic.severity), diagnostic.message);
                }
            }
            position += 1;
        }
        out.push('\n');
    }
    out.push_str(&render_summary(lint));
    out
}

/// Renders every diagnostic on its own line.
#[must_use]
pub fn render_lint(lint: &LintReport) -> String {
    let mut out = String::new();
    for diagnostic in lint.iter() {
        let _ = writeln!(out, "{} {diagnostic}", marker(diagnostic.severity));
    }
    out.push_str(&render_summary(lint));
    out
}

fn render_summary(lint: &LintReport) -> String {
    format!(
        "{} destructive, {} warning(s), {} notice(s)\n",
        lint.count(Severity::Destructive),
        lint.count(Severity::Warning),
        lint.count(Severity::Notice)
    )
}

/// Renders the computed hash of each record and the history sum.
#[must_use]
pub fn render_hashes(records: &[MigrationRecord], sum: &HistorySum) -> String {
    let mut out = String::new();
    for record in records {
        let status = if record.hash.is_empty() || record.is_intact() {
            ""
        } else {
            "  (recorded hash differs)"
        };
        let _ = writeln!(out, "{:>14} {} {}{status}", record.version, record.computed_hash(), record.description);
    }
    out.push('\n');
    out.push_str(&sum.to_string());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::prelude::*;

    fn plan_for(changes: &[Change]) -> (Plan, LintReport) {
        let plan = strata_core::plan(changes, &DialectCapabilities::postgres()).unwrap();
        let lint = strata_core::lint(&plan);
        (plan, lint)
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render_diff(&SchemaDiff::default()), "Schemas are identical.\n");
        let (plan, lint) = plan_for(&[]);
        assert_eq!(render_plan(&plan, &lint), "Nothing to do.\n");
    }

    #[test]
    fn test_render_plan_marks_findings() {
        let users = Table::new("users").column(Column::new("id", "bigint")).primary_key(["id"]);
        let (plan, lint) = plan_for(&[
            Change::drop_table(users),
            Change::add_column("posts", Column::new("slug", "text")),
        ]);
        let out = render_plan(&plan, &lint);
        assert!(out.starts_with("Group 1 (transactional, lock: exclusive, irreversible)"));
        assert!(out.contains("    X "));
        assert!(out.ends_with("1 destructive, 0 warning(s), 1 notice(s)\n"));
    }

    #[test]
    fn test_plan_output_json() {
        let (plan, lint) = plan_for(&[Change::add_column("posts", Column::new("slug", "text"))]);
        let json = serde_json::to_value(PlanOutput { plan: &plan, lint: &lint }).unwrap();
        assert_eq!(json["plan"]["family"], "postgres");
        assert_eq!(json["lint"]["diagnostics"][0]["reason"], "ADDITIVE");
    }
}
