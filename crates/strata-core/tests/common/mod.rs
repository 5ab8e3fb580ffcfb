#![allow(dead_code)]

use strata_core::prelude::*;

pub fn users() -> Table {
    Table::new("users")
        .column(Column::new("id", "int"))
        .primary_key(["id"])
}

/// A small blog schema: users, posts referencing users, sessions, and an
/// audit log referencing sessions.
pub fn blog(dialect: DialectFamily) -> Schema {
    Schema::new("app", dialect)
        .table(
            Table::new("users")
                .column(Column::new("id", "bigint"))
                .column(Column::new("name", "varchar(100)").not_null())
                .column(Column::new("email", "varchar(255)"))
                .primary_key(["id"])
                .index(Index::new("idx_users_email", ["email"]).unique()),
        )
        .table(
            Table::new("posts")
                .column(Column::new("id", "bigint"))
                .column(Column::new("author_id", "bigint").not_null())
                .column(Column::new("title", "text").not_null())
                .column(Column::new("views", "int").not_null().default("0"))
                .primary_key(["id"])
                .index(Index::new("idx_posts_author", ["author_id"]))
                .foreign_key(
                    ForeignKey::new("fk_posts_author", ["author_id"], "users", ["id"])
                        .on_delete(ReferentialAction::Cascade),
                ),
        )
        .table(
            Table::new("sessions")
                .column(Column::new("id", "bigint"))
                .column(Column::new("user_id", "bigint").not_null())
                .column(Column::new("expires_at", "timestamptz"))
                .primary_key(["id"])
                .foreign_key(ForeignKey::new("fk_sessions_user", ["user_id"], "users", ["id"])),
        )
        .table(
            Table::new("audit_log")
                .column(Column::new("id", "bigint"))
                .column(Column::new("session_id", "bigint"))
                .column(Column::new("action", "text").not_null())
                .primary_key(["id"])
                .foreign_key(ForeignKey::new(
                    "fk_audit_session",
                    ["session_id"],
                    "sessions",
                    ["id"],
                )),
        )
}

/// The blog schema after a release: sessions are gone, posts gain tags and a
/// wider view counter, users gain a status enum.
pub fn blog_next(dialect: DialectFamily) -> Schema {
    let mut schema = blog(dialect);
    schema.tables.retain(|t| t.name != "sessions");

    let audit = schema.get_table_mut("audit_log").expect("audit_log");
    audit.foreign_keys.clear();

    let posts = schema.get_table_mut("posts").expect("posts");
    if let Some(views) = posts.get_column_mut("views") {
        views.column_type = ColumnType::parse("bigint");
    }
    posts.columns.push(Column::new("published_at", "timestamptz"));
    posts.indexes.push(Index::new("idx_posts_published", ["published_at"]));

    let users = schema.get_table_mut("users").expect("users");
    users
        .columns
        .push(Column::new("status", ColumnType::enumeration("user_status")).not_null().default("'active'"));

    schema
        .enum_type(EnumType::new("user_status", ["active", "suspended"]))
        .table(
            Table::new("tags")
                .column(Column::new("id", "bigint"))
                .column(Column::new("post_id", "bigint").not_null())
                .column(Column::new("label", "varchar(50)").not_null())
                .primary_key(["id"])
                .index(Index::new("idx_tags_post", ["post_id"]))
                .foreign_key(ForeignKey::new("fk_tags_post", ["post_id"], "posts", ["id"])),
        )
}

/// Diffs, plans and checks that the plan replays `current` into `desired`.
pub fn round_trip(current: &Schema, desired: &Schema, caps: &DialectCapabilities) -> Plan {
    let diff = strata_core::diff(current, desired).expect("diff");
    let plan = strata_core::plan(&diff.changes, caps).expect("plan");
    let applied = plan.apply_to(current).expect("apply");
    assert!(
        applied.structurally_eq(desired),
        "Round-trip failed.\n  Applied: {applied:#?}\n  Desired: {desired:#?}"
    );
    plan
}

/// Group index of the first change of `kind` targeting `target`.
pub fn group_of(plan: &Plan, kind: ChangeKind, target: &str) -> usize {
    plan.group_of(|c| c.kind() == kind && c.target().to_string() == target)
        .unwrap_or_else(|| panic!("No {kind:?} for {target} in plan"))
}
