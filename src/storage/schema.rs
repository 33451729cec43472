//! Database schema definitions.
//!
//! Two kinds of schema live here:
//!
//! - [`SCHEMA_SQL`]: the bookkeeping tables sheetsync owns outright (the
//!   change log), applied on every open.
//! - [`CanonicalSchema`]: the expected shape of each destination table. The
//!   body is used verbatim for `CREATE TABLE` and parsed column by column for
//!   drift repair (see [`super::migrations`]).
//!
//! Dates are stored as `YYYY-MM-DD` text, amounts as REAL. Change-log
//! timestamps are INTEGER Unix milliseconds.

use rusqlite::{Connection, Result};

use crate::error::Error;
use crate::validate::quote_identifier;

pub const CREATED_AT_COLUMN: &str = "created_at";
pub const UPDATED_AT_COLUMN: &str = "updated_at";

/// Tables owned by sheetsync itself.
pub const SCHEMA_SQL: &str = r"
-- Field-level audit trail for upserts. Append-only.
CREATE TABLE IF NOT EXISTS change_log (
    log_id INTEGER PRIMARY KEY AUTOINCREMENT,
    table_name TEXT NOT NULL,
    record_id INTEGER NOT NULL,
    field_name TEXT NOT NULL,
    old_value TEXT,
    new_value TEXT,
    changed_at INTEGER NOT NULL,
    changed_by TEXT NOT NULL,
    change_type TEXT NOT NULL DEFAULT 'UPDATE'
);

CREATE INDEX IF NOT EXISTS idx_change_log_record ON change_log(table_name, record_id);
CREATE INDEX IF NOT EXISTS idx_change_log_changed_at ON change_log(changed_at);
";

/// Apply pragmas and the bookkeeping schema.
///
/// # Errors
///
/// Returns an error if a pragma or the DDL fails.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

// ── Canonical schemas ────────────────────────────────────────

/// Expected structure of one destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalSchema {
    pub table: &'static str,
    pub identity_column: &'static str,
    /// Column and table-constraint definitions, without the surrounding
    /// `CREATE TABLE ( ... )`.
    pub body: &'static str,
}

/// Expense-reimbursement forms, one row per form line.
pub const EXPEND_FORM_SCHEMA: CanonicalSchema = CanonicalSchema {
    table: "expend_form",
    identity_column: "ef_id",
    body: r#"
    "ef_id" INTEGER PRIMARY KEY AUTOINCREMENT,
    "form_type" TEXT,
    "form_no" TEXT NOT NULL,
    "form_status" TEXT,
    "applicant_name" TEXT,
    "applicant_email" TEXT,
    "applicant_dept" TEXT,
    "apply_date" DATE,
    "cost_owner" TEXT,
    "reason" TEXT,
    "budget" TEXT,
    "form_total" DECIMAL(18, 2),
    "advance_total" DECIMAL(18, 2),
    "card_total" DECIMAL(18, 2),
    "payment_reason" TEXT,
    "payment_due_date" DATE,
    "payment_status" TEXT,
    "actual_payment_date" DATE,
    "payee" TEXT,
    "payee_tax_id" TEXT,
    "payment_amount" DECIMAL(18, 2),
    "payment_method" TEXT,
    "bank_account_name" TEXT,
    "bank_code" TEXT,
    "bank_name" TEXT,
    "bank_account_no" TEXT,
    "expense_item" TEXT,
    "transaction_date" DATE,
    "remark" TEXT,
    "item_currency" TEXT,
    "item_amount" DECIMAL(18, 2),
    "exchange_rate" DECIMAL(18, 6),
    "local_currency" TEXT,
    "local_amount" DECIMAL(18, 2),
    "allocation_dept" TEXT,
    "allocation_amount" DECIMAL(18, 2),
    "voucher_type" TEXT,
    "invoice_no" TEXT,
    "invoice_date" DATE,
    "tax_amount" DECIMAL(18, 2),
    "invoice_net_amount" DECIMAL(18, 2),
    "invoice_gross_amount" DECIMAL(18, 2),
    "buyer_tax_id" TEXT,
    "seller_tax_id" TEXT,
    "posting_status" TEXT,
    "voucher_no" TEXT,
    "voucher_date" DATE,
    "account_code" TEXT,
    "account_name" TEXT,
    "account_amount" DECIMAL(18, 2),
    "created_at" DATETIME DEFAULT CURRENT_TIMESTAMP,
    "updated_at" DATETIME DEFAULT CURRENT_TIMESTAMP
"#,
};

/// Daily work-order quantities.
pub const ROAD_CONSTRUCTION_SCHEMA: CanonicalSchema = CanonicalSchema {
    table: "road_construction_form",
    identity_column: "rc_id",
    body: r#"
    "rc_id" INTEGER PRIMARY KEY AUTOINCREMENT,
    "work_order_no" TEXT NOT NULL,
    "vendor_name" TEXT,
    "item_name" TEXT NOT NULL,
    "unit" TEXT,
    "unit_price" DECIMAL(18, 2),
    "work_date" DATE NOT NULL,
    "quantity" DECIMAL(18, 2) NOT NULL DEFAULT 0,
    "remark" TEXT,
    "is_updated" BIT DEFAULT 0,
    "created_at" DATETIME DEFAULT CURRENT_TIMESTAMP,
    "updated_at" DATETIME DEFAULT CURRENT_TIMESTAMP,
    CONSTRAINT "uq_road_construction_key" UNIQUE ("work_order_no", "vendor_name", "item_name", "work_date")
"#,
};

/// Every table the engine may write to.
pub const REGISTERED_SCHEMAS: &[CanonicalSchema] = &[EXPEND_FORM_SCHEMA, ROAD_CONSTRUCTION_SCHEMA];

/// Look up the canonical schema for a table name.
///
/// This is the allow-list for table identifiers: nothing outside it ever
/// reaches SQL.
///
/// # Errors
///
/// Returns [`Error::UnknownTable`] for unregistered names.
pub fn schema_for(table: &str) -> std::result::Result<&'static CanonicalSchema, Error> {
    REGISTERED_SCHEMAS
        .iter()
        .find(|s| s.table.eq_ignore_ascii_case(table))
        .ok_or_else(|| Error::UnknownTable {
            table: table.to_string(),
        })
}

#[must_use]
pub fn registered_table_names() -> Vec<&'static str> {
    REGISTERED_SCHEMAS.iter().map(|s| s.table).collect()
}

impl CanonicalSchema {
    /// `CREATE TABLE IF NOT EXISTS` statement built from the body.
    ///
    /// # Errors
    ///
    /// Returns an error if the table name cannot be quoted.
    pub fn create_sql(&self) -> std::result::Result<String, Error> {
        Ok(format!(
            "CREATE TABLE IF NOT EXISTS {} ({}\n)",
            quote_identifier(self.table)?,
            self.body.trim_end()
        ))
    }

    /// Column definitions, table constraints excluded.
    #[must_use]
    pub fn columns(&self) -> Vec<ColumnDef> {
        split_definitions(self.body)
            .into_iter()
            .filter_map(|def| ColumnDef::parse(&def))
            .collect()
    }
}

// ── Definition parsing ───────────────────────────────────────

/// One column definition from a canonical body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    /// Full definition text, name included, as it appears in the body.
    pub definition: String,
}

const TABLE_CONSTRAINT_KEYWORDS: &[&str] = &["CONSTRAINT", "PRIMARY", "UNIQUE", "CHECK", "FOREIGN"];

impl ColumnDef {
    /// Parse a single definition. Returns `None` for table-level
    /// constraints and blank input.
    #[must_use]
    pub fn parse(definition: &str) -> Option<Self> {
        let definition = definition.trim();
        let (name, quoted) = leading_identifier(definition)?;
        if !quoted
            && TABLE_CONSTRAINT_KEYWORDS
                .iter()
                .any(|k| name.eq_ignore_ascii_case(k))
        {
            return None;
        }
        Some(Self {
            name,
            definition: definition.to_string(),
        })
    }

    /// Definition text after the column name, upper-cased.
    fn constraints(&self) -> String {
        skip_identifier(&self.definition).to_uppercase()
    }

    /// Whether `ALTER TABLE .. ADD COLUMN` can add this column to a table
    /// that already holds rows.
    ///
    /// SQLite rejects keys, uniqueness and identity on added columns, and
    /// only accepts constant defaults.
    #[must_use]
    pub fn is_retrofittable(&self) -> bool {
        let upper = self.constraints();
        let forbidden = ["PRIMARY KEY", "AUTOINCREMENT", "IDENTITY", "UNIQUE"];
        if forbidden.iter().any(|k| upper.contains(k)) {
            return false;
        }
        match upper.find("DEFAULT") {
            Some(pos) => {
                let value = upper[pos + "DEFAULT".len()..].trim_start();
                !(value.starts_with('(')
                    || value.starts_with("CURRENT_")
                    || value.starts_with("GETDATE")
                    || value.starts_with("NOW"))
            }
            None => true,
        }
    }
}

/// Split a definition body on top-level commas.
///
/// Commas inside parentheses (`DECIMAL(18, 2)`, `UNIQUE (a, b)`) or inside
/// quoted identifiers and string literals do not split.
#[must_use]
pub fn split_definitions(body: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut closing: Option<char> = None;

    for c in body.chars() {
        if let Some(close) = closing {
            current.push(c);
            if c == close {
                closing = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => {
                closing = Some(c);
                current.push(c);
            }
            '[' => {
                closing = Some(']');
                current.push(c);
            }
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    parts.push(current);

    parts
        .into_iter()
        .map(|p| p.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|p| !p.is_empty())
        .collect()
}

/// First identifier of a definition and whether it was quoted.
fn leading_identifier(def: &str) -> Option<(String, bool)> {
    let def = def.trim_start();
    let mut chars = def.chars();
    let first = chars.next()?;
    let close = match first {
        '"' => '"',
        '`' => '`',
        '[' => ']',
        _ => {
            let name: String = def.chars().take_while(|c| !c.is_whitespace()).collect();
            return Some((name, false));
        }
    };
    let mut name = String::new();
    let mut rest = chars.peekable();
    while let Some(c) = rest.next() {
        if c == close {
            // doubled quote inside a quoted name
            if close == '"' && rest.peek() == Some(&'"') {
                rest.next();
                name.push('"');
                continue;
            }
            return Some((name, true));
        }
        name.push(c);
    }
    None
}

/// Text after the first identifier.
fn skip_identifier(def: &str) -> &str {
    let def = def.trim_start();
    let Some(first) = def.chars().next() else {
        return def;
    };
    let close = match first {
        '"' => '"',
        '`' => '`',
        '[' => ']',
        _ => {
            let end = def.find(char::is_whitespace).unwrap_or(def.len());
            return &def[end..];
        }
    };
    let mut i = first.len_utf8();
    while let Some(c) = def[i..].chars().next() {
        i += c.len_utf8();
        if c == close {
            if close == '"' && def[i..].starts_with('"') {
                i += 1;
                continue;
            }
            return &def[i..];
        }
    }
    ""
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_schema_creates_change_log() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        apply_schema(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'change_log'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_split_keeps_parenthesized_commas() {
        let parts = split_definitions(
            r#""amount" DECIMAL(18,2), "name" TEXT DEFAULT 'a,b', UNIQUE ("x", "y")"#,
        );
        assert_eq!(
            parts,
            vec![
                r#""amount" DECIMAL(18,2)"#,
                r#""name" TEXT DEFAULT 'a,b'"#,
                r#"UNIQUE ("x", "y")"#,
            ]
        );
    }

    #[test]
    fn test_column_parse_skips_table_constraints() {
        assert!(ColumnDef::parse(r#"CONSTRAINT "uq" UNIQUE ("a")"#).is_none());
        assert!(ColumnDef::parse("PRIMARY KEY (a, b)").is_none());
        assert!(ColumnDef::parse("FOREIGN KEY (a) REFERENCES t(id)").is_none());

        let col = ColumnDef::parse(r#""unique" TEXT"#).unwrap();
        assert_eq!(col.name, "unique");
        let col = ColumnDef::parse("[Form No] TEXT").unwrap();
        assert_eq!(col.name, "Form No");
        let col = ColumnDef::parse("amount DECIMAL(18, 2)").unwrap();
        assert_eq!(col.name, "amount");
    }

    #[test]
    fn test_retrofittable_columns() {
        let ok = |def: &str| ColumnDef::parse(def).unwrap().is_retrofittable();
        assert!(ok(r#""amount" DECIMAL(18, 2)"#));
        assert!(ok(r#""is_updated" BIT DEFAULT 0"#));
        assert!(ok(r#""status" TEXT DEFAULT 'open'"#));
        assert!(!ok(r#""id" INTEGER PRIMARY KEY AUTOINCREMENT"#));
        assert!(!ok(r#""code" TEXT UNIQUE"#));
        assert!(!ok(r#""created_at" DATETIME DEFAULT CURRENT_TIMESTAMP"#));
        assert!(!ok(r#""stamp" TEXT DEFAULT (datetime('now'))"#));
        // a quoted name that happens to contain a keyword
        assert!(ok(r#""unique_code" TEXT"#));
    }

    #[test]
    fn test_canonical_columns_exclude_constraints() {
        let cols = ROAD_CONSTRUCTION_SCHEMA.columns();
        let names: Vec<&str> = cols.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names.first(), Some(&"rc_id"));
        assert!(names.contains(&"work_date"));
        assert!(!names.iter().any(|n| n.eq_ignore_ascii_case("constraint")));
        assert_eq!(names.len(), 12);

        let amount = EXPEND_FORM_SCHEMA
            .columns()
            .into_iter()
            .find(|c| c.name == "item_amount")
            .unwrap();
        assert_eq!(amount.definition, r#""item_amount" DECIMAL(18, 2)"#);
    }

    #[test]
    fn test_canonical_schemas_create() {
        let conn = Connection::open_in_memory().unwrap();
        for schema in REGISTERED_SCHEMAS {
            conn.execute_batch(&schema.create_sql().unwrap()).unwrap();
        }
    }

    #[test]
    fn test_schema_for_rejects_unknown_tables() {
        assert_eq!(schema_for("EXPEND_FORM").unwrap().table, "expend_form");
        assert!(matches!(
            schema_for("sqlite_master"),
            Err(Error::UnknownTable { .. })
        ));
    }
}
