//! Bulk statement synthesis.
//!
//! Pure translation from a typed request into SQL text plus a flat parameter
//! list; no I/O. Placeholders are named by flat row-major index: value cell
//! (row `r`, column `c` of `C`) becomes `@p{r*C+c}`, key cell (row `r`,
//! column `c` of `K` key columns) becomes `@kp{r*K+c}`, so value and key
//! parameter spaces never collide. The parameter list carries all value
//! parameters row-major, then all key parameters row-major, matching the
//! order the placeholders are numbered in.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::GENERATED_ID_COLUMN;
use crate::errors::{AccessError, AccessResult};
use crate::infra::bulk::model::{
    BoundParam, BulkDeleteByCompositeKey, BulkDeleteByIdentityKey, BulkInsert, BulkInsertOnConflict,
    BulkUpdateByCompositeKey, BulkUpdateByIdentityKey, ColumnMapping, GeneratedStatement, RowValues,
};

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

/// Reject anything that is not a plain SQL identifier, so no unescaped name
/// can reach the statement text.
fn ident(name: &str) -> AccessResult<&str> {
    if IDENTIFIER.is_match(name) {
        Ok(name)
    } else {
        Err(AccessError::Validation(format!(
            "invalid SQL identifier: {name:?}"
        )))
    }
}

fn check_row_widths(rows: &[RowValues], width: usize) -> AccessResult<()> {
    for (index, row) in rows.iter().enumerate() {
        if row.len() != width {
            return Err(AccessError::Validation(format!(
                "row {index} has {} value(s), expected {width}",
                row.len()
            )));
        }
    }
    Ok(())
}

/// Value parameters for `rows`, row-major, with absent cells bound as the
/// column's typed NULL.
fn value_params(columns: &[ColumnMapping], rows: &[RowValues]) -> Vec<BoundParam> {
    let width = columns.len();
    let mut params = Vec::with_capacity(rows.len() * width);
    for (r, row) in rows.iter().enumerate() {
        for (c, cell) in row.0.iter().enumerate() {
            params.push(BoundParam {
                name: format!("p{}", r * width + c),
                value: cell
                    .clone()
                    .unwrap_or_else(|| columns[c].param_type.null_value()),
            });
        }
    }
    params
}

/// `INSERT INTO t ("c0", "c1") VALUES (@p0,@p1),(@p2,@p3),…`, optionally with
/// a returning clause yielding generated ids in insertion order.
pub fn bulk_insert(request: &BulkInsert, returning_ids: bool) -> AccessResult<GeneratedStatement> {
    if request.columns.is_empty() || request.rows.is_empty() {
        return Err(AccessError::validation(
            "bulk insert requires at least one column and one row",
        ));
    }
    let width = request.columns.len();
    check_row_widths(&request.rows, width)?;

    let table = ident(&request.table)?;
    let column_list = request
        .columns
        .iter()
        .map(|c| Ok(format!("\"{}\"", ident(&c.column)?)))
        .collect::<AccessResult<Vec<_>>>()?
        .join(", ");

    let groups = (0..request.rows.len())
        .map(|r| {
            let placeholders = (0..width)
                .map(|c| format!("@p{}", r * width + c))
                .collect::<Vec<_>>()
                .join(",");
            format!("({placeholders})")
        })
        .collect::<Vec<_>>()
        .join(",");

    let mut sql = format!("INSERT INTO {table} ({column_list}) VALUES {groups}");
    if returning_ids {
        sql.push_str(&format!(" RETURNING {GENERATED_ID_COLUMN}"));
    }

    Ok(GeneratedStatement {
        sql,
        params: value_params(&request.columns, &request.rows),
    })
}

/// Insert with a conflict arm: `… ON CONFLICT (k) DO UPDATE SET c = EXCLUDED.c`
/// (or `DO NOTHING` when no update columns are given).
pub fn bulk_insert_on_conflict(
    request: &BulkInsertOnConflict,
) -> AccessResult<GeneratedStatement> {
    if request.conflict_columns.is_empty() {
        return Err(AccessError::validation(
            "on-conflict insert requires at least one conflict column",
        ));
    }
    let insert_names: HashSet<&str> = request
        .insert
        .columns
        .iter()
        .map(|c| c.column.as_str())
        .collect();
    for column in &request.update_columns {
        if !insert_names.contains(column.as_str()) {
            return Err(AccessError::Validation(format!(
                "update column {column:?} is not part of the insert column list"
            )));
        }
    }

    let mut statement = bulk_insert(&request.insert, false)?;
    // Quoted like the insert column list.
    let conflict_list = request
        .conflict_columns
        .iter()
        .map(|c| Ok(format!("\"{}\"", ident(c)?)))
        .collect::<AccessResult<Vec<_>>>()?
        .join(", ");

    if request.update_columns.is_empty() {
        statement
            .sql
            .push_str(&format!(" ON CONFLICT ({conflict_list}) DO NOTHING"));
    } else {
        let update_list = request
            .update_columns
            .iter()
            .map(|c| ident(c).map(|c| format!("\"{c}\" = EXCLUDED.\"{c}\"")))
            .collect::<AccessResult<Vec<_>>>()?
            .join(", ");
        statement.sql.push_str(&format!(
            " ON CONFLICT ({conflict_list}) DO UPDATE SET {update_list}"
        ));
    }
    Ok(statement)
}

/// Per-row CASE update scoped by `WHERE key IN (…)`. Row `i`'s CASE branch
/// tests `key = @kp{i}` and yields that row's value for the column.
pub fn bulk_update_by_identity_key(
    request: &BulkUpdateByIdentityKey,
) -> AccessResult<GeneratedStatement> {
    if request.columns.is_empty() || request.rows.is_empty() || request.keys.is_empty() {
        return Err(AccessError::validation(
            "bulk update requires columns, rows and key values",
        ));
    }
    let width = request.columns.len();
    check_row_widths(&request.rows, width)?;
    if request.rows.len() != request.keys.len() {
        return Err(AccessError::Validation(format!(
            "{} update row(s) but {} key value(s)",
            request.rows.len(),
            request.keys.len()
        )));
    }

    let table = ident(&request.table)?;
    let key_column = ident(&request.key_column.column)?;

    // One shared per-row condition list drives both the CASE branches and
    // the WHERE scope, keeping their row order identical by construction.
    let conditions: Vec<String> = (0..request.keys.len())
        .map(|r| format!("{key_column} = @kp{r}"))
        .collect();

    let set_list = build_case_assignments(&request.columns, &conditions, request.rows.len())?;
    let in_list = (0..request.keys.len())
        .map(|r| format!("@kp{r}"))
        .collect::<Vec<_>>()
        .join(",");

    let sql = format!("UPDATE {table} SET {set_list} WHERE {key_column} IN ({in_list})");

    let mut params = value_params(&request.columns, &request.rows);
    for (r, key) in request.keys.iter().enumerate() {
        params.push(BoundParam {
            name: format!("kp{r}"),
            value: key.clone(),
        });
    }
    Ok(GeneratedStatement { sql, params })
}

/// Per-row CASE update where each branch condition is the conjunction of all
/// key columns for that row, and the WHERE clause is the disjunction of one
/// parenthesized conjunction per row.
pub fn bulk_update_by_composite_key(
    request: &BulkUpdateByCompositeKey,
) -> AccessResult<GeneratedStatement> {
    if request.columns.is_empty()
        || request.rows.is_empty()
        || request.key_columns.is_empty()
        || request.keys.is_empty()
    {
        return Err(AccessError::validation(
            "bulk update requires columns, rows, key columns and key values",
        ));
    }
    let width = request.columns.len();
    check_row_widths(&request.rows, width)?;
    if request.rows.len() != request.keys.len() {
        return Err(AccessError::Validation(format!(
            "{} update row(s) but {} key row(s)",
            request.rows.len(),
            request.keys.len()
        )));
    }
    let key_width = request.key_columns.len();
    for (index, key_row) in request.keys.iter().enumerate() {
        if key_row.len() != key_width {
            return Err(AccessError::Validation(format!(
                "key row {index} has {} value(s), expected {key_width}",
                key_row.len()
            )));
        }
    }

    let table = ident(&request.table)?;
    let key_columns = request
        .key_columns
        .iter()
        .map(|c| ident(&c.column))
        .collect::<AccessResult<Vec<_>>>()?;

    let conditions = conjunctions(&key_columns, request.keys.len(), "kp");
    let set_list = build_case_assignments(&request.columns, &conditions, request.rows.len())?;
    let where_list = disjunction(&conditions);

    let sql = format!("UPDATE {table} SET {set_list} WHERE {where_list}");

    let mut params = value_params(&request.columns, &request.rows);
    for (r, key_row) in request.keys.iter().enumerate() {
        for (c, value) in key_row.iter().enumerate() {
            params.push(BoundParam {
                name: format!("kp{}", r * key_width + c),
                value: value.clone(),
            });
        }
    }
    Ok(GeneratedStatement { sql, params })
}

/// `DELETE FROM t WHERE col IN (@p0,@p1,…)`.
pub fn bulk_delete_by_identity_key(
    request: &BulkDeleteByIdentityKey,
) -> AccessResult<GeneratedStatement> {
    if request.ids.is_empty() {
        return Err(AccessError::validation(
            "bulk delete requires at least one id",
        ));
    }
    let table = ident(&request.table)?;
    let column = ident(&request.column)?;
    let in_list = (0..request.ids.len())
        .map(|i| format!("@p{i}"))
        .collect::<Vec<_>>()
        .join(",");
    let sql = format!("DELETE FROM {table} WHERE {column} IN ({in_list})");
    let params = request
        .ids
        .iter()
        .enumerate()
        .map(|(i, value)| BoundParam {
            name: format!("p{i}"),
            value: value.clone(),
        })
        .collect();
    Ok(GeneratedStatement { sql, params })
}

/// `DELETE FROM t WHERE (conj row0) OR (conj row1) OR …`. Key parameters use
/// the `@p` namespace here: a delete has no value namespace to collide with.
pub fn bulk_delete_by_composite_key(
    request: &BulkDeleteByCompositeKey,
) -> AccessResult<GeneratedStatement> {
    if request.columns.is_empty() || request.keys.is_empty() {
        return Err(AccessError::validation(
            "bulk delete requires key columns and key values",
        ));
    }
    let key_width = request.columns.len();
    for (index, key_row) in request.keys.iter().enumerate() {
        if key_row.len() != key_width {
            return Err(AccessError::Validation(format!(
                "key row {index} has {} value(s), expected {key_width}",
                key_row.len()
            )));
        }
    }

    let table = ident(&request.table)?;
    let key_columns = request
        .columns
        .iter()
        .map(|c| ident(c))
        .collect::<AccessResult<Vec<_>>>()?;

    let conditions = conjunctions(&key_columns, request.keys.len(), "p");
    let sql = format!("DELETE FROM {table} WHERE {}", disjunction(&conditions));

    let mut params = Vec::with_capacity(request.keys.len() * key_width);
    for (r, key_row) in request.keys.iter().enumerate() {
        for (c, value) in key_row.iter().enumerate() {
            params.push(BoundParam {
                name: format!("p{}", r * key_width + c),
                value: value.clone(),
            });
        }
    }
    Ok(GeneratedStatement { sql, params })
}

/// Per-row key conjunctions: row `r` becomes
/// `k0 = @{ns}{r*K} AND k1 = @{ns}{r*K+1} …`.
fn conjunctions(key_columns: &[&str], rows: usize, namespace: &str) -> Vec<String> {
    let key_width = key_columns.len();
    (0..rows)
        .map(|r| {
            key_columns
                .iter()
                .enumerate()
                .map(|(c, column)| format!("{column} = @{namespace}{}", r * key_width + c))
                .collect::<Vec<_>>()
                .join(" AND ")
        })
        .collect()
}

fn disjunction(conditions: &[String]) -> String {
    conditions
        .iter()
        .map(|c| format!("({c})"))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// `col = (CASE WHEN cond0 THEN @p{0*C+c} WHEN cond1 THEN @p{1*C+c} … END)`
/// for every update column, joined with `, `.
fn build_case_assignments(
    columns: &[ColumnMapping],
    conditions: &[String],
    rows: usize,
) -> AccessResult<String> {
    let width = columns.len();
    Ok(columns
        .iter()
        .enumerate()
        .map(|(c, mapping)| -> AccessResult<String> {
            let column = ident(&mapping.column)?;
            let mut branches = String::new();
            for r in 0..rows {
                branches.push_str(&format!(" WHEN {} THEN @p{}", conditions[r], r * width + c));
            }
            Ok(format!("{column} = (CASE{branches} END)"))
        })
        .collect::<AccessResult<Vec<_>>>()?
        .join(", "))
}
