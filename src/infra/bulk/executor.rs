//! Bulk statement execution.
//!
//! Renders a generated statement's named placeholders into the Postgres
//! positional form and runs it on the unit of work's connection, joining the
//! ambient transaction when one is open. Every execution is bounded by a
//! timeout.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::{ConnectionTrait, DbBackend, DbErr, Statement, Value};

use crate::config::{DEFAULT_BULK_TIMEOUT_SECS, GENERATED_ID_COLUMN};
use crate::errors::ExecCause;
use crate::infra::bulk::model::GeneratedStatement;
use crate::infra::context::PersistenceContext;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@k?p\d+").expect("placeholder pattern is valid"));

/// Rewrite `@p…`/`@kp…` placeholders to `$n` and lay the bound values out in
/// first-reference order. A lexical pass, so `@p1` never shadows `@p10`.
/// Repeated references to one placeholder collapse onto the same `$n`.
pub(crate) fn render(generated: &GeneratedStatement) -> Result<Statement, ExecCause> {
    let mut by_name: HashMap<&str, &Value> = HashMap::with_capacity(generated.params.len());
    for param in &generated.params {
        if by_name.insert(param.name.as_str(), &param.value).is_some() {
            return Err(ExecCause::MalformedStatement(format!(
                "parameter {:?} bound twice",
                param.name
            )));
        }
    }

    let mut indices: HashMap<String, usize> = HashMap::with_capacity(generated.params.len());
    let mut values: Vec<Value> = Vec::with_capacity(generated.params.len());
    let mut unknown: Option<String> = None;

    let sql = PLACEHOLDER.replace_all(&generated.sql, |captures: &regex::Captures<'_>| {
        let name = &captures[0][1..]; // strip '@'
        if let Some(&index) = indices.get(name) {
            return format!("${}", index + 1);
        }
        match by_name.get(name) {
            Some(value) => {
                let index = values.len();
                values.push((*value).clone());
                indices.insert(name.to_owned(), index);
                format!("${}", index + 1)
            }
            None => {
                unknown.get_or_insert_with(|| name.to_owned());
                String::new()
            }
        }
    });

    if let Some(name) = unknown {
        return Err(ExecCause::MalformedStatement(format!(
            "statement references unbound parameter {name:?}"
        )));
    }
    if values.len() != generated.params.len() {
        return Err(ExecCause::MalformedStatement(format!(
            "{} parameter(s) bound but {} referenced by the statement",
            generated.params.len(),
            values.len()
        )));
    }

    Ok(Statement::from_sql_and_values(
        DbBackend::Postgres,
        sql.into_owned(),
        values,
    ))
}

fn limit_of(timeout: Option<Duration>) -> Duration {
    timeout.unwrap_or(Duration::from_secs(DEFAULT_BULK_TIMEOUT_SECS))
}

/// Run one statement future under the time limit. An elapsed limit aborts the
/// in-flight statement; the ambient transaction slot is not touched, so an
/// open transaction stays open for the caller to settle.
async fn bounded<T, F>(limit: Duration, operation: F) -> Result<T, ExecCause>
where
    F: Future<Output = Result<T, DbErr>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(ExecCause::Db(err)),
        Err(_) => Err(ExecCause::Timeout(limit.as_secs())),
    }
}

/// Execute one generated statement and return the affected row count.
pub(crate) async fn execute(
    ctx: &PersistenceContext,
    generated: &GeneratedStatement,
    timeout: Option<Duration>,
) -> Result<u64, ExecCause> {
    let statement = render(generated)?;
    let limit = limit_of(timeout);
    tracing::debug!(sql = %statement.sql, params = generated.params.len(), "bulk execute");

    let slot = ctx.txn_slot().lock().await;
    let result = match slot.as_ref() {
        Some(txn) => bounded(limit, txn.execute_raw(statement)).await?,
        None => bounded(limit, ctx.connection().execute_raw(statement)).await?,
    };
    Ok(result.rows_affected())
}

/// Execute a returning statement and collect the generated ids, in row order.
/// The server must hand back exactly one id per inserted row.
pub(crate) async fn query_generated_ids(
    ctx: &PersistenceContext,
    generated: &GeneratedStatement,
    expected: usize,
    timeout: Option<Duration>,
) -> Result<Vec<i64>, ExecCause> {
    let statement = render(generated)?;
    let limit = limit_of(timeout);
    tracing::debug!(sql = %statement.sql, params = generated.params.len(), "bulk execute returning");

    let slot = ctx.txn_slot().lock().await;
    let rows = match slot.as_ref() {
        Some(txn) => bounded(limit, txn.query_all_raw(statement)).await?,
        None => bounded(limit, ctx.connection().query_all_raw(statement)).await?,
    };
    if rows.len() != expected {
        return Err(ExecCause::UnexpectedRowCount {
            expected,
            returned: rows.len(),
        });
    }
    rows.iter()
        .map(|row| {
            row.try_get::<i64>("", GENERATED_ID_COLUMN)
                .map_err(ExecCause::Db)
        })
        .collect()
}
