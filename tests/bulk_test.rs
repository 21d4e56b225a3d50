//! Bulk engine integration tests: rendered SQL reaching the store, generated
//! id collection, and ambient transaction joining.

mod common;

use std::collections::BTreeMap;

use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Transaction, Value};

use bulk_repo::errors::{AccessError, ExecCause};
use bulk_repo::{
    BulkDeleteByIdentityKey, BulkInsert, BulkUpdateByIdentityKey, ColumnMapping, ParamType,
    RowValues, UnitOfWork,
};

use common::mock_connection;

fn movie_insert() -> BulkInsert {
    BulkInsert {
        table: "movies".into(),
        columns: vec![
            ColumnMapping::new("title", ParamType::Text),
            ColumnMapping::new("duration", ParamType::Int),
        ],
        rows: vec![
            RowValues::from_values(vec!["Dune".into(), 155.into()]),
            RowValues::from_values(vec!["Alien".into(), 117.into()]),
        ],
    }
}

fn id_row(id: i64) -> BTreeMap<&'static str, Value> {
    BTreeMap::from([("id", Value::BigInt(Some(id)))])
}

#[tokio::test]
async fn test_bulk_insert_sends_positional_statement() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_exec_results([MockExecResult {
            last_insert_id: 0,
            rows_affected: 2,
        }])
        .into_connection();
    let conn = db.clone();
    let uow = UnitOfWork::new(db);

    let affected = uow.bulk_insert(&movie_insert(), None).await.unwrap();
    assert_eq!(affected, 2);

    drop(uow);
    let log = conn.into_transaction_log();
    assert_eq!(
        log,
        [Transaction::from_sql_and_values(
            DatabaseBackend::Postgres,
            "INSERT INTO movies (\"title\", \"duration\") VALUES ($1,$2),($3,$4)",
            [
                Value::from("Dune"),
                Value::from(155),
                Value::from("Alien"),
                Value::from(117),
            ],
        )]
    );
}

#[tokio::test]
async fn test_bulk_insert_returning_ids_preserves_row_order() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![id_row(11), id_row(12)]])
        .into_connection();
    let uow = UnitOfWork::new(db);

    let ids = uow.bulk_insert_returning_ids(&movie_insert(), None).await.unwrap();
    assert_eq!(ids, [11, 12]);
}

#[tokio::test]
async fn test_bulk_insert_returning_ids_detects_short_server_response() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![id_row(11)]])
        .into_connection();
    let uow = UnitOfWork::new(db);

    let result = uow.bulk_insert_returning_ids(&movie_insert(), None).await;
    assert!(matches!(
        result,
        Err(AccessError::BulkInsertFailed(ExecCause::UnexpectedRowCount {
            expected: 2,
            returned: 1,
        }))
    ));
}

#[tokio::test]
async fn test_bulk_update_reuses_key_placeholders_positionally() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_exec_results([MockExecResult {
            last_insert_id: 0,
            rows_affected: 2,
        }])
        .into_connection();
    let conn = db.clone();
    let uow = UnitOfWork::new(db);

    let request = BulkUpdateByIdentityKey {
        table: "movies".into(),
        columns: vec![ColumnMapping::new("duration", ParamType::Int)],
        rows: vec![
            RowValues::from_values(vec![155.into()]),
            RowValues::from_values(vec![117.into()]),
        ],
        key_column: ColumnMapping::new("id", ParamType::BigInt),
        keys: vec![1i64.into(), 2i64.into()],
    };
    assert_eq!(uow.bulk_update_by_identity_key(&request, None).await.unwrap(), 2);

    drop(uow);
    let log = conn.into_transaction_log();
    // Each key binds once; its IN-list reference reuses the CASE's $n.
    assert_eq!(
        log,
        [Transaction::from_sql_and_values(
            DatabaseBackend::Postgres,
            "UPDATE movies SET duration = (CASE WHEN id = $1 THEN $2 WHEN id = $3 THEN $4 END) \
             WHERE id IN ($1,$3)",
            [
                Value::from(1i64),
                Value::from(155),
                Value::from(2i64),
                Value::from(117),
            ],
        )]
    );
}

#[tokio::test]
async fn test_bulk_statement_joins_ambient_transaction() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_exec_results([MockExecResult {
            last_insert_id: 0,
            rows_affected: 3,
        }])
        .into_connection();
    let uow = UnitOfWork::new(db);

    let mut tx = uow.begin_transaction().await.unwrap();
    let request = BulkDeleteByIdentityKey {
        table: "movies".into(),
        column: "id".into(),
        ids: vec![5.into(), 9.into(), 14.into()],
    };
    assert_eq!(uow.bulk_delete_by_identity_key(&request, None).await.unwrap(), 3);
    tx.commit().await.unwrap();
}

#[tokio::test]
async fn test_failed_bulk_statement_leaves_ambient_transaction_open() {
    // Nothing prepared on the mock, so the delete fails at the store.
    let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
    let uow = UnitOfWork::new(db);

    let mut tx = uow.begin_transaction().await.unwrap();
    let request = BulkDeleteByIdentityKey {
        table: "movies".into(),
        column: "id".into(),
        ids: vec![5.into()],
    };
    let result = uow.bulk_delete_by_identity_key(&request, None).await;
    assert!(matches!(
        result,
        Err(AccessError::BulkDeleteFailed(ExecCause::Db(_)))
    ));

    // The failure settles nothing; the transaction is still the caller's to
    // roll back.
    assert!(tx.is_open());
    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_bulk_validation_failure_never_reaches_the_store() {
    let uow = UnitOfWork::new(mock_connection());

    let request = BulkInsert {
        table: "movies".into(),
        columns: vec![ColumnMapping::new("title", ParamType::Text)],
        rows: vec![],
    };
    assert!(matches!(
        uow.bulk_insert(&request, None).await,
        Err(AccessError::Validation(_))
    ));
}
