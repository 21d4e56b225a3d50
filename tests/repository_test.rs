//! Repository behavior tests against a mock database: caching, custom
//! repository substitution, staging rules and change-detection scoping.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use mockall::mock;
use mockall::predicate::eq;
use sea_orm::{DatabaseBackend, EntityTrait, MockDatabase, Select};

use bulk_repo::errors::{AccessError, AccessResult};
use bulk_repo::{EntityRepository, Paginated, PaginationParams, UnitOfWork};

use common::{mock_connection, movie, sample_movie};

mock! {
    MovieRepository {}

    #[async_trait]
    impl EntityRepository<movie::Entity> for MovieRepository {
        async fn find_by_id(&self, key: i64) -> AccessResult<Option<movie::Model>>;
        fn all(&self) -> Select<movie::Entity>;
        async fn find_page(&self, params: PaginationParams) -> AccessResult<Paginated<movie::Model>>;
        fn add(&self, entity: movie::Model) -> AccessResult<()>;
        fn add_range(&self, entities: Vec<movie::Model>, auto_detect_changes: bool) -> AccessResult<()>;
        fn update(&self, entity: movie::Model) -> AccessResult<()>;
        fn update_range(&self, entities: Vec<movie::Model>) -> AccessResult<()>;
        async fn delete_by_id(&self, key: i64) -> AccessResult<()>;
        fn delete(&self, entity: movie::Model) -> AccessResult<()>;
        fn delete_range(&self, entities: Vec<movie::Model>) -> AccessResult<()>;
    }
}

#[tokio::test]
async fn test_repository_is_cached_per_entity_type() {
    let uow = UnitOfWork::new(mock_connection());

    let first = uow.repository::<movie::Entity>(false);
    let second = uow.repository::<movie::Entity>(false);
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn test_fresh_unit_of_work_gets_fresh_repository() {
    let uow_a = UnitOfWork::new(mock_connection());
    let uow_b = UnitOfWork::new(mock_connection());

    let repo_a = uow_a.repository::<movie::Entity>(false);
    let repo_b = uow_b.repository::<movie::Entity>(false);
    assert!(!Arc::ptr_eq(&repo_a, &repo_b));
}

#[tokio::test]
async fn test_custom_repository_supersedes_generic() {
    let uow = UnitOfWork::new(mock_connection());

    let mut custom = MockMovieRepository::new();
    custom
        .expect_find_by_id()
        .with(eq(42i64))
        .returning(|id| Ok(Some(sample_movie(id, "Stalker"))));
    uow.register_custom_repository::<movie::Entity>(Arc::new(custom));

    let repo = uow.repository::<movie::Entity>(true);
    let found = repo.find_by_id(42).await.unwrap();
    assert_eq!(found.unwrap().title, "Stalker");

    // Without the flag the generic repository still answers.
    let generic = uow.repository::<movie::Entity>(false);
    assert!(!Arc::ptr_eq(&repo, &generic));
}

#[tokio::test]
async fn test_find_by_id_returns_none_for_absent_row() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([Vec::<movie::Model>::new()])
        .into_connection();
    let uow = UnitOfWork::new(db);

    let repo = uow.repository::<movie::Entity>(false);
    let found = repo.find_by_id(999).await.unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn test_find_by_id_returns_row() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![sample_movie(7, "Alien")]])
        .into_connection();
    let uow = UnitOfWork::new(db);

    let repo = uow.repository::<movie::Entity>(false);
    let found = repo.find_by_id(7).await.unwrap().unwrap();
    assert_eq!(found.id, 7);
    assert_eq!(found.title, "Alien");
}

#[tokio::test]
async fn test_find_page_returns_rows_and_meta() {
    // The paginator counts first, then fetches the page.
    let count_row = BTreeMap::from([("num_items", sea_orm::Value::BigInt(Some(3)))]);
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![count_row]])
        .append_query_results([vec![sample_movie(1, "Dune"), sample_movie(2, "Alien")]])
        .into_connection();
    let uow = UnitOfWork::new(db);
    let repo = uow.repository::<movie::Entity>(false);

    let page = repo.find_page(PaginationParams::new(1, 2)).await.unwrap();
    assert_eq!(page.data.len(), 2);
    assert_eq!(page.meta.page, 1);
    assert_eq!(page.meta.per_page, 2);
    assert_eq!(page.meta.total, 3);
    assert_eq!(page.meta.total_pages, 2);
}

#[tokio::test]
async fn test_staging_accumulates_pending_changes() {
    let uow = UnitOfWork::new(mock_connection());
    let repo = uow.repository::<movie::Entity>(false);

    repo.add(sample_movie(1, "Dune")).unwrap();
    repo.update(sample_movie(2, "Alien")).unwrap();
    repo.delete(sample_movie(3, "Heat")).unwrap();
    assert_eq!(uow.pending_changes(), 3);

    repo.add_range(vec![sample_movie(4, "Solaris"), sample_movie(5, "Brazil")], true)
        .unwrap();
    assert_eq!(uow.pending_changes(), 5);
}

#[tokio::test]
async fn test_add_range_rejects_empty_input() {
    let uow = UnitOfWork::new(mock_connection());
    let repo = uow.repository::<movie::Entity>(false);

    let result = repo.add_range(vec![], false);
    assert!(matches!(result, Err(AccessError::InvalidArgument(_))));
    assert_eq!(uow.pending_changes(), 0);
}

#[tokio::test]
async fn test_add_range_restores_change_detection_on_error() {
    let uow = UnitOfWork::new(mock_connection());
    let repo = uow.repository::<movie::Entity>(false);
    assert!(uow.auto_detect_changes());

    // Fails while detection is suspended; the prior state must come back.
    let _ = repo.add_range(vec![], false);
    assert!(uow.auto_detect_changes());
}

#[tokio::test]
async fn test_update_range_and_delete_range_reject_empty_input() {
    let uow = UnitOfWork::new(mock_connection());
    let repo = uow.repository::<movie::Entity>(false);

    assert!(matches!(
        repo.update_range(vec![]),
        Err(AccessError::InvalidArgument(_))
    ));
    assert!(matches!(
        repo.delete_range(vec![]),
        Err(AccessError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn test_delete_by_id_rejects_absent_key() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([Vec::<movie::Model>::new()])
        .into_connection();
    let uow = UnitOfWork::new(db);
    let repo = uow.repository::<movie::Entity>(false);

    let result = repo.delete_by_id(404).await;
    assert!(matches!(result, Err(AccessError::InvalidArgument(_))));
    assert_eq!(uow.pending_changes(), 0);
}

#[tokio::test]
async fn test_delete_by_id_stages_removal_of_existing_row() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![sample_movie(7, "Alien")]])
        .into_connection();
    let uow = UnitOfWork::new(db);
    let repo = uow.repository::<movie::Entity>(false);

    repo.delete_by_id(7).await.unwrap();
    assert_eq!(uow.pending_changes(), 1);
}

#[tokio::test]
async fn test_repository_outliving_its_unit_of_work_is_disposed() {
    let uow = UnitOfWork::new(mock_connection());
    let repo = uow.repository::<movie::Entity>(false);
    drop(uow);

    assert!(matches!(
        repo.add(sample_movie(1, "Dune")),
        Err(AccessError::Disposed)
    ));
    assert!(matches!(
        repo.find_by_id(1).await,
        Err(AccessError::Disposed)
    ));
}

#[test]
fn test_all_builds_unexecuted_query() {
    let uow = UnitOfWork::new(mock_connection());
    let repo = uow.repository::<movie::Entity>(false);

    // Composable source, equivalent to the entity's own find().
    let select = repo.all();
    let baseline = movie::Entity::find();
    assert_eq!(format!("{select:?}"), format!("{baseline:?}"));
}
