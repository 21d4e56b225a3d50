//! Shared test fixtures: a small movie-catalog schema plus mock-database
//! helpers.

#![allow(dead_code)]

use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase};

pub mod movie {
    use bulk_repo::TrackedEntity;
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "movies")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub title: String,
        pub duration: i32,
        pub rating: Option<f64>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}

    impl TrackedEntity for Entity {
        type Active = ActiveModel;
    }
}

pub mod user {
    use bulk_repo::TrackedEntity;
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "users")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub name: String,
        pub email: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}

    impl TrackedEntity for Entity {
        type Active = ActiveModel;
    }
}

/// Composite-key join table.
pub mod watch_history {
    use bulk_repo::TrackedEntity;
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "watch_history")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub user_id: i64,
        #[sea_orm(primary_key, auto_increment = false)]
        pub movie_id: i64,
        pub progress_secs: i32,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}

    impl TrackedEntity for Entity {
        type Active = ActiveModel;
    }
}

pub fn sample_movie(id: i64, title: &str) -> movie::Model {
    movie::Model {
        id,
        title: title.to_owned(),
        duration: 120,
        rating: None,
    }
}

/// An empty mock connection for tests that never reach the store.
pub fn mock_connection() -> DatabaseConnection {
    MockDatabase::new(DatabaseBackend::Postgres).into_connection()
}
