#![allow(dead_code)]

use std::sync::Arc;

use api::auth::CurrentUser;
use api::directory;
use api::permission::PolicyConfig;
use api::schema::{build_schema, AppSchema, RestaurantSchema};
use api::seed::{seed_demo, SeededRecords};
use async_graphql::{Request, Response, Variables};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, Statement};
use serde_json::Value;
use uuid::Uuid;

/// Migrated and seeded in-memory database with a schema wired to it.
pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub schema: RestaurantSchema,
    pub seeded: SeededRecords,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_policy(PolicyConfig::default()).await
    }

    pub async fn with_policy(policy: PolicyConfig) -> Self {
        let conn = Database::connect("sqlite::memory:").await.unwrap();
        conn.execute(Statement::from_string(
            DatabaseBackend::Sqlite,
            "PRAGMA foreign_keys = ON;",
        ))
        .await
        .unwrap();
        Migrator::up(&conn, None).await.unwrap();
        let seeded = seed_demo(&conn).await.unwrap();
        let db = Arc::new(conn);
        let AppSchema(schema) = build_schema(db.clone(), policy);
        Self { db, schema, seeded }
    }

    /// Runs a document as `user`, or anonymously when `None`. Roles are read
    /// from the directory the same way the server does per request.
    pub async fn exec_as(&self, user: Option<Uuid>, query: &str, vars: Value) -> Response {
        let mut request = Request::new(query).variables(Variables::from_json(vars));
        if let Some(user_id) = user {
            let roles = directory::roles_of(self.db.as_ref(), user_id).await.unwrap();
            request = request.data(CurrentUser { user_id, roles });
        }
        self.schema.execute(request).await
    }

    /// Like `exec_as` but fails the test on any error and returns `data` as JSON.
    pub async fn exec_ok(&self, user: Option<Uuid>, query: &str, vars: Value) -> Value {
        let response = self.exec_as(user, query, vars).await;
        assert!(
            response.errors.is_empty(),
            "unexpected errors: {:?}",
            response.errors
        );
        response.data.into_json().unwrap()
    }

    pub async fn execute_sql(&self, sql: &str) {
        self.db
            .execute(Statement::from_string(DatabaseBackend::Sqlite, sql.to_string()))
            .await
            .unwrap();
    }

    pub async fn count(&self, table: &str) -> i64 {
        let row = self
            .db
            .query_one(Statement::from_string(
                DatabaseBackend::Sqlite,
                format!("SELECT COUNT(*) AS n FROM \"{table}\""),
            ))
            .await
            .unwrap()
            .unwrap();
        row.try_get::<i64>("", "n").unwrap()
    }
}

pub fn error_code(response: &Response) -> Option<String> {
    extension(response, "code")
}

pub fn error_field(response: &Response) -> Option<String> {
    extension(response, "field")
}

fn extension(response: &Response, key: &str) -> Option<String> {
    let error = response.errors.first()?;
    match error.extensions.as_ref()?.get(key)? {
        async_graphql::Value::String(value) => Some(value.clone()),
        _ => None,
    }
}

pub fn id(uuid: Uuid) -> String {
    uuid.to_string()
}
