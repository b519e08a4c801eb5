use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, QueryBuilder, Row};
use tracing::info;

use super::models::collections;
use super::{field_text, AuditFilter, AuditStore, DocumentStore, Filter, StoreError};
use crate::audit::AuditRecord;
use crate::config::DatabaseConfig;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS admin_documents (
        collection  TEXT        NOT NULL,
        id          TEXT        NOT NULL,
        body        JSONB       NOT NULL,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (collection, id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS admin_audit_logs (
        id           UUID        PRIMARY KEY,
        user_id      TEXT        NOT NULL,
        user_email   TEXT        NOT NULL,
        action       TEXT        NOT NULL,
        resource     TEXT        NOT NULL,
        resource_id  TEXT        NOT NULL,
        details      JSONB       NOT NULL,
        ip_address   TEXT,
        "timestamp"  TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"CREATE INDEX IF NOT EXISTS admin_audit_logs_timestamp_idx ON admin_audit_logs ("timestamp" DESC)"#,
    // One per `collections::unique_field`
    r#"CREATE UNIQUE INDEX IF NOT EXISTS admin_documents_feature_flags_key_uniq
         ON admin_documents ((body ->> 'key')) WHERE collection = 'feature_flags'"#,
    r#"CREATE UNIQUE INDEX IF NOT EXISTS admin_documents_users_email_uniq
         ON admin_documents ((body ->> 'email')) WHERE collection = 'users'"#,
];

/// Postgres-backed document and audit store. Documents live as JSONB rows
/// keyed by `(collection, id)`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &DatabaseConfig, url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(url)
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;
        info!("Connected document store (max_connections={})", config.max_connections);
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

const PRIMARY_KEY: &str = "admin_documents_pkey";

/// Map a unique violation on insert to the store error it stands for.
fn insert_error(collection: &'static str, id: &str, document: &Value, err: sqlx::Error) -> StoreError {
    let constraint = match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => db.constraint().map(str::to_string),
        _ => return StoreError::Sqlx(err),
    };

    match collections::unique_field(collection) {
        Some(field) if constraint.as_deref() != Some(PRIMARY_KEY) => StoreError::Duplicate {
            collection,
            field,
            value: document.get(field).map(field_text).unwrap_or_default(),
        },
        _ => StoreError::AlreadyExists { collection, id: id.to_string() },
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn get(&self, collection: &'static str, id: &str) -> Result<Option<Value>, StoreError> {
        let row = sqlx::query("SELECT body FROM admin_documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(row) => Some(row.try_get::<Value, _>("body")?),
            None => None,
        })
    }

    async fn list(&self, collection: &'static str, filter: &Filter) -> Result<Vec<Value>, StoreError> {
        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT body FROM admin_documents WHERE collection = ");
        query.push_bind(collection);
        for (field, expected) in filter {
            query.push(" AND body ->> ");
            query.push_bind(field.clone());
            query.push(" = ");
            query.push_bind(expected.clone());
        }
        query.push(" ORDER BY created_at, id");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|row| row.try_get::<Value, _>("body").map_err(StoreError::from))
            .collect()
    }

    async fn insert(&self, collection: &'static str, id: &str, document: Value) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO admin_documents (collection, id, body) VALUES ($1, $2, $3)")
            .bind(collection)
            .bind(id)
            .bind(&document)
            .execute(&self.pool)
            .await
            .map_err(|e| insert_error(collection, id, &document, e))?;
        Ok(())
    }

    async fn update(
        &self,
        collection: &'static str,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<Value, StoreError> {
        let row = sqlx::query(
            "UPDATE admin_documents SET body = body || $3, updated_at = now() \
             WHERE collection = $1 AND id = $2 RETURNING body",
        )
        .bind(collection)
        .bind(id)
        .bind(Value::Object(patch))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound { collection, id: id.to_string() })?;

        Ok(row.try_get::<Value, _>("body")?)
    }

    async fn put(&self, collection: &'static str, id: &str, document: Value) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO admin_documents (collection, id, body) VALUES ($1, $2, $3) \
             ON CONFLICT (collection, id) DO UPDATE SET body = EXCLUDED.body, updated_at = now()",
        )
        .bind(collection)
        .bind(id)
        .bind(&document)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, collection: &'static str, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM admin_documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { collection, id: id.to_string() });
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl AuditStore for PgStore {
    async fn append(&self, record: &AuditRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO admin_audit_logs
                 (id, user_id, user_email, action, resource, resource_id, details, ip_address, "timestamp")
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(record.id)
        .bind(&record.user_id)
        .bind(&record.user_email)
        .bind(&record.action)
        .bind(&record.resource)
        .bind(&record.resource_id)
        .bind(&record.details)
        .bind(&record.ip_address)
        .bind(record.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, StoreError> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"SELECT id, user_id, user_email, action, resource, resource_id, details, ip_address, "timestamp"
               FROM admin_audit_logs WHERE TRUE"#,
        );
        if let Some(user_id) = &filter.user_id {
            query.push(" AND user_id = ").push_bind(user_id.clone());
        }
        if let Some(resource) = &filter.resource {
            query.push(" AND resource = ").push_bind(resource.clone());
        }
        if let Some(action) = &filter.action {
            query.push(" AND action = ").push_bind(action.clone());
        }
        if let Some(start) = filter.start {
            query.push(r#" AND "timestamp" >= "#).push_bind(start);
        }
        if let Some(end) = filter.end {
            query.push(r#" AND "timestamp" <= "#).push_bind(end);
        }
        query.push(r#" ORDER BY "timestamp" DESC"#);

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|row| -> Result<AuditRecord, StoreError> {
                Ok(AuditRecord {
                    id: row.try_get("id")?,
                    user_id: row.try_get("user_id")?,
                    user_email: row.try_get("user_email")?,
                    action: row.try_get("action")?,
                    resource: row.try_get("resource")?,
                    resource_id: row.try_get("resource_id")?,
                    details: row.try_get("details")?,
                    ip_address: row.try_get("ip_address")?,
                    timestamp: row.try_get("timestamp")?,
                })
            })
            .collect()
    }
}
