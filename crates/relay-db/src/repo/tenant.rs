//! Tenant repository.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::models::Tenant;
use crate::{DbError, DbResult};

/// Policy fields supplied at tenant creation.
#[derive(Debug, Clone)]
pub struct NewTenant {
    pub id: String,
    pub name: String,
    pub weight: i32,
    pub max_inflight: i32,
    pub api_key: Option<String>,
}

#[async_trait]
pub trait TenantRepo: Send + Sync {
    async fn create(&self, tenant: NewTenant) -> DbResult<Tenant>;
    async fn get_by_id(&self, id: &str) -> DbResult<Tenant>;
    async fn get_by_api_key(&self, api_key: &str) -> DbResult<Tenant>;
    async fn list(&self) -> DbResult<Vec<Tenant>>;
}

/// PostgreSQL implementation of TenantRepo.
pub struct PgTenantRepo {
    pool: PgPool,
}

impl PgTenantRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantRepo for PgTenantRepo {
    async fn create(&self, tenant: NewTenant) -> DbResult<Tenant> {
        let created = sqlx::query_as::<_, Tenant>(
            r#"
            INSERT INTO tenants (id, name, weight, max_inflight, api_key, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(&tenant.id)
        .bind(&tenant.name)
        .bind(tenant.weight)
        .bind(tenant.max_inflight)
        .bind(&tenant.api_key)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                DbError::TenantExists(tenant.id.clone())
            }
            _ => DbError::Database(e),
        })?;
        Ok(created)
    }

    async fn get_by_id(&self, id: &str) -> DbResult<Tenant> {
        let tenant = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::TenantNotFound(id.to_string()))?;
        Ok(tenant)
    }

    async fn get_by_api_key(&self, api_key: &str) -> DbResult<Tenant> {
        let tenant = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE api_key = $1")
            .bind(api_key)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DbError::UnknownApiKey)?;
        Ok(tenant)
    }

    async fn list(&self) -> DbResult<Vec<Tenant>> {
        let tenants = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(tenants)
    }
}
