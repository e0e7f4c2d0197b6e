/// Credential lookup and auth header preparation
///
/// Credentials are owned by the persistence layer; the engine only reads them.
/// `SqliteCredentialStore` is the production lookup, backed by the same SQLite
/// database as workflow snapshots.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePool, Row};

use crate::error::UpstreamServiceError;

/// Stored secret material for one credential
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// "bearer-token", "custom-token", "api-key", "basic-auth"
    #[serde(rename = "type", default)]
    pub credential_type: String,
    #[serde(default)]
    pub bearer_token: Option<String>,
    #[serde(default)]
    pub custom_token: Option<String>,
    #[serde(default)]
    pub api_key_name: Option<String>,
    #[serde(default)]
    pub api_key_value: Option<String>,
    #[serde(default)]
    pub basic_username: Option<String>,
    #[serde(default)]
    pub basic_password: Option<String>,
}

impl Credential {
    /// Required secret field, or a `CredentialFieldMissing` naming it
    pub fn field(&self, field: &'static str) -> Result<&str, UpstreamServiceError> {
        let value = match field {
            "bearer_token" => self.bearer_token.as_deref(),
            "custom_token" => self.custom_token.as_deref(),
            "api_key_name" => self.api_key_name.as_deref(),
            "api_key_value" => self.api_key_value.as_deref(),
            "basic_username" => self.basic_username.as_deref(),
            "basic_password" => self.basic_password.as_deref(),
            _ => None,
        };
        value
            .filter(|v| !v.is_empty())
            .ok_or_else(|| UpstreamServiceError::CredentialFieldMissing {
                credential_id: self.id.clone(),
                field,
            })
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_credential(&self, id: &str) -> Result<Option<Credential>, UpstreamServiceError>;
}

/// Fetch a credential, treating absence as an error
pub async fn require_credential(
    store: &dyn CredentialStore,
    id: &str,
) -> Result<Credential, UpstreamServiceError> {
    store
        .get_credential(id)
        .await?
        .ok_or_else(|| UpstreamServiceError::CredentialNotFound(id.to_string()))
}

/// Header to attach for `auth_type`, `None` when no auth is requested
pub fn auth_header(
    credential: &Credential,
    auth_type: &str,
) -> Result<Option<(String, String)>, UpstreamServiceError> {
    let header = match auth_type {
        "" | "none" => return Ok(None),
        "custom" => (
            "Authorization".to_string(),
            credential.field("custom_token")?.to_string(),
        ),
        "bearer" => (
            "Authorization".to_string(),
            format!("Bearer {}", credential.field("bearer_token")?),
        ),
        "api-key" => (
            "x-api-key".to_string(),
            credential.field("api_key_value")?.to_string(),
        ),
        "basic" => {
            let pair = format!(
                "{}:{}",
                credential.field("basic_username")?,
                credential.field("basic_password")?
            );
            ("Authorization".to_string(), format!("Basic {}", STANDARD.encode(pair)))
        }
        other => return Err(UpstreamServiceError::UnsupportedAuthType(other.to_string())),
    };
    Ok(Some(header))
}

/// SQLite-backed credential lookup
#[derive(Debug, Clone)]
pub struct SqliteCredentialStore {
    pool: SqlitePool,
}

impl SqliteCredentialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the credentials table (safe to call repeatedly)
    pub async fn init_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS credentials (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                type TEXT NOT NULL,
                bearer_token TEXT,
                custom_token TEXT,
                api_key_name TEXT,
                api_key_value TEXT,
                basic_username TEXT,
                basic_password TEXT,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert or replace a credential
    pub async fn save_credential(&self, credential: &Credential) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO credentials
                (id, name, type, bearer_token, custom_token, api_key_name,
                 api_key_value, basic_username, basic_password)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                type = excluded.type,
                bearer_token = excluded.bearer_token,
                custom_token = excluded.custom_token,
                api_key_name = excluded.api_key_name,
                api_key_value = excluded.api_key_value,
                basic_username = excluded.basic_username,
                basic_password = excluded.basic_password
            "#,
        )
        .bind(&credential.id)
        .bind(&credential.name)
        .bind(&credential.credential_type)
        .bind(&credential.bearer_token)
        .bind(&credential.custom_token)
        .bind(&credential.api_key_name)
        .bind(&credential.api_key_value)
        .bind(&credential.basic_username)
        .bind(&credential.basic_password)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn get_credential(&self, id: &str) -> Result<Option<Credential>, UpstreamServiceError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, type, bearer_token, custom_token, api_key_name,
                   api_key_value, basic_username, basic_password
            FROM credentials WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Credential {
            id: row.get("id"),
            name: row.get("name"),
            credential_type: row.get("type"),
            bearer_token: row.get("bearer_token"),
            custom_token: row.get("custom_token"),
            api_key_name: row.get("api_key_name"),
            api_key_value: row.get("api_key_value"),
            basic_username: row.get("basic_username"),
            basic_password: row.get("basic_password"),
        }))
    }
}
