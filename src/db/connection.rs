use crate::error::Result;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPool, PgPoolOptions};
use sqlx::{Connection, Row};
use std::str::FromStr;
use std::time::Duration;

/// Initialize the shared pool used by read paths.
pub async fn init_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await?;

    // Test the connection
    sqlx::query("SELECT 1").execute(&pool).await?;

    Ok(pool)
}

/// The database surface one ingestion call needs: plain statements, bulk
/// COPY appends, shape-metadata reads, and a single terminal close.
#[async_trait]
pub trait IngestConnection: Send {
    async fn execute(&mut self, sql: &str) -> Result<u64>;

    /// Stream one batch through the bulk-append protocol. `statement` is a
    /// `COPY ... FROM STDIN` command; `data` is the encoded payload. Returns
    /// the number of rows the server accepted.
    async fn copy_in(&mut self, statement: &str, data: Vec<u8>) -> Result<u64>;

    /// Fetch rows whose columns all decode as text (metadata reads only).
    async fn query_text_rows(&mut self, sql: &str) -> Result<Vec<Vec<Option<String>>>>;

    async fn close(self: Box<Self>) -> Result<()>;
}

/// Yields one dedicated physical connection per ingestion call. The caller
/// owns it exclusively until `close`.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn IngestConnection>>;
}

pub struct PgConnectionFactory {
    options: PgConnectOptions,
}

impl PgConnectionFactory {
    pub fn new(database_url: &str) -> Result<Self> {
        let options = PgConnectOptions::from_str(database_url)?;
        Ok(Self { options })
    }
}

#[async_trait]
impl ConnectionFactory for PgConnectionFactory {
    async fn connect(&self) -> Result<Box<dyn IngestConnection>> {
        let conn = PgConnection::connect_with(&self.options).await?;
        Ok(Box::new(PgIngestConnection { conn }))
    }
}

pub struct PgIngestConnection {
    conn: PgConnection,
}

#[async_trait]
impl IngestConnection for PgIngestConnection {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        let result = sqlx::query(sql).execute(&mut self.conn).await?;
        Ok(result.rows_affected())
    }

    async fn copy_in(&mut self, statement: &str, data: Vec<u8>) -> Result<u64> {
        let mut copy = self.conn.copy_in_raw(statement).await?;
        // Abort the stream on send failure so the connection stays usable
        // for the caller's cleanup statements.
        if let Err(e) = copy.send(data).await {
            let _ = copy.abort("copy send failed").await;
            return Err(e.into());
        }
        let rows = copy.finish().await?;
        Ok(rows)
    }

    async fn query_text_rows(&mut self, sql: &str) -> Result<Vec<Vec<Option<String>>>> {
        let rows = sqlx::query(sql).fetch_all(&mut self.conn).await?;
        rows.iter()
            .map(|row| {
                (0..row.columns().len())
                    .map(|i| Ok(row.try_get::<Option<String>, usize>(i)?))
                    .collect()
            })
            .collect()
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn.close().await?;
        Ok(())
    }
}
