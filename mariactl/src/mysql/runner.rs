//! sqlx-backed [`SqlRunner`] for MariaDB.
//!
//! The server's prepared-statement protocol rejects multi-statement batches, so arguments
//! are interpolated on the client (each value escaped with [`escape`] and quoted) and the
//! batch is sent over the text protocol with [`sqlx::raw_sql`]. If a statement inside a
//! `BEGIN; ... COMMIT;` batch fails, the server stops at that statement and the open
//! transaction is rolled back when the connection is closed.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{ConnectOptions, Connection, Executor as _, Row as _};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::escape::escape;
use super::{ConnectionConfig, Query, Row, Rows, SqlArg, SqlError, SqlRunner, SqlRunnerFactory};

/// Render `query` as plain SQL by substituting each `?` placeholder with its argument.
///
/// Placeholders inside backtick identifiers or quoted literals are left alone.
pub fn interpolate(query: &Query) -> Result<String, SqlError> {
    let text = query.as_str();
    let args = query.args();
    let mut out = String::with_capacity(text.len() + args.len() * 8);
    let mut next_arg = 0usize;
    let mut placeholders = 0usize;
    let mut quote: Option<char> = None;
    let mut chars = text.chars();

    while let Some(ch) = chars.next() {
        match quote {
            Some(q) => {
                out.push(ch);
                if ch == '\\' && q != '`' {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                } else if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '\'' | '"' | '`' => {
                    quote = Some(ch);
                    out.push(ch);
                }
                '?' => {
                    placeholders += 1;
                    if let Some(arg) = args.get(next_arg) {
                        render_arg(&mut out, arg);
                        next_arg += 1;
                    }
                }
                _ => out.push(ch),
            },
        }
    }

    if placeholders != args.len() {
        return Err(SqlError::ArgumentMismatch {
            placeholders,
            args: args.len(),
        });
    }

    Ok(out)
}

fn render_arg(out: &mut String, arg: &SqlArg) {
    match arg {
        SqlArg::Text(s) => {
            out.push('\'');
            out.push_str(&escape(s));
            out.push('\'');
        }
        SqlArg::Int(v) => out.push_str(&v.to_string()),
        SqlArg::UInt(v) => out.push_str(&v.to_string()),
    }
}

/// Opens a dedicated [`MySqlRunner`] per call.
#[derive(Debug, Clone)]
pub struct MySqlRunnerFactory {
    pub connect_timeout: Duration,
    pub statement_timeout: Duration,
}

#[async_trait]
impl SqlRunnerFactory for MySqlRunnerFactory {
    #[instrument(skip(self), fields(host = %config.host), err)]
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn SqlRunner>, SqlError> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .disable_statement_logging();

        let conn = tokio::time::timeout(self.connect_timeout, MySqlConnection::connect_with(&options))
            .await
            .map_err(|_| SqlError::Timeout(self.connect_timeout))??;

        debug!(dsn = %config.redacted_dsn(), "Opened database connection");

        Ok(Box::new(MySqlRunner {
            conn: Some(conn),
            statement_timeout: self.statement_timeout,
        }))
    }
}

/// A runner that owns one connection for the duration of a reconcile.
pub struct MySqlRunner {
    conn: Option<MySqlConnection>,
    statement_timeout: Duration,
}

/// Race `fut` against cancellation and the statement deadline.
async fn run<T, F>(timeout: Duration, ctx: &CancellationToken, fut: F) -> Result<T, SqlError>
where
    F: Future<Output = Result<T, sqlx::Error>> + Send,
{
    tokio::select! {
        _ = ctx.cancelled() => Err(SqlError::Cancelled),
        res = tokio::time::timeout(timeout, fut) => match res {
            Ok(inner) => inner.map_err(SqlError::from),
            Err(_) => Err(SqlError::Timeout(timeout)),
        },
    }
}

fn decode_row(row: &MySqlRow) -> Result<Row, sqlx::Error> {
    (0..row.len()).map(|i| row.try_get_unchecked::<Option<String>, _>(i)).collect()
}

#[async_trait]
impl SqlRunner for MySqlRunner {
    #[instrument(skip(self, ctx, query), fields(statement = %query), err)]
    async fn execute(&mut self, ctx: &CancellationToken, query: &Query) -> Result<(), SqlError> {
        let sql = interpolate(query)?;
        let conn = self.conn.as_mut().ok_or(SqlError::Closed)?;
        run(self.statement_timeout, ctx, conn.execute(sqlx::raw_sql(&sql))).await?;
        Ok(())
    }

    #[instrument(skip(self, ctx, query), fields(statement = %query), err)]
    async fn query_scalar(&mut self, ctx: &CancellationToken, query: &Query) -> Result<Option<Row>, SqlError> {
        let sql = interpolate(query)?;
        let conn = self.conn.as_mut().ok_or(SqlError::Closed)?;
        let row = run(self.statement_timeout, ctx, conn.fetch_optional(sqlx::raw_sql(&sql))).await?;
        row.as_ref().map(decode_row).transpose().map_err(SqlError::from)
    }

    #[instrument(skip(self, ctx, query), fields(statement = %query), err)]
    async fn query_rows(&mut self, ctx: &CancellationToken, query: &Query) -> Result<Rows, SqlError> {
        let sql = interpolate(query)?;
        let conn = self.conn.as_mut().ok_or(SqlError::Closed)?;
        let rows = run(self.statement_timeout, ctx, conn.fetch_all(sqlx::raw_sql(&sql))).await?;
        let decoded = rows.iter().map(decode_row).collect::<Result<Vec<_>, _>>()?;
        Ok(Rows::new(decoded))
    }

    async fn close(&mut self) -> Result<(), SqlError> {
        match self.conn.take() {
            Some(conn) => conn.close().await.map_err(SqlError::from),
            None => Ok(()),
        }
    }
}
