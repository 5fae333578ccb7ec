//! Schema provisioning.

use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::escape::escape_identifier;
use super::{Query, SqlArg, SqlRunner};
use crate::errors::{Error, Result};

/// Build the `CREATE DATABASE IF NOT EXISTS` statement.
///
/// Character set and collation travel as bound arguments. The server grammar expects bare
/// names there, so a value containing anything beyond a plain name is rejected by the
/// server rather than interpreted.
pub fn create_database_query(name: &str, charset: &str, collation: &str) -> Result<Query> {
    let mut text = format!("CREATE DATABASE IF NOT EXISTS {}", escape_identifier(name));
    let mut args: Vec<SqlArg> = Vec::new();

    if !charset.is_empty() {
        text.push_str(" CHARACTER SET ?");
        args.push(charset.into());
    }

    if !collation.is_empty() {
        text.push_str(" COLLATE ?");
        args.push(collation.into());
    }

    Ok(Query::new(text, args)?)
}

pub fn drop_database_query(name: &str) -> Result<Query> {
    Ok(Query::plain(format!("DROP DATABASE IF EXISTS {}", escape_identifier(name)))?)
}

/// Create the schema unless it already exists. A single, non-atomic statement; not retried.
#[instrument(skip(runner, ctx), err)]
pub async fn create_database_if_not_exists(
    runner: &mut dyn SqlRunner,
    ctx: &CancellationToken,
    name: &str,
    charset: &str,
    collation: &str,
) -> Result<()> {
    let query = create_database_query(name, charset, collation)?;

    runner
        .execute(ctx, &query)
        .await
        .map_err(|e| Error::execution(format!("create database {name}"), e))
}

/// Drop the schema. Idempotent thanks to `IF EXISTS`.
#[instrument(skip(runner, ctx), err)]
pub async fn drop_database(runner: &mut dyn SqlRunner, ctx: &CancellationToken, name: &str) -> Result<()> {
    let query = drop_database_query(name)?;

    runner
        .execute(ctx, &query)
        .await
        .map_err(|e| Error::execution(format!("remove database {name}"), e))
}
