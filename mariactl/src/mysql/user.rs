//! User provisioning: identities, credentials, resource limits, grants and host pruning.
//!
//! A user exists once per allowed host (`'name'@'host'`). Creation, limits and grants are
//! sent as one atomic batch; pruning hosts that are no longer desired happens afterwards,
//! one idempotent `DROP USER IF EXISTS` at a time.

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use super::escape::{escape, escape_identifier};
use super::{Query, SqlArg, SqlRunner};
use crate::api::user::{Permission, UserLimits};
use crate::errors::{Error, Result};

/// A user as it should exist in the server, with its password already resolved.
#[derive(Clone, PartialEq, Eq)]
pub struct DesiredUser {
    pub name: String,
    pub password: String,
    pub allowed_hosts: Vec<String>,
    pub permissions: Vec<Permission>,
    pub limits: UserLimits,
}

impl std::fmt::Debug for DesiredUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DesiredUser")
            .field("name", &self.name)
            .field("allowed_hosts", &self.allowed_hosts)
            .field("permissions", &self.permissions)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

/// Hosts actually provisioned by the last successful pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedUser {
    pub allowed_hosts: Vec<String>,
}

/// Hosts in `observed` that are missing from `desired`, in `observed` order, without repeats.
pub fn hosts_to_prune(observed: &[String], desired: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for host in observed {
        if !desired.contains(host) && !out.contains(host) {
            out.push(host.clone());
        }
    }
    out
}

/// Distinct hosts, first occurrence wins.
fn distinct_hosts(hosts: &[String]) -> Vec<&str> {
    let mut out: Vec<&str> = Vec::with_capacity(hosts.len());
    for host in hosts {
        if !out.contains(&host.as_str()) {
            out.push(host);
        }
    }
    out
}

/// ` ?@? IDENTIFIED BY ?` per host, comma separated. Without a password only ` ?@?`.
fn identities(user: &str, password: Option<&str>, hosts: &[&str]) -> (String, Vec<SqlArg>) {
    let mut text = String::new();
    let mut args = Vec::with_capacity(hosts.len() * 3);

    for (i, host) in hosts.iter().enumerate() {
        if i > 0 {
            text.push(',');
        }
        args.push(SqlArg::from(user));
        args.push(SqlArg::from(*host));
        match password {
            Some(pwd) => {
                text.push_str(" ?@? IDENTIFIED BY ?");
                args.push(SqlArg::from(pwd));
            }
            None => text.push_str(" ?@?"),
        }
    }

    (text, args)
}

fn create_user_query(user: &DesiredUser, hosts: &[&str]) -> Result<Query> {
    let (ids, args) = identities(&user.name, Some(&user.password), hosts);
    Ok(Query::new(format!("CREATE USER IF NOT EXISTS{ids}"), args)?)
}

fn alter_user_query(user: &DesiredUser, hosts: &[&str]) -> Result<Query> {
    let (ids, mut args) = identities(&user.name, Some(&user.password), hosts);
    let mut text = format!("ALTER USER{ids}");

    let limits = user.limits.emitted();
    if !limits.is_empty() {
        text.push_str(" WITH");
        for (name, value) in limits {
            text.push_str(&format!(" {} ?", escape(name)));
            args.push(SqlArg::from(value));
        }
    }

    Ok(Query::new(text, args)?)
}

/// One `GRANT` per (permission, table). `None` when nothing is to be granted.
fn grants_query(user: &DesiredUser, hosts: &[&str]) -> Result<Option<Query>> {
    let mut grants = Vec::new();

    for perm in &user.permissions {
        if let Some(verb) = perm.permissions.iter().find(|v| v.contains(['?', '\'', '"', '`', '\\'])) {
            return Err(Error::validation(format!(
                "privilege {verb:?} for user {} on schema {} contains a quote or placeholder",
                user.name, perm.schema
            )));
        }
        let verbs = perm.permissions.iter().map(|v| escape(v)).collect::<Vec<_>>().join(", ");

        // Granting on every table takes an explicit "*"
        for table in &perm.tables {
            let (ids, args) = identities(&user.name, None, hosts);
            let target = format!("{}.{}", escape_identifier(&perm.schema), escape_identifier(table));
            grants.push(Query::new(format!("GRANT {verbs} ON {target} TO{ids}"), args)?);
        }
    }

    if grants.is_empty() {
        return Ok(None);
    }
    Ok(Some(Query::concatenate(grants)?))
}

/// The atomic create/alter/grant batch for `user`.
pub fn create_user_batch(user: &DesiredUser) -> Result<Query> {
    if user.allowed_hosts.is_empty() {
        return Err(Error::validation(format!("no allowed hosts specified for user {}", user.name)));
    }

    let hosts = distinct_hosts(&user.allowed_hosts);
    let mut queries = vec![create_user_query(user, &hosts)?, alter_user_query(user, &hosts)?];
    if let Some(grants) = grants_query(user, &hosts)? {
        queries.push(grants);
    }

    Ok(Query::atomic(queries)?)
}

pub fn drop_user_query(user: &str, host: &str) -> Result<Query> {
    Ok(Query::new("DROP USER IF EXISTS ?@?", vec![user.into(), host.into()])?)
}

/// Create or update `user` with its limits and grants as a single transaction.
///
/// Fails with a validation error, before any SQL is sent, when no hosts are allowed.
#[instrument(skip(runner, ctx, user), fields(user = %user.name), err)]
pub async fn create_user_if_not_exists(runner: &mut dyn SqlRunner, ctx: &CancellationToken, user: &DesiredUser) -> Result<()> {
    let batch = create_user_batch(user)?;

    runner
        .execute(ctx, &batch)
        .await
        .map_err(|e| Error::execution(format!("configure user {} (credentials/limits/grants)", user.name), e))
}

/// Remove one `user@host` identity along with its privileges. Idempotent.
#[instrument(skip(runner, ctx), err)]
pub async fn drop_user(runner: &mut dyn SqlRunner, ctx: &CancellationToken, user: &str, host: &str) -> Result<()> {
    let query = drop_user_query(user, host)?;

    runner
        .execute(ctx, &query)
        .await
        .map_err(|e| Error::execution(format!("delete user {user}@{host}"), e))
}

/// Drop identities for hosts that were provisioned before but are no longer desired.
///
/// Each drop is its own statement; the first failure is returned even though earlier
/// drops have already been applied. Re-running is safe.
#[instrument(skip(runner, ctx, observed, desired), err)]
pub async fn prune_stale_hosts(
    runner: &mut dyn SqlRunner,
    ctx: &CancellationToken,
    user: &str,
    observed: &[String],
    desired: &[String],
) -> Result<()> {
    for host in hosts_to_prune(observed, desired) {
        info!(user, host = %host, "Removing stale host entry");
        drop_user(runner, ctx, user, &host).await?;
    }
    Ok(())
}

/// Full provisioning pass: atomic create batch, then pruning against `observed`.
///
/// Returns the new observed record on success; the caller owns persisting it.
#[instrument(skip(runner, ctx, desired, observed), fields(user = %desired.name), err)]
pub async fn provision_user(
    runner: &mut dyn SqlRunner,
    ctx: &CancellationToken,
    desired: &DesiredUser,
    observed: &ObservedUser,
) -> Result<ObservedUser> {
    create_user_if_not_exists(runner, ctx, desired).await?;
    prune_stale_hosts(runner, ctx, &desired.name, &observed.allowed_hosts, &desired.allowed_hosts).await?;

    Ok(ObservedUser {
        allowed_hosts: desired.allowed_hosts.clone(),
    })
}
