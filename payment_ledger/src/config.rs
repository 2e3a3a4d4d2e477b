use std::{env, time::Duration};

use ledger_common::helpers::{parse_boolean_flag, parse_number};
use log::*;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/ledger.db";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_GATEWAY_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 25;
pub const DEFAULT_GROUP_LEASE_MS: u64 = 60_000;
pub const DEFAULT_LOCK_WAIT_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// How long SQLite waits on a locked database before giving up.
    pub busy_timeout: Duration,
    pub create_if_missing: bool,
    /// Upper bound on a single gateway call. An expired call counts as "no decision".
    pub gateway_timeout: Duration,
    pub event_buffer_size: usize,
    /// How long a claim on a group survives a holder that never releases it. Always longer than `gateway_timeout`.
    pub group_lease: Duration,
    /// How long `lock_group` waits for a group claimed by another process.
    pub lock_wait: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            create_if_missing: true,
            gateway_timeout: Duration::from_millis(DEFAULT_GATEWAY_TIMEOUT_MS),
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
            group_lease: Duration::from_millis(DEFAULT_GROUP_LEASE_MS),
            lock_wait: Duration::from_millis(DEFAULT_LOCK_WAIT_MS),
        }
    }
}

fn numeric_setting<T>(name: &str, default: T) -> T
where T: std::str::FromStr + std::fmt::Display + Copy {
    let raw = env::var(name).ok();
    match (raw.as_deref(), parse_number::<T>(raw.clone())) {
        (None, _) => default,
        (Some(_), Some(v)) => v,
        (Some(s), None) => {
            warn!("🪛️ {s} is not a valid value for {name}. Using the default, {default}, instead.");
            default
        },
    }
}

impl LedgerConfig {
    pub fn new<S: Into<String>>(database_url: S) -> Self {
        Self { database_url: database_url.into(), ..Default::default() }
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_gateway_timeout(mut self, gateway_timeout: Duration) -> Self {
        self.gateway_timeout = gateway_timeout;
        self.group_lease = lease_for(self.group_lease, gateway_timeout);
        self
    }

    pub fn with_lock_wait(mut self, lock_wait: Duration) -> Self {
        self.lock_wait = lock_wait;
        self
    }

    pub fn from_env_or_default() -> Self {
        let database_url = env::var("LEDGER_DATABASE_URL").ok().unwrap_or_else(|| {
            info!("🪛️ LEDGER_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let mut max_connections = numeric_setting("LEDGER_DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS);
        if max_connections == 0 {
            warn!("🪛️ LEDGER_DB_MAX_CONNECTIONS must be at least 1. Using the default, {DEFAULT_MAX_CONNECTIONS}.");
            max_connections = DEFAULT_MAX_CONNECTIONS;
        }
        let busy_timeout = numeric_setting("LEDGER_DB_BUSY_TIMEOUT_MS", DEFAULT_BUSY_TIMEOUT_MS);
        let create_if_missing = parse_boolean_flag(env::var("LEDGER_DB_CREATE_IF_MISSING").ok(), true);
        let gateway_timeout = numeric_setting("LEDGER_GATEWAY_TIMEOUT_MS", DEFAULT_GATEWAY_TIMEOUT_MS);
        let event_buffer_size = numeric_setting("LEDGER_EVENT_BUFFER_SIZE", DEFAULT_EVENT_BUFFER_SIZE).max(1);
        let gateway_timeout = Duration::from_millis(gateway_timeout);
        let group_lease = Duration::from_millis(numeric_setting("LEDGER_GROUP_LEASE_MS", DEFAULT_GROUP_LEASE_MS));
        let group_lease = lease_for(group_lease, gateway_timeout);
        let lock_wait = Duration::from_millis(numeric_setting("LEDGER_LOCK_WAIT_MS", DEFAULT_LOCK_WAIT_MS));
        debug!(
            "🪛️ Ledger configuration: {max_connections} connections, busy timeout {busy_timeout} ms, gateway timeout \
             {} ms, group lease {} ms",
            gateway_timeout.as_millis(),
            group_lease.as_millis()
        );
        Self {
            database_url,
            max_connections,
            busy_timeout: Duration::from_millis(busy_timeout),
            create_if_missing,
            gateway_timeout,
            event_buffer_size,
            group_lease,
            lock_wait,
        }
    }
}

/// A lease must outlive the gateway call made under it.
fn lease_for(lease: Duration, gateway_timeout: Duration) -> Duration {
    if lease > gateway_timeout {
        lease
    } else {
        let adjusted = gateway_timeout * 2;
        warn!(
            "🪛️ A group lease of {} ms does not outlast the gateway timeout. Using {} ms instead.",
            lease.as_millis(),
            adjusted.as_millis()
        );
        adjusted
    }
}
