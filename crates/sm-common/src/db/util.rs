#![allow(async_fn_in_trait)]

use std::sync::OnceLock;
use std::time::Instant;

use deadpool_postgres::GenericClient;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Row, ToStatement};
use tracing::warn;

fn slow_query_threshold_ms() -> Option<u64> {
    static CACHE: OnceLock<Option<u64>> = OnceLock::new();

    *CACHE.get_or_init(|| parse_threshold(std::env::var("SM_DB_LOG_MIN_DURATION_MS").ok()))
}

fn parse_threshold(raw: Option<String>) -> Option<u64> {
    raw.and_then(|raw| raw.trim().parse::<i64>().ok())
        .map(|v| v.max(0) as u64)
        .filter(|v| *v > 0)
}

fn maybe_log_slow_query(label: &str, started_at: Instant) {
    if let Some(threshold_ms) = slow_query_threshold_ms() {
        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        if elapsed_ms >= threshold_ms {
            warn!(query = label, elapsed_ms, threshold_ms, "slow_query_detected");
        }
    }
}

/// Query helpers that log a `slow_query_detected` warning when a statement
/// exceeds `SM_DB_LOG_MIN_DURATION_MS`. Works on pooled clients and
/// transactions alike.
pub trait TimedClientExt: GenericClient {
    async fn timed_query<S>(
        &self,
        statement: &S,
        params: &[&(dyn ToSql + Sync)],
        label: &str,
    ) -> Result<Vec<Row>, tokio_postgres::Error>
    where
        S: ToStatement + Sync + Send + ?Sized,
    {
        let started = Instant::now();
        let result = self.query(statement, params).await;
        maybe_log_slow_query(label, started);
        result
    }

    async fn timed_query_opt<S>(
        &self,
        statement: &S,
        params: &[&(dyn ToSql + Sync)],
        label: &str,
    ) -> Result<Option<Row>, tokio_postgres::Error>
    where
        S: ToStatement + Sync + Send + ?Sized,
    {
        let started = Instant::now();
        let result = self.query_opt(statement, params).await;
        maybe_log_slow_query(label, started);
        result
    }

    async fn timed_query_one<S>(
        &self,
        statement: &S,
        params: &[&(dyn ToSql + Sync)],
        label: &str,
    ) -> Result<Row, tokio_postgres::Error>
    where
        S: ToStatement + Sync + Send + ?Sized,
    {
        let started = Instant::now();
        let result = self.query_one(statement, params).await;
        maybe_log_slow_query(label, started);
        result
    }

    async fn timed_execute<S>(
        &self,
        statement: &S,
        params: &[&(dyn ToSql + Sync)],
        label: &str,
    ) -> Result<u64, tokio_postgres::Error>
    where
        S: ToStatement + Sync + Send + ?Sized,
    {
        let started = Instant::now();
        let result = self.execute(statement, params).await;
        maybe_log_slow_query(label, started);
        result
    }
}

impl<T: GenericClient + ?Sized> TimedClientExt for T {}
