//! Runs the holder queries one by one over a single Dune session. A failed query is retried after
//! logging in again, a query that keeps failing fails the whole run.

use std::{collections::BTreeMap, path::Path, time::Duration};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::env::ENV_CONFIG;

use super::{
    await_result_id, dune_queries, CutoffBlocks, DuneApi, DuneApiHttp, DuneCredentials,
    DuneError, QueryDefinition, QueryKey, ResultId, ResultRow, SessionManager,
};

#[derive(Clone, Copy, Debug)]
pub struct FetchOptions {
    /// Retries per query after the first attempt.
    pub max_retries: u32,
    pub poll_interval: Duration,
    /// Pause between queries, Dune rate limits executions.
    pub query_pause: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_retries: 2,
            poll_interval: Duration::from_secs(10),
            query_pause: Duration::from_secs(1),
        }
    }
}

/// Rows per query, serializes to an object keyed by the output names.
#[derive(Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DuneData(pub BTreeMap<QueryKey, Vec<ResultRow>>);

impl DuneData {
    pub fn rows(&self, key: QueryKey) -> Option<&[ResultRow]> {
        self.0.get(&key).map(Vec::as_slice)
    }
}

/// Where a single attempt at a query is.
#[derive(Debug)]
pub enum QueryState {
    Pending,
    Submitted,
    Executing,
    PollingResult,
    Fetching(ResultId),
    Done(Vec<ResultRow>),
    Failed(DuneError),
}

#[derive(Debug, PartialEq, Eq)]
pub enum AfterFailure {
    /// Log in again and start the query over.
    Retry,
    GiveUp,
}

/// `attempt` counts from zero.
pub fn after_failure(attempt: u32, max_retries: u32) -> AfterFailure {
    if attempt < max_retries {
        AfterFailure::Retry
    } else {
        AfterFailure::GiveUp
    }
}

async fn step(
    api: &impl DuneApi,
    query: &QueryDefinition,
    state: QueryState,
    options: &FetchOptions,
) -> QueryState {
    let next = match state {
        QueryState::Pending => {
            let upserted = match query.load_sql() {
                Ok(sql) => api.upsert_query(query, &sql).await,
                Err(err) => Err(err),
            };
            upserted.map(|_| QueryState::Submitted)
        }
        QueryState::Submitted => api
            .execute_query(query.id)
            .await
            .map(|_| QueryState::Executing),
        QueryState::Executing => Ok(QueryState::PollingResult),
        QueryState::PollingResult => await_result_id(api, query, options.poll_interval)
            .await
            .map(QueryState::Fetching),
        QueryState::Fetching(result_id) => {
            debug!(query_id = query.id, %result_id, "fetching result rows");
            api.get_result_rows(&result_id).await.map(QueryState::Done)
        }
        done_or_failed => Ok(done_or_failed),
    };

    next.unwrap_or_else(QueryState::Failed)
}

async fn fetch_query(
    api: &mut impl DuneApi,
    query: &QueryDefinition,
    options: &FetchOptions,
) -> Result<Vec<ResultRow>, DuneError> {
    let mut attempt = 0;
    let mut state = QueryState::Pending;

    loop {
        state = match state {
            QueryState::Done(rows) => {
                info!(query = %query.name, rows = rows.len(), "fetched dune query");
                return Ok(rows);
            }
            QueryState::Failed(err) => match after_failure(attempt, options.max_retries) {
                AfterFailure::GiveUp => {
                    error!(query = %query.name, attempt, %err, "dune query failed, giving up");
                    return Err(err);
                }
                AfterFailure::Retry => {
                    attempt += 1;
                    warn!(
                        query = %query.name,
                        attempt,
                        %err,
                        "dune query failed, logging in again and retrying"
                    );
                    // The session may be what broke, a failed login counts as a failed attempt.
                    match api.login().await {
                        Ok(()) => QueryState::Pending,
                        Err(err) => QueryState::Failed(err),
                    }
                }
            },
            state => {
                debug!(query = %query.name, attempt, ?state, "dune query step");
                step(&*api, query, state, options).await
            }
        };
    }
}

/// Logs in once, then runs `queries` in order. Any query exhausting its retries aborts the run,
/// no partial data is returned.
pub async fn fetch_all(
    api: &mut impl DuneApi,
    queries: &[QueryDefinition],
    options: &FetchOptions,
) -> Result<DuneData, DuneError> {
    api.login().await?;

    let mut data = DuneData::default();
    for (i, query) in queries.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(options.query_pause).await;
        }
        info!(query = %query.name, query_id = query.id, "running dune query");
        let rows = fetch_query(api, query, options).await?;
        data.0.insert(query.key, rows);
    }

    Ok(data)
}

/// Fetches all holder snapshots with the credentials from the environment.
pub async fn fetch_dune_data(
    cutoffs: &CutoffBlocks,
    sql_dir: Option<&Path>,
    options: &FetchOptions,
) -> anyhow::Result<DuneData> {
    let credentials = DuneCredentials::from_env()?;
    let sql_dir = sql_dir.unwrap_or_else(|| Path::new(&ENV_CONFIG.sql_dir));
    let queries = dune_queries(cutoffs, sql_dir);

    let mut api = DuneApiHttp::new(SessionManager::new(credentials));
    let data = fetch_all(&mut api, &queries, options).await?;

    Ok(data)
}
