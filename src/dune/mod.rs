//! Dune
//! ====
//! Fetches token holder snapshots from Dune. Dune offers no API for running our own parameterized
//! queries, so we log in the way the web app does, push the SQL of each query into a query we own,
//! execute it and poll for the result. All queries share one login session and run one after
//! another.

mod api;
mod fetch;
mod graphql;
mod poll;
mod queries;
mod session;

use std::path::PathBuf;

use thiserror::Error;

pub use api::{DuneApi, DuneApiHttp, MockDuneApi};
pub use fetch::{
    after_failure, fetch_all, fetch_dune_data, AfterFailure, DuneData, FetchOptions, QueryState,
};
pub use graphql::GRAPH_URL;
pub use poll::await_result_id;
pub use queries::{
    dune_queries, CutoffBlocks, ParameterType, QueryDefinition, QueryKey, QueryParameter,
};
pub use session::{DuneCredentials, Session, SessionManager, BASE_URL};

/// A single row of a query result. Columns depend on the query, rows are passed on untouched.
pub type ResultRow = serde_json::Map<String, serde_json::Value>;

/// Identifies the stored result of a finished execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultId(pub String);

impl std::fmt::Display for ResultId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum DuneError {
    #[error("dune authentication failed: {0}")]
    Auth(String),
    #[error("dune api request failed: {0}")]
    Request(String),
    /// The execution is still running. Drives polling, never leaves the poller.
    #[error("dune result not available yet")]
    ResultPending,
    #[error("no dune session, login first")]
    NotLoggedIn,
    #[error("unexpected dune response: {0}")]
    Decode(String),
    #[error("failed to read query sql from {path}")]
    Sql {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Non-success status without an `errors` payload to report.
    #[error("dune api responded with status {0}")]
    Status(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
