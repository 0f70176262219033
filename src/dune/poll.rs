use std::time::Duration;

use backoff::{backoff::Constant, Error};
use tracing::debug;

use super::{DuneApi, DuneError, QueryDefinition, ResultId};

/// Asks Dune for the result of the latest execution until there is one. Waits `poll_interval`
/// between attempts and never gives up by itself, any error other than a pending result ends the
/// polling immediately.
pub async fn await_result_id(
    api: &impl DuneApi,
    query: &QueryDefinition,
    poll_interval: Duration,
) -> Result<ResultId, DuneError> {
    backoff::future::retry_notify(
        Constant::new(poll_interval),
        || async {
            match api.get_result_id(query.id, &query.parameters).await {
                Ok(Some(result_id)) => Ok(result_id),
                Ok(None) => Err(Error::transient(DuneError::ResultPending)),
                Err(err) => Err(Error::permanent(err)),
            }
        },
        |_err, wait: Duration| {
            debug!(
                query_id = query.id,
                wait_ms = wait.as_millis() as u64,
                "dune result not ready, polling again"
            );
        },
    )
    .await
}
