use async_trait::async_trait;
use mockall::automock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::performance::TimedExt;

use super::{
    graphql::{self, GetResultData, Operation, Response, ResultDataData},
    DuneError, QueryDefinition, QueryParameter, ResultId, ResultRow, Session, SessionManager,
    GRAPH_URL,
};

/// Everything the fetch needs from Dune. The HTTP implementation keeps a single session, a login
/// replaces it.
#[automock]
#[async_trait]
pub trait DuneApi {
    async fn login(&mut self) -> Result<(), DuneError>;
    async fn upsert_query(&self, query: &QueryDefinition, sql: &str) -> Result<(), DuneError>;
    async fn execute_query(&self, query_id: i64) -> Result<(), DuneError>;
    /// `None` while the execution is still running.
    async fn get_result_id(
        &self,
        query_id: i64,
        parameters: &[QueryParameter],
    ) -> Result<Option<ResultId>, DuneError>;
    async fn get_result_rows(&self, result_id: &ResultId) -> Result<Vec<ResultRow>, DuneError>;
}

pub struct DuneApiHttp {
    graph_url: String,
    session_manager: SessionManager,
    session: Option<Session>,
}

impl DuneApiHttp {
    pub fn new(session_manager: SessionManager) -> Self {
        Self::new_with_url(GRAPH_URL, session_manager)
    }

    pub fn new_with_url(graph_url: &str, session_manager: SessionManager) -> Self {
        Self {
            graph_url: graph_url.to_string(),
            session_manager,
            session: None,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    async fn send<Data: DeserializeOwned>(&self, operation: Operation) -> Result<Data, DuneError> {
        let session = self.session.as_ref().ok_or(DuneError::NotLoggedIn)?;

        debug!(operation = operation.operation_name, "sending dune graphql request");

        let res = session
            .client()
            .post(&self.graph_url)
            .bearer_auth(session.token())
            .json(&operation)
            .send()
            .timed(operation.operation_name)
            .await?;
        let status = res.status();
        let body = res.bytes().await?;

        // Errors such as an expired token arrive with a 4xx status, keep their payload.
        if !status.is_success() {
            return match serde_json::from_slice::<Response<Value>>(&body) {
                Ok(Response {
                    errors: Some(errors),
                    ..
                }) => Err(DuneError::Request(errors.to_string())),
                _ => Err(DuneError::Status(status)),
            };
        }

        serde_json::from_slice::<Response<Data>>(&body)
            .map_err(|err| DuneError::Decode(err.to_string()))?
            .into_data()
    }
}

#[async_trait]
impl DuneApi for DuneApiHttp {
    async fn login(&mut self) -> Result<(), DuneError> {
        // A failed login must not leave the previous, possibly invalid, session behind.
        self.session = None;
        self.session = Some(self.session_manager.login().await?);
        Ok(())
    }

    async fn upsert_query(&self, query: &QueryDefinition, sql: &str) -> Result<(), DuneError> {
        self.send::<Value>(graphql::upsert_query(query, sql))
            .await
            .map(|_| ())
    }

    async fn execute_query(&self, query_id: i64) -> Result<(), DuneError> {
        self.send::<Value>(graphql::execute_query(query_id))
            .await
            .map(|_| ())
    }

    async fn get_result_id(
        &self,
        query_id: i64,
        parameters: &[QueryParameter],
    ) -> Result<Option<ResultId>, DuneError> {
        self.send::<GetResultData>(graphql::get_result(query_id, parameters))
            .await
            .map(|data| data.get_result_v2.result_id.map(ResultId))
    }

    async fn get_result_rows(&self, result_id: &ResultId) -> Result<Vec<ResultRow>, DuneError> {
        self.send::<ResultDataData>(graphql::find_result_data_by_result(&result_id.0))
            .await
            .map(ResultDataData::into_rows)
    }
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, ServerGuard};
    use serde_json::json;

    use super::*;
    use crate::dune::{session::test_utils::mock_login, DuneCredentials};

    async fn logged_in_api(server: &mut ServerGuard) -> DuneApiHttp {
        mock_login(server, 200).await;
        let session_manager = SessionManager::new_with_url(
            &server.url(),
            DuneCredentials {
                username: "ultrasound".to_string(),
                password: "hunter2".to_string(),
            },
        );
        let graph_url = format!("{}/v1/graphql", server.url());
        let mut api = DuneApiHttp::new_with_url(&graph_url, session_manager);
        api.login().await.unwrap();
        api
    }

    #[tokio::test]
    async fn send_before_login_test() {
        let session_manager = SessionManager::new_with_url(
            "http://localhost:1",
            DuneCredentials {
                username: "ultrasound".to_string(),
                password: "hunter2".to_string(),
            },
        );
        let api = DuneApiHttp::new_with_url("http://localhost:1/v1/graphql", session_manager);
        let result = api.execute_query(855391).await;
        assert!(matches!(result, Err(DuneError::NotLoggedIn)));
    }

    #[tokio::test]
    async fn failed_login_leaves_no_session_test() {
        let mut server = mockito::Server::new_async().await;
        mock_login(&mut server, 500).await;
        let session_manager = SessionManager::new_with_url(
            &server.url(),
            DuneCredentials {
                username: "ultrasound".to_string(),
                password: "hunter2".to_string(),
            },
        );
        let mut api = DuneApiHttp::new(session_manager);

        let result = api.login().await;

        assert!(matches!(result, Err(DuneError::Auth(_))));
        assert!(api.session().is_none());
    }

    #[tokio::test]
    async fn get_result_id_test() {
        let mut server = mockito::Server::new_async().await;
        let api = logged_in_api(&mut server).await;
        server
            .mock("POST", "/v1/graphql")
            .match_header("authorization", "Bearer bearer-token")
            .match_body(Matcher::PartialJson(json!({
                "operationName": "GetResult",
                "variables": { "query_id": 855391 }
            })))
            .with_status(200)
            .with_body(
                json!({
                    "data": {
                        "get_result_v2": {
                            "job_id": "7d1b",
                            "result_id": "1e6a5b0c-49b7-4a23-9d5e-3b0f6b7c2a11",
                            "error_id": null
                        }
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let result_id = api.get_result_id(855391, &[]).await.unwrap();

        assert_eq!(
            result_id,
            Some(ResultId(
                "1e6a5b0c-49b7-4a23-9d5e-3b0f6b7c2a11".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn get_result_rows_keeps_order_test() {
        let mut server = mockito::Server::new_async().await;
        let api = logged_in_api(&mut server).await;
        let rows: Vec<Value> = (0..25)
            .map(|i| json!({ "address": format!("0x{i:040x}"), "balance": 1000 - i }))
            .collect();
        server
            .mock("POST", "/v1/graphql")
            .match_body(Matcher::PartialJson(json!({
                "operationName": "FindResultDataByResult"
            })))
            .with_status(200)
            .with_body(
                json!({
                    "data": {
                        "query_results": [],
                        "get_result_by_result_id": rows
                            .iter()
                            .map(|row| json!({ "data": row, "__typename": "get_result_template" }))
                            .collect::<Vec<_>>()
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let fetched = api
            .get_result_rows(&ResultId("1e6a".to_string()))
            .await
            .unwrap();

        assert_eq!(fetched.len(), 25);
        let fetched: Vec<Value> = fetched.into_iter().map(Value::Object).collect();
        assert_eq!(fetched, rows);
    }

    #[tokio::test]
    async fn service_error_is_request_error_test() {
        let mut server = mockito::Server::new_async().await;
        let api = logged_in_api(&mut server).await;
        server
            .mock("POST", "/v1/graphql")
            .with_status(200)
            .with_body(
                json!({
                    "errors": [{ "message": "query is already running" }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let result = api.execute_query(855391).await;

        match result {
            Err(DuneError::Request(payload)) => {
                assert!(payload.contains("query is already running"))
            }
            other => panic!("expected request error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_status_keeps_error_payload_test() {
        let mut server = mockito::Server::new_async().await;
        let api = logged_in_api(&mut server).await;
        server
            .mock("POST", "/v1/graphql")
            .with_status(400)
            .with_body(json!({ "errors": [{ "message": "invalid-jwt" }] }).to_string())
            .create_async()
            .await;

        let result = api.get_result_id(855391, &[]).await;

        match result {
            Err(DuneError::Request(payload)) => assert!(payload.contains("invalid-jwt")),
            other => panic!("expected request error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_status_without_payload_test() {
        let mut server = mockito::Server::new_async().await;
        let api = logged_in_api(&mut server).await;
        server
            .mock("POST", "/v1/graphql")
            .with_status(502)
            .with_body("<html>bad gateway</html>")
            .create_async()
            .await;

        let result = api.execute_query(855391).await;

        assert!(matches!(
            result,
            Err(DuneError::Status(status)) if status.as_u16() == 502
        ));
    }

    #[tokio::test]
    async fn get_result_rows_keeps_column_order_test() {
        let mut server = mockito::Server::new_async().await;
        let api = logged_in_api(&mut server).await;
        server
            .mock("POST", "/v1/graphql")
            .with_status(200)
            .with_body(
                r#"{"data":{"get_result_by_result_id":[{"data":{"zeta":1,"address":"0x01","balance":2}}]}}"#,
            )
            .create_async()
            .await;

        let rows = api
            .get_result_rows(&ResultId("1e6a".to_string()))
            .await
            .unwrap();

        let columns: Vec<&str> = rows[0].keys().map(String::as_str).collect();
        assert_eq!(columns, vec!["zeta", "address", "balance"]);
    }
}
