//! The GraphQL operations the Dune web app uses to store, run and read queries.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{DuneError, QueryDefinition, QueryParameter, ResultRow};

pub const GRAPH_URL: &str = "https://core-hsr.duneanalytics.com/v1/graphql";

// Account the queries we overwrite belong to.
const USER_ID: i64 = 84;

const UPSERT_QUERY: &str = "mutation UpsertQuery($object: queries_insert_input!, $on_conflict: queries_on_conflict!) { insert_queries_one(object: $object, on_conflict: $on_conflict) { id dataset_id name parameters updated_at __typename } }";

const EXECUTE_QUERY: &str = "mutation ExecuteQuery($query_id: Int!, $parameters: [Parameter!]!) { execute_query(query_id: $query_id, parameters: $parameters) { job_id __typename } }";

const GET_RESULT: &str = "query GetResult($query_id: Int!, $parameters: [Parameter!]) { get_result_v2(query_id: $query_id, parameters: $parameters) { job_id result_id error_id __typename } }";

const FIND_RESULT_DATA_BY_RESULT: &str = "query FindResultDataByResult($result_id: uuid!) { query_results(where: {id: {_eq: $result_id}}) { id job_id error runtime generated_at columns __typename } get_result_by_result_id(args: {want_result_id: $result_id}) { data __typename } }";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub operation_name: &'static str,
    pub variables: Value,
    pub query: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct Response<Data> {
    pub data: Option<Data>,
    pub errors: Option<Value>,
}

impl<Data> Response<Data> {
    /// Dune reports failures in an `errors` field, often next to a 200 status.
    pub fn into_data(self) -> Result<Data, DuneError> {
        if let Some(errors) = self.errors {
            return Err(DuneError::Request(errors.to_string()));
        }
        self.data
            .ok_or_else(|| DuneError::Decode("response has neither data nor errors".to_string()))
    }
}

#[derive(Debug, Deserialize)]
pub struct GetResultData {
    pub get_result_v2: GetResult,
}

#[derive(Debug, Deserialize)]
pub struct GetResult {
    #[allow(unused)]
    pub job_id: Option<String>,
    pub result_id: Option<String>,
    #[allow(unused)]
    pub error_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResultDataData {
    pub get_result_by_result_id: Vec<ResultDataRow>,
}

#[derive(Debug, Deserialize)]
pub struct ResultDataRow {
    pub data: ResultRow,
}

impl ResultDataData {
    pub fn into_rows(self) -> Vec<ResultRow> {
        self.get_result_by_result_id
            .into_iter()
            .map(|row| row.data)
            .collect()
    }
}

/// Overwrites the stored query with our SQL and parameters.
pub fn upsert_query(query: &QueryDefinition, sql: &str) -> Operation {
    Operation {
        operation_name: "UpsertQuery",
        variables: json!({
            "object": {
                "id": query.id,
                "schedule": null,
                "dataset_id": query.dataset_id,
                "name": query.name,
                "query": sql,
                "user_id": USER_ID,
                "description": "",
                "is_archived": false,
                "is_temp": false,
                "parameters": query.parameters,
                "visualizations": {
                    "data": [{ "type": "table", "name": "Query results", "options": {} }],
                    "on_conflict": {
                        "constraint": "visualizations_pkey",
                        "update_columns": ["name", "options"],
                    },
                },
            },
            "on_conflict": {
                "constraint": "queries_pkey",
                "update_columns": [
                    "dataset_id",
                    "name",
                    "description",
                    "query",
                    "schedule",
                    "is_archived",
                    "is_temp",
                    "tags",
                    "parameters",
                ],
            },
        }),
        query: UPSERT_QUERY,
    }
}

/// Parameters were stored with the query, the execution itself takes none.
pub fn execute_query(query_id: i64) -> Operation {
    Operation {
        operation_name: "ExecuteQuery",
        variables: json!({ "query_id": query_id, "parameters": [] }),
        query: EXECUTE_QUERY,
    }
}

pub fn get_result(query_id: i64, parameters: &[QueryParameter]) -> Operation {
    Operation {
        operation_name: "GetResult",
        variables: json!({ "query_id": query_id, "parameters": parameters }),
        query: GET_RESULT,
    }
}

pub fn find_result_data_by_result(result_id: &str) -> Operation {
    Operation {
        operation_name: "FindResultDataByResult",
        variables: json!({ "result_id": result_id }),
        query: FIND_RESULT_DATA_BY_RESULT,
    }
}
