//! JSON-over-HTTP client for a Temporal-style workflow service.
//!
//! Starts workflows with
//! `POST /api/v1/namespaces/{namespace}/workflows/{workflowId}` and lists them
//! with `GET /api/v1/namespaces/{namespace}/workflows?query=...`, following
//! `nextPageToken` until the service returns an empty token.
//!
//! Workflow inputs and search attributes travel as payloads: base64 JSON data
//! with base64 `encoding` (and, for search attributes, `type`) metadata.
//! Listed attribute values are decoded back to their JSON text (`3`,
//! `"gold"`) and left for the attribute codec to interpret.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::attributes::AttributeValue;
use crate::error::{EngineError, RunError};
use crate::model::ExecutionRecord;

use super::{ExecutionEngine, ListFilter, SubmitRequest};

/// Payload encoding used for every value this client writes.
const JSON_ENCODING: &str = "json/plain";

/// How the client authenticates to the service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Credentials {
    /// No authentication (local development server).
    #[default]
    None,
    /// Bearer API key, sent with a `temporal-namespace` header.
    ApiKey(String),
    /// Mutual TLS with a PEM client certificate and private key.
    Mtls { cert_pem: Vec<u8>, key_pem: Vec<u8> },
}

/// Connection settings for [`HttpEngine`].
#[derive(Debug, Clone)]
pub struct HttpEngineConfig {
    /// Service address, e.g. `http://localhost:7243`.
    pub address: String,
    /// Namespace holding the run's workflows.
    pub namespace: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Authentication.
    pub credentials: Credentials,
}

/// [`ExecutionEngine`] backed by a workflow service's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpEngine {
    client: reqwest::Client,
    base_url: String,
    namespace: String,
}

impl HttpEngine {
    /// Builds the client. Fails on unusable credentials.
    pub fn new(config: HttpEngineConfig) -> Result<Self, RunError> {
        let mut headers = HeaderMap::new();
        let mut builder = reqwest::Client::builder().timeout(config.request_timeout);

        match &config.credentials {
            Credentials::None => {}
            Credentials::ApiKey(key) => {
                let bearer = HeaderValue::from_str(&format!("Bearer {key}"))
                    .map_err(|e| RunError::config(format!("Invalid API key: {e}")))?;
                headers.insert(AUTHORIZATION, bearer);
                let namespace = HeaderValue::from_str(&config.namespace)
                    .map_err(|e| RunError::config(format!("Invalid namespace: {e}")))?;
                headers.insert("temporal-namespace", namespace);
            }
            Credentials::Mtls { cert_pem, key_pem } => {
                let mut pem = cert_pem.clone();
                pem.push(b'\n');
                pem.extend_from_slice(key_pem);
                let identity = reqwest::Identity::from_pem(&pem)
                    .map_err(|e| RunError::config(format!("Invalid client certificate: {e}")))?;
                builder = builder.identity(identity);
            }
        }

        let client = builder
            .default_headers(headers)
            .build()
            .map_err(|e| RunError::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: normalize_address(&config.address, &config.credentials),
            namespace: config.namespace,
        })
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn workflows_url(&self) -> String {
        format!(
            "{}/api/v1/namespaces/{}/workflows",
            self.base_url,
            urlencoding::encode(&self.namespace)
        )
    }

    async fn list_page(
        &self,
        query: &str,
        page_token: &str,
    ) -> Result<ListWorkflowsResponse, EngineError> {
        let url = format!(
            "{}?query={}&nextPageToken={}",
            self.workflows_url(),
            urlencoding::encode(query),
            urlencoding::encode(page_token)
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::classify_reqwest(&e))?;
        let response = check_status(response).await?;
        response.json::<ListWorkflowsResponse>().await.map_err(|e| EngineError::Decode {
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl ExecutionEngine for HttpEngine {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn submit(&self, request: SubmitRequest) -> Result<(), EngineError> {
        let url = format!(
            "{}/{}",
            self.workflows_url(),
            urlencoding::encode(&request.job_id)
        );
        let body = start_workflow_body(&request);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::classify_reqwest(&e))?;
        check_status(response).await?;
        Ok(())
    }

    async fn query(&self, filter: &ListFilter) -> Result<Vec<ExecutionRecord>, EngineError> {
        let query = filter.to_query();
        let mut records = Vec::new();
        let mut page_token = String::new();
        let mut seen_tokens = HashSet::new();
        let mut pages = 0usize;

        loop {
            let page = self.list_page(&query, &page_token).await?;
            pages += 1;
            for execution in page.executions {
                records.push(execution.into_record()?);
            }

            match page.next_page_token {
                Some(next) if !next.is_empty() => {
                    if !seen_tokens.insert(next.clone()) {
                        return Err(EngineError::Decode {
                            message: format!("service repeated page token '{next}'"),
                        });
                    }
                    page_token = next;
                }
                _ => break,
            }
        }

        tracing::debug!(
            query = %query,
            pages,
            records = records.len(),
            "Listed workflow executions"
        );
        Ok(records)
    }
}

/// Prefixes a scheme when the address has none: `https` with credentials,
/// `http` otherwise.
fn normalize_address(address: &str, credentials: &Credentials) -> String {
    let trimmed = address.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else if *credentials == Credentials::None {
        format!("http://{trimmed}")
    } else {
        format!("https://{trimmed}")
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, EngineError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::CONFLICT {
        Err(EngineError::Rejected { message: body })
    } else {
        Err(EngineError::Http {
            status: status.as_u16(),
            body,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Payload {
    #[serde(default)]
    metadata: BTreeMap<String, String>,
    #[serde(default)]
    data: String,
}

impl Payload {
    fn json(value: &Value) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("encoding".to_string(), BASE64.encode(JSON_ENCODING));
        Self {
            metadata,
            data: BASE64.encode(value.to_string()),
        }
    }

    fn search_attribute(value: &AttributeValue) -> Self {
        let mut payload = Self::json(&value.to_json());
        payload
            .metadata
            .insert("type".to_string(), BASE64.encode(value.type_name()));
        payload
    }

    fn decode_text(&self) -> Result<String, String> {
        let bytes = BASE64.decode(&self.data).map_err(|e| e.to_string())?;
        String::from_utf8(bytes).map_err(|e| e.to_string())
    }
}

fn start_workflow_body(request: &SubmitRequest) -> Value {
    let indexed_fields: BTreeMap<&str, Payload> = request
        .attributes
        .iter()
        .map(|(name, value)| (*name, Payload::search_attribute(value)))
        .collect();

    json!({
        "workflowId": request.job_id,
        "workflowType": { "name": request.workflow_type },
        "taskQueue": { "name": request.task_queue },
        "input": { "payloads": [Payload::json(&request.input)] },
        "workflowStartDelay": format!("{:.3}s", request.start_delay.as_secs_f64()),
        "searchAttributes": { "indexedFields": indexed_fields },
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListWorkflowsResponse {
    #[serde(default)]
    executions: Vec<WorkflowExecutionInfo>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkflowExecutionInfo {
    execution: WorkflowExecution,
    #[serde(default)]
    search_attributes: Option<SearchAttributes>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkflowExecution {
    workflow_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchAttributes {
    #[serde(default)]
    indexed_fields: BTreeMap<String, Payload>,
}

impl WorkflowExecutionInfo {
    fn into_record(self) -> Result<ExecutionRecord, EngineError> {
        let id = self.execution.workflow_id;
        let fields = self.search_attributes.unwrap_or_default().indexed_fields;
        let mut record = ExecutionRecord::new(id.as_str());
        for (name, payload) in fields {
            let text = payload.decode_text().map_err(|e| EngineError::Decode {
                message: format!("attribute '{name}' on '{id}': {e}"),
            })?;
            record = record.with_attribute(name, text);
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{ACTIVITIES_COMPLETED, FAIRNESS_KEY, FAIRNESS_WEIGHT, PRIORITY};
    use crate::engine::FAIRNESS_WORKFLOW;
    use mockito::Matcher;

    fn engine_for(server: &mockito::ServerGuard, credentials: Credentials) -> HttpEngine {
        HttpEngine::new(HttpEngineConfig {
            address: server.url(),
            namespace: "default".to_string(),
            request_timeout: Duration::from_secs(5),
            credentials,
        })
        .unwrap()
    }

    fn fairness_request() -> SubmitRequest {
        SubmitRequest {
            job_id: "t-1".to_string(),
            task_queue: "fairness-queue".to_string(),
            workflow_type: FAIRNESS_WORKFLOW,
            input: json!({"fairnessKey": "gold", "fairnessWeight": 10.0, "disableFairness": false}),
            attributes: vec![
                (FAIRNESS_KEY, AttributeValue::Keyword("gold".to_string())),
                (FAIRNESS_WEIGHT, AttributeValue::Int(10)),
                (ACTIVITIES_COMPLETED, AttributeValue::Int(0)),
            ],
            start_delay: Duration::from_millis(12_345),
        }
    }

    fn listed(id: &str, attrs: &[(&str, Value)]) -> Value {
        let fields: serde_json::Map<String, Value> = attrs
            .iter()
            .map(|(k, v)| {
                (
                    k.to_string(),
                    serde_json::to_value(Payload::json(v)).unwrap(),
                )
            })
            .collect();
        json!({
            "execution": {"workflowId": id, "runId": "r"},
            "searchAttributes": {"indexedFields": fields},
        })
    }

    #[test]
    fn test_normalize_address() {
        assert_eq!(
            normalize_address("http://localhost:7243/", &Credentials::None),
            "http://localhost:7243"
        );
        assert_eq!(
            normalize_address("localhost:7243", &Credentials::None),
            "http://localhost:7243"
        );
        assert_eq!(
            normalize_address("ns.tmprl.cloud:7243", &Credentials::ApiKey("k".into())),
            "https://ns.tmprl.cloud:7243"
        );
    }

    #[test]
    fn test_start_workflow_body_shape() {
        let body = start_workflow_body(&fairness_request());
        assert_eq!(body["workflowId"], "t-1");
        assert_eq!(body["workflowType"]["name"], FAIRNESS_WORKFLOW);
        assert_eq!(body["taskQueue"]["name"], "fairness-queue");
        assert_eq!(body["workflowStartDelay"], "12.345s");

        let key = &body["searchAttributes"]["indexedFields"][FAIRNESS_KEY];
        assert_eq!(key["metadata"]["type"], BASE64.encode("Keyword"));
        assert_eq!(key["metadata"]["encoding"], BASE64.encode("json/plain"));
        assert_eq!(key["data"], BASE64.encode("\"gold\""));

        let input = &body["input"]["payloads"][0];
        let decoded = BASE64.decode(input["data"].as_str().unwrap()).unwrap();
        let value: Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(value["fairnessKey"], "gold");
    }

    #[tokio::test]
    async fn test_submit_posts_start_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/namespaces/default/workflows/t-1")
            .match_header("authorization", "Bearer secret")
            .match_header("temporal-namespace", "default")
            .match_body(Matcher::PartialJson(json!({
                "workflowId": "t-1",
                "workflowType": {"name": FAIRNESS_WORKFLOW},
                "taskQueue": {"name": "fairness-queue"},
            })))
            .with_status(200)
            .with_body(r#"{"runId":"abc"}"#)
            .create_async()
            .await;

        let engine = engine_for(&server, Credentials::ApiKey("secret".to_string()));
        engine.submit(fairness_request()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_submit_conflict_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/namespaces/default/workflows/t-1")
            .with_status(409)
            .with_body(r#"{"message":"Workflow execution already started"}"#)
            .create_async()
            .await;

        let engine = engine_for(&server, Credentials::None);
        let err = engine.submit(fairness_request()).await.unwrap_err();
        match err {
            EngineError::Rejected { message } => assert!(message.contains("already started")),
            other => panic!("Expected Rejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_submit_server_error_is_http() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/namespaces/default/workflows/t-1")
            .with_status(503)
            .with_body("unavailable")
            .create_async()
            .await;

        let engine = engine_for(&server, Credentials::None);
        let err = engine.submit(fairness_request()).await.unwrap_err();
        assert_eq!(
            err,
            EngineError::Http {
                status: 503,
                body: "unavailable".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_query_follows_pagination() {
        let mut server = mockito::Server::new_async().await;
        let query = "WorkflowId STARTS_WITH \"t\"";

        let first = server
            .mock("GET", "/api/v1/namespaces/default/workflows")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("query".into(), query.into()),
                Matcher::UrlEncoded("nextPageToken".into(), "".into()),
            ]))
            .with_status(200)
            .with_body(
                json!({
                    "executions": [listed("t-1", &[(PRIORITY, json!(1)), (ACTIVITIES_COMPLETED, json!(5))])],
                    "nextPageToken": "page-2",
                })
                .to_string(),
            )
            .create_async()
            .await;

        let second = server
            .mock("GET", "/api/v1/namespaces/default/workflows")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("query".into(), query.into()),
                Matcher::UrlEncoded("nextPageToken".into(), "page-2".into()),
            ]))
            .with_status(200)
            .with_body(
                json!({
                    "executions": [listed("t-2", &[(FAIRNESS_KEY, json!("gold")), (ACTIVITIES_COMPLETED, json!(2))])],
                    "nextPageToken": "",
                })
                .to_string(),
            )
            .create_async()
            .await;

        let engine = engine_for(&server, Credentials::None);
        let records = engine
            .query(&ListFilter::IdPrefix("t".to_string()))
            .await
            .unwrap();

        first.assert_async().await;
        second.assert_async().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "t-1");
        assert_eq!(records[0].attribute(PRIORITY), Some("1"));
        assert_eq!(records[1].attribute(FAIRNESS_KEY), Some("\"gold\""));
        assert_eq!(records[1].attribute(ACTIVITIES_COMPLETED), Some("2"));
    }

    #[tokio::test]
    async fn test_query_cycling_page_tokens_is_decode_error() {
        let mut server = mockito::Server::new_async().await;
        let cycle = [("", "a"), ("a", "b"), ("b", "c"), ("c", "a")];
        for (token, next) in cycle {
            server
                .mock("GET", "/api/v1/namespaces/default/workflows")
                .match_query(Matcher::UrlEncoded("nextPageToken".into(), token.into()))
                .with_status(200)
                .with_body(json!({"executions": [], "nextPageToken": next}).to_string())
                .create_async()
                .await;
        }

        let engine = engine_for(&server, Credentials::None);
        let err = engine
            .query(&ListFilter::IdPrefix("t".to_string()))
            .await
            .unwrap_err();
        match err {
            EngineError::Decode { message } => assert!(message.contains("'a'")),
            other => panic!("Expected Decode, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_query_malformed_body_is_decode_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/namespaces/default/workflows")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let engine = engine_for(&server, Credentials::None);
        let err = engine
            .query(&ListFilter::IdPrefix("t".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_connection_refused_is_connection_error() {
        let engine = HttpEngine::new(HttpEngineConfig {
            address: "http://127.0.0.1:1".to_string(),
            namespace: "default".to_string(),
            request_timeout: Duration::from_secs(2),
            credentials: Credentials::None,
        })
        .unwrap();
        let err = engine.submit(fairness_request()).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Connection { .. } | EngineError::Timeout
        ));
    }

    #[test]
    fn test_invalid_pem_is_config_error() {
        let err = HttpEngine::new(HttpEngineConfig {
            address: "localhost:7243".to_string(),
            namespace: "default".to_string(),
            request_timeout: Duration::from_secs(1),
            credentials: Credentials::Mtls {
                cert_pem: b"not a cert".to_vec(),
                key_pem: b"not a key".to_vec(),
            },
        })
        .unwrap_err();
        assert!(matches!(err, RunError::Config { .. }));
    }
}
