use crate::data::str_field;
use async_trait::async_trait;
use chartcore::schema::DataMap;
use chartcore::{
    DataSchema, FieldIssue, FieldKind, HandleCategory, HandleSpec, Handles, Node, NodeContext,
    NodeError, NodeOutputs, NodeResult, Value,
};
use chartruntime::{NodeDefinition, NodeMetadata};
use serde_json::{json, Value as Json};
use std::collections::BTreeMap;

const METHODS: [&str; 5] = ["GET", "POST", "PUT", "PATCH", "DELETE"];

/// HTTP request node
pub struct HttpRequestNode {
    client: reqwest::Client,
    method: reqwest::Method,
    url: String,
    headers: Vec<(String, String)>,
}

impl HttpRequestNode {
    pub fn new(method: reqwest::Method, url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            method,
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[async_trait]
impl Node for HttpRequestNode {
    fn node_type(&self) -> &str {
        "httpRequest"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeError> {
        let url = match ctx.inputs.get("url") {
            Some(Value::String(url)) => url.as_str(),
            _ => self.url.as_str(),
        };
        if url.is_empty() {
            return Err(NodeError::Configuration("no URL configured".to_string()));
        }

        ctx.events.info(format!("{} {}", self.method, url));

        let mut request = self.client.request(self.method.clone(), url);
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }
        match ctx.inputs.get("body") {
            Some(Value::String(text)) => request = request.body(text.clone()),
            Some(Value::Null) | None => {}
            Some(body) => request = request.json(body),
        }

        let response = tokio::select! {
            _ = ctx.cancellation.cancelled() => return Err(NodeError::Cancelled),
            response = request.send() => response
                .map_err(|e| NodeError::ExecutionFailed(format!("HTTP request failed: {}", e)))?,
        };

        let status = response.status().as_u16();
        let headers: BTreeMap<String, Value> = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.to_string(),
                    Value::String(v.to_str().unwrap_or("").to_string()),
                )
            })
            .collect();

        let body_text = response
            .text()
            .await
            .map_err(|e| NodeError::ExecutionFailed(format!("Failed to read response: {}", e)))?;
        let body = serde_json::from_str::<Json>(&body_text)
            .map(Value::from)
            .unwrap_or(Value::String(body_text));

        ctx.events.info(format!("Response status: {}", status));

        Ok(NodeOutputs::new()
            .with_output("status", status as f64)
            .with_output("body", body)
            .with_output("headers", Value::Object(headers))
            .into())
    }
}

/// Version 1 accepted any casing for `method`.
fn migrate_v1(mut data: DataMap) -> Result<DataMap, String> {
    if let Some(Json::String(method)) = data.get("method") {
        let method = method.trim().to_uppercase();
        data.insert("method".to_string(), Json::String(method));
    }
    Ok(data)
}

fn validate(data: &DataMap) -> Result<(), FieldIssue> {
    let method = data.get("method").and_then(Json::as_str).unwrap_or("");
    if !METHODS.contains(&method) {
        return Err(FieldIssue::new(
            "method",
            format!("unsupported method '{}'", method),
        ));
    }
    if let Some(Json::Object(headers)) = data.get("headers") {
        if let Some((name, _)) = headers.iter().find(|(_, v)| !v.is_string()) {
            return Err(FieldIssue::new(
                "headers",
                format!("header '{}' must be a string", name),
            ));
        }
    }
    Ok(())
}

pub struct HttpRequestDefinition;

impl NodeDefinition for HttpRequestDefinition {
    fn node_type(&self) -> &str {
        "httpRequest"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("HTTP Request", "http", "Make HTTP requests")
    }

    fn schema(&self) -> DataSchema {
        DataSchema::new(2)
            .field("method", FieldKind::String, json!("GET"))
            .field("url", FieldKind::String, json!(""))
            .field("headers", FieldKind::Object, json!({}))
            .migration(1, migrate_v1)
            .validator(validate)
    }

    fn handles(&self, _data: &Json) -> Handles {
        Handles::new()
            .input(HandleSpec::optional("url", HandleCategory::Text))
            .input(HandleSpec::optional("body", HandleCategory::Any))
            .output(HandleSpec::output("status", HandleCategory::Number))
            .output(HandleSpec::output("body", HandleCategory::Any))
            .output(HandleSpec::output("headers", HandleCategory::Object))
    }

    fn create(&self, data: &Json) -> Result<Box<dyn Node>, NodeError> {
        let method = str_field(data, "method")?;
        let method =
            reqwest::Method::from_bytes(method.as_bytes()).map_err(|e| NodeError::InvalidData {
                field: "method".to_string(),
                message: e.to_string(),
            })?;

        let mut node = HttpRequestNode::new(method, str_field(data, "url")?);
        if let Some(Json::Object(headers)) = data.get("headers") {
            for (name, value) in headers {
                if let Some(value) = value.as_str() {
                    node = node.with_header(name, value);
                }
            }
        }
        Ok(Box::new(node))
    }
}
