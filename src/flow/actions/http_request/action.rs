use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    ChatflowError, Result,
    flow::{
        actions::{Action, ActionOutput, Transition, decode},
        edge::{FixedHandle, SourceHandle},
        node::{NodeId, NodeKind},
        template,
    },
    runtime::Context,
};

use super::models::*;

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequestAction {
    url: String,
    #[serde(default)]
    auth: AuthorizationConfig,
    #[serde(default)]
    method: HttpRequestMethod,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    params: HashMap<String, String>,
    #[serde(default)]
    body: Option<HttpBody>,
    /// milliseconds, the engine default when unset
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(default)]
    mappings: Vec<Mapping>,
    /// stores the whole parsed response body
    #[serde(default)]
    response_variable: Option<String>,
}

impl HttpRequestAction {
    /// Apply authorization headers based on auth config
    fn apply_auth_headers(
        &self,
        ctx: &Context,
        headers: &mut HeaderMap,
    ) -> Result<()> {
        match &self.auth.auth_type {
            AuthorizationType::NoAuth => {}
            AuthorizationType::ApiKey(api_key_type) => {
                let api_key = self.auth.api_key.as_ref().ok_or_else(|| ChatflowError::Action("apiKey is required for api-key authorization".to_string()))?;
                let api_key = ctx.interpolate(api_key);

                // Default header name is "Authorization"
                let header_name = self.auth.header.as_deref().unwrap_or("Authorization");
                let header_key: HeaderName = header_name.parse().map_err(|err: reqwest::header::InvalidHeaderName| ChatflowError::Action(err.to_string()))?;

                let header_value = match api_key_type {
                    ApiKeyType::Bearer => format!("Bearer {}", api_key),
                    ApiKeyType::Basic => {
                        let encoded = if api_key.contains(':') {
                            STANDARD.encode(api_key.as_bytes())
                        } else {
                            api_key
                        };
                        format!("Basic {}", encoded)
                    }
                    ApiKeyType::Custom => api_key,
                };

                headers.insert(
                    header_key,
                    header_value.parse().map_err(|err: InvalidHeaderValue| ChatflowError::Action(err.to_string()))?,
                );
            }
        }
        Ok(())
    }

    fn build_request(
        &self,
        ctx: &Context,
    ) -> Result<(String, reqwest::RequestBuilder)> {
        let resolved_url = ctx.interpolate(&self.url);

        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("accept"), HeaderValue::from_static("*/*"));

        self.apply_auth_headers(ctx, &mut headers)?;

        for (key, value) in &self.headers {
            let resolved_value = ctx.interpolate(value);
            headers.insert(
                key.parse::<HeaderName>().map_err(|err| ChatflowError::Action(err.to_string()))?,
                resolved_value.parse().map_err(|err: InvalidHeaderValue| ChatflowError::Action(err.to_string()))?,
            );
        }

        let query: Vec<(String, String)> = self.params.iter().map(|(k, v)| (k.clone(), ctx.interpolate(v))).collect();

        let method: reqwest::Method = self.method.as_ref().parse().map_err(|_| ChatflowError::Action(format!("invalid method '{:?}'", self.method)))?;
        let mut request = ctx.http().request(method, &resolved_url).headers(headers).query(&query);

        if let Some(body) = &self.body {
            match body.content_type {
                ContentType::Text => {
                    if let Some(text) = &body.data {
                        let data = text.as_str().ok_or(ChatflowError::Action("content-type did not match the body content".to_string()))?;
                        request = request.header("content-type", "text/plain").body(ctx.interpolate(data));
                    }
                }
                ContentType::Json => {
                    if let Some(json) = &body.data {
                        request = request.json(&ctx.interpolate_json(json));
                    }
                }
                ContentType::FormData | ContentType::UrlEncoded => {
                    if let Some(form) = &body.data {
                        let resolved_form = ctx.interpolate_json(form);
                        let data = resolved_form.as_object().ok_or(ChatflowError::Action("content-type did not match the body content".to_string()))?;
                        request = request.form(data);
                    }
                }
                ContentType::Binary => {
                    if let Some(value) = &body.data {
                        let data = value.as_str().ok_or(ChatflowError::Action("content-type did not match the body content".to_string()))?;
                        let data = STANDARD.decode(data).map_err(|err| ChatflowError::Action(err.to_string()))?;
                        request = request.body(data);
                    }
                }
                ContentType::None => {}
            }
        }

        let timeout = self.timeout.unwrap_or(ctx.settings().http_timeout_ms);
        request = request.timeout(Duration::from_millis(timeout));

        Ok((resolved_url, request))
    }

    /// Send the request. `Err` carries a text for timeouts, network failures
    /// and non-2xx statuses alike.
    async fn call(
        &self,
        ctx: &Context,
    ) -> std::result::Result<Value, String> {
        let (url, request) = self.build_request(ctx).map_err(|e| e.to_string())?;
        let res = request.send().await.map_err(|err| {
            if err.is_timeout() {
                format!("request to {} timed out", url)
            } else {
                format!("request to {} failed: {}", url, err)
            }
        })?;

        let status = res.status();
        let text = res.text().await.map_err(|err| format!("reading response of {} failed: {}", url, err))?;
        if !status.is_success() {
            return Err(format!("request to {} returned {}", url, status.as_u16()));
        }

        // non-JSON bodies are kept as text
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }

    fn apply_mappings(
        &self,
        ctx: &Context,
        nid: &NodeId,
        body: &Value,
    ) {
        for mapping in &self.mappings {
            let path = mapping.relative_path();
            let value = if path.is_empty() {
                Some(body)
            } else {
                template::lookup(body, path)
            };
            match value {
                Some(v) => ctx.set_var(mapping.variable.trim(), v.clone()),
                None => ctx.emit_log(nid, format!("mapping '{}' found nothing", mapping.path)),
            }
        }
        if let Some(var) = self.response_variable.as_deref().filter(|v| !v.trim().is_empty()) {
            ctx.set_var(var.trim(), body.clone());
        }
    }
}

#[async_trait]
impl Action for HttpRequestAction {
    fn create(params: serde_json::Value) -> Result<Self> {
        decode(&Self::schema(), params)
    }

    fn schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["url"],
            "properties": {
                "url": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Request URL, supports {variable} placeholders"
                },
                "method": {
                    "type": "string",
                    "enum": ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS", "get", "post", "put", "patch", "delete", "head", "options"]
                },
                "auth": {
                    "type": "object",
                    "properties": {
                        "authType": {
                            "oneOf": [
                                { "const": "no_auth" },
                                {
                                    "type": "object",
                                    "properties": {
                                        "api_key": {
                                            "type": "string",
                                            "enum": ["basic", "bearer", "custom"]
                                        }
                                    }
                                }
                            ]
                        },
                        "apiKey": { "type": ["string", "null"] },
                        "header": { "type": ["string", "null"] }
                    }
                },
                "headers": {
                    "type": "object",
                    "additionalProperties": { "type": "string" }
                },
                "params": {
                    "type": "object",
                    "additionalProperties": { "type": "string" }
                },
                "body": {
                    "type": ["object", "null"],
                    "properties": {
                        "contentType": {
                            "type": "string",
                            "enum": ["none", "text", "json", "urlencoded", "form-data", "binary"]
                        },
                        "data": {}
                    }
                },
                "timeout": {
                    "type": ["integer", "null"],
                    "minimum": 0,
                    "description": "Request timeout in milliseconds"
                },
                "mappings": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["path", "variable"],
                        "properties": {
                            "path": { "type": "string" },
                            "variable": { "type": "string", "minLength": 1 }
                        }
                    }
                },
                "responseVariable": { "type": ["string", "null"] }
            }
        })
    }

    fn action_type(&self) -> NodeKind {
        NodeKind::HttpRequest
    }

    async fn run(
        &self,
        ctx: Arc<Context>,
        nid: NodeId,
    ) -> Result<ActionOutput> {
        match self.call(&ctx).await {
            Ok(body) => {
                ctx.emit_log(&nid, "request succeeded".to_string());
                self.apply_mappings(&ctx, &nid, &body);
                Ok(ActionOutput::new(Transition::Next(SourceHandle::Fixed(FixedHandle::Success))))
            }
            Err(reason) => {
                ctx.emit_log(&nid, reason.clone());
                let error = SourceHandle::Fixed(FixedHandle::Error);
                if ctx.flow().has_route(&nid, &error) {
                    Ok(ActionOutput::branch(error))
                } else {
                    Err(ChatflowError::External(reason))
                }
            }
        }
    }
}
