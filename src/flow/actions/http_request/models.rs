use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationType {
    #[default]
    NoAuth,
    ApiKey(ApiKeyType),
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApiKeyType {
    Basic,
    Bearer,
    Custom,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum HttpRequestMethod {
    #[default]
    #[serde(alias = "get")]
    Get,
    #[serde(alias = "post")]
    Post,
    #[serde(alias = "put")]
    Put,
    #[serde(alias = "patch")]
    Patch,
    #[serde(alias = "delete")]
    Delete,
    #[serde(alias = "head")]
    Head,
    #[serde(alias = "options")]
    Options,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum ContentType {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "text")]
    Text,
    #[default]
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "urlencoded")]
    UrlEncoded,
    #[serde(rename = "form-data")]
    FormData,
    #[serde(rename = "binary")]
    Binary,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationConfig {
    #[serde(default)]
    pub auth_type: AuthorizationType,
    #[serde(default)]
    pub api_key: Option<String>,
    /// header to put the key in, `Authorization` when unset
    #[serde(default)]
    pub header: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpBody {
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default)]
    pub data: Option<JsonValue>,
}

/// Copies one value of the response into a session variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mapping {
    /// `data.items[0].id`, `$.data.id` or `$`
    pub path: String,
    pub variable: String,
}

impl Mapping {
    /// Path relative to the response root, `""` for the root itself.
    pub fn relative_path(&self) -> &str {
        let path = self.path.trim();
        let path = path.strip_prefix('$').unwrap_or(path);
        path.strip_prefix('.').unwrap_or(path)
    }
}
