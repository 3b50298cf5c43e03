//! Feature service REST client.
//!
//! Speaks the hosted feature layer's JSON REST dialect: `generateToken` for
//! authentication, layer metadata for field checks, `query` for unclassified
//! submissions, `applyEdits` for the flag write-back, and `addToDefinition`
//! when the flag field has to be created first.
//!
//! All endpoints return HTTP 200 with an `error` member on failure, so every
//! response body is checked before parsing. An expired token (portal code
//! 498) is refreshed once per request when credentials are available.

use crate::config::{LayerConfig, PortalConfig, TriageConfig};
use crate::store::StoreError;
use crate::types::{Classification, Submission};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Portal error code for an expired or invalid token.
const TOKEN_EXPIRED_CODE: i64 = 498;

// ============================================================================
// Client
// ============================================================================

struct Credentials {
    username: String,
    password: String,
}

/// HTTP client for one hosted feature layer.
pub struct FeatureLayerClient {
    http: reqwest::Client,
    portal: PortalConfig,
    layer: LayerConfig,
    credentials: Option<Credentials>,
    token: Mutex<Option<String>>,
}

impl FeatureLayerClient {
    /// Build the client and authenticate to the portal.
    ///
    /// Credential resolution order: a pre-issued token from the configured
    /// token variable, then username/password from the environment, then
    /// anonymous access (public layers only).
    pub async fn connect(config: &TriageConfig) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Connection(format!("failed to build HTTP client: {e}")))?;

        let presupplied = env_nonempty(&config.portal.token_env);
        let username = env_nonempty(&config.portal.username_env);
        let password = env_nonempty(&config.portal.password_env);
        let credentials = username
            .zip(password)
            .map(|(username, password)| Credentials { username, password });

        let mut layer = config.layer.clone();
        layer.url = layer.url.trim_end_matches('/').to_string();

        let client = Self {
            http,
            portal: config.portal.clone(),
            layer,
            credentials,
            token: Mutex::new(presupplied),
        };

        let has_token = client.token.lock().await.is_some();
        if has_token {
            info!(portal = %client.portal.url, "Using pre-issued portal token");
        } else if client.credentials.is_some() {
            let token = client
                .generate_token()
                .await
                .map_err(|e| e.connection())?;
            *client.token.lock().await = Some(token);
            info!(portal = %client.portal.url, "Authenticated to portal");
        } else {
            info!("No portal credentials in environment, connecting anonymously");
        }

        Ok(client)
    }

    /// Feature layer endpoint this client operates on.
    pub fn layer_url(&self) -> &str {
        &self.layer.url
    }

    /// Verify the layer carries the configured fields, creating the flag
    /// field when it is missing and `create_flag_field` allows it.
    pub async fn prepare_layer(&self) -> Result<(), StoreError> {
        let fields = self.layer_fields().await?;
        debug!(
            fields = ?fields.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
            "Layer fields"
        );

        let has_field =
            |name: &str| fields.iter().any(|f| f.name.eq_ignore_ascii_case(name));

        if !has_field(&self.layer.notes_field) {
            return Err(StoreError::Query(format!(
                "notes field '{}' not present on layer",
                self.layer.notes_field
            )));
        }
        if !has_field(&self.layer.objectid_field) {
            return Err(StoreError::Query(format!(
                "identifier field '{}' not present on layer",
                self.layer.objectid_field
            )));
        }

        if !has_field(&self.layer.flag_field) {
            if !self.layer.create_flag_field {
                return Err(StoreError::Query(format!(
                    "flag field '{}' not present and create_flag_field is disabled",
                    self.layer.flag_field
                )));
            }
            info!(
                field = %self.layer.flag_field,
                "Flag field missing, adding it to the layer definition"
            );
            self.add_flag_field().await?;
        }

        Ok(())
    }

    /// Fetch the layer's attribute field definitions.
    pub async fn layer_fields(&self) -> Result<Vec<LayerField>, StoreError> {
        let params = [("f", "json".to_string())];
        let value = self
            .call(false, &self.layer.url, &params)
            .await
            .map_err(|e| e.connection())?;
        let fields = value
            .get("fields")
            .cloned()
            .ok_or_else(|| StoreError::Query("layer metadata carried no fields".into()))?;
        serde_json::from_value(fields)
            .map_err(|e| StoreError::Query(format!("malformed layer metadata: {e}")))
    }

    /// Query every submission whose flag field is still unset.
    ///
    /// Pages through the result set with `resultOffset` until the store stops
    /// reporting `exceededTransferLimit`. `limit` caps the total fetched.
    pub async fn query_unclassified(
        &self,
        limit: Option<u64>,
    ) -> Result<Vec<Submission>, StoreError> {
        let predicate = unclassified_predicate(&self.layer.flag_field);
        let out_fields = format!("{},{}", self.layer.objectid_field, self.layer.notes_field);
        let url = format!("{}/query", self.layer.url);

        let mut submissions = Vec::new();
        let mut offset: u64 = 0;
        loop {
            let params = [
                ("where", predicate.clone()),
                ("outFields", out_fields.clone()),
                ("returnGeometry", "false".to_string()),
                ("resultOffset", offset.to_string()),
                ("resultRecordCount", self.layer.page_size.to_string()),
                ("f", "json".to_string()),
            ];
            let value = self.call(true, &url, &params).await.map_err(|e| e.query())?;
            let page: QueryPage = serde_json::from_value(value)
                .map_err(|e| StoreError::Query(format!("malformed query response: {e}")))?;

            let page_count = page.features.len() as u64;
            for feature in page.features {
                match submission_from_attributes(
                    &feature.attributes,
                    &self.layer.objectid_field,
                    &self.layer.notes_field,
                ) {
                    Some(submission) => {
                        submissions.push(submission);
                        if limit.is_some_and(|l| submissions.len() as u64 >= l) {
                            return Ok(submissions);
                        }
                    }
                    None => warn!(
                        "Skipping feature without a usable '{}' attribute",
                        self.layer.objectid_field
                    ),
                }
            }

            if !page.exceeded_transfer_limit || page_count == 0 {
                break;
            }
            offset += page_count;
        }

        Ok(submissions)
    }

    /// Write one record's classification to the flag field.
    pub async fn update_flag(
        &self,
        object_id: i64,
        classification: Classification,
    ) -> Result<(), StoreError> {
        let Some(flag) = classification.flag_value() else {
            return Err(StoreError::Update {
                object_id,
                reason: "refusing to write an unclassified flag".into(),
            });
        };

        let mut attributes = serde_json::Map::new();
        attributes.insert(self.layer.objectid_field.clone(), json!(object_id));
        attributes.insert(self.layer.flag_field.clone(), json!(flag));
        let updates = Value::Array(vec![json!({ "attributes": attributes })]);

        let params = [
            ("updates", updates.to_string()),
            ("rollbackOnFailure", "false".to_string()),
            ("f", "json".to_string()),
        ];
        let url = format!("{}/applyEdits", self.layer.url);
        let value = self
            .call(true, &url, &params)
            .await
            .map_err(|e| e.update(object_id))?;

        let response: ApplyEditsResponse =
            serde_json::from_value(value).map_err(|e| StoreError::Update {
                object_id,
                reason: format!("malformed applyEdits response: {e}"),
            })?;
        let result = response
            .update_results
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Update {
                object_id,
                reason: "applyEdits returned no update result".into(),
            })?;

        if result.success {
            Ok(())
        } else {
            Err(StoreError::Update {
                object_id,
                reason: result
                    .error
                    .map(|e| format!("{} (code {})", e.description, e.code))
                    .unwrap_or_else(|| "store reported failure without detail".into()),
            })
        }
    }

    /// Add the flag field to the layer definition via the admin endpoint.
    async fn add_flag_field(&self) -> Result<(), StoreError> {
        let definition = json!({
            "fields": [{
                "name": self.layer.flag_field,
                "type": "esriFieldTypeString",
                "alias": "Triage Flag",
                "length": 50,
                "nullable": true,
                "defaultValue": null,
            }]
        });
        let params = [
            ("addToDefinition", definition.to_string()),
            ("f", "json".to_string()),
        ];
        let url = format!("{}/addToDefinition", admin_endpoint(&self.layer.url));
        let value = self.call(true, &url, &params).await.map_err(|e| e.query())?;

        if value.get("success").and_then(Value::as_bool) == Some(true) {
            info!(field = %self.layer.flag_field, "Flag field added");
            Ok(())
        } else {
            Err(StoreError::Query(format!(
                "addToDefinition did not report success: {value}"
            )))
        }
    }

    /// Issue one portal request and parse the JSON body.
    ///
    /// Appends the session token when present. On portal code 498 the token
    /// is refreshed once and the request re-sent.
    async fn call(
        &self,
        post: bool,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<Value, RequestError> {
        let mut refreshed = false;
        loop {
            let mut form: Vec<(&str, String)> = params.to_vec();
            if let Some(token) = self.token.lock().await.clone() {
                form.push(("token", token));
            }
            let request = if post {
                self.http.post(url).form(&form)
            } else {
                self.http.get(url).query(&form)
            };
            let resp = request.send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(RequestError::Status(status));
            }
            let value: Value = resp.json().await?;

            match portal_error(&value) {
                Some((code, _))
                    if code == TOKEN_EXPIRED_CODE
                        && !refreshed
                        && self.credentials.is_some() =>
                {
                    refreshed = true;
                    warn!("Portal token expired mid-run, refreshing once");
                    let token = self.generate_token().await?;
                    *self.token.lock().await = Some(token);
                }
                Some((code, message)) => return Err(RequestError::Portal { code, message }),
                None => return Ok(value),
            }
        }
    }

    /// Exchange portal credentials for a session token.
    async fn generate_token(&self) -> Result<String, RequestError> {
        let creds = self.credentials.as_ref().ok_or_else(|| {
            RequestError::Auth(
                "portal token expired and no credentials are available to refresh it".into(),
            )
        })?;

        let url = format!(
            "{}/sharing/rest/generateToken",
            self.portal.url.trim_end_matches('/')
        );
        let form = [
            ("username", creds.username.clone()),
            ("password", creds.password.clone()),
            ("referer", self.portal.url.clone()),
            ("expiration", self.portal.token_ttl_minutes.to_string()),
            ("f", "json".to_string()),
        ];
        let resp = self.http.post(&url).form(&form).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RequestError::Status(status));
        }
        let value: Value = resp.json().await?;
        if let Some((code, message)) = portal_error(&value) {
            return Err(RequestError::Portal { code, message });
        }
        value
            .get("token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                RequestError::Malformed("generateToken response carried no token".into())
            })
    }
}

// ============================================================================
// Wire types
// ============================================================================

/// One attribute field definition from the layer metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct LayerField {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: String,
    #[serde(default)]
    pub alias: String,
}

#[derive(Debug, Deserialize)]
struct QueryPage {
    #[serde(default)]
    features: Vec<FeatureRecord>,
    #[serde(rename = "exceededTransferLimit", default)]
    exceeded_transfer_limit: bool,
}

#[derive(Debug, Deserialize)]
struct FeatureRecord {
    #[serde(default)]
    attributes: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ApplyEditsResponse {
    #[serde(rename = "updateResults", default)]
    update_results: Vec<EditResult>,
}

#[derive(Debug, Deserialize)]
struct EditResult {
    #[serde(default)]
    success: bool,
    error: Option<EditError>,
}

#[derive(Debug, Deserialize)]
struct EditError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    description: String,
}

// ============================================================================
// Request plumbing
// ============================================================================

/// Transport-level failure, mapped onto [`StoreError`] at each call site
/// so connection, query, and update failures keep their propagation policy.
#[derive(Debug, thiserror::Error)]
enum RequestError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("portal error {code}: {message}")]
    Portal { code: i64, message: String },
    #[error("{0}")]
    Auth(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl RequestError {
    fn connection(self) -> StoreError {
        StoreError::Connection(self.to_string())
    }

    fn query(self) -> StoreError {
        StoreError::Query(self.to_string())
    }

    fn update(self, object_id: i64) -> StoreError {
        StoreError::Update {
            object_id,
            reason: self.to_string(),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Predicate matching records whose flag field is still unset.
pub(crate) fn unclassified_predicate(flag_field: &str) -> String {
    format!("{flag_field} IS NULL OR {flag_field} = ''")
}

/// Derive the layer's admin endpoint, which hosts `addToDefinition`.
pub(crate) fn admin_endpoint(layer_url: &str) -> String {
    layer_url
        .trim_end_matches('/')
        .replacen("/rest/services/", "/rest/admin/services/", 1)
}

/// Read an environment variable, treating empty values as unset.
fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn submission_from_attributes(
    attributes: &serde_json::Map<String, Value>,
    objectid_field: &str,
    notes_field: &str,
) -> Option<Submission> {
    let object_id = attributes.get(objectid_field)?.as_i64()?;
    let note = attributes
        .get(notes_field)
        .and_then(Value::as_str)
        .map(str::to_string);
    Some(Submission { object_id, note })
}

/// Extract the `error` member feature services embed in 200 responses.
fn portal_error(value: &Value) -> Option<(i64, String)> {
    let error = value.get("error")?;
    let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown portal error")
        .to_string();
    Some((code, message))
}

// ============================================================================
// Tests
// ============================================================================
