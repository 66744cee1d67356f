//! Blocking HTTP client for the DSS public API.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::model::{ProjectSnapshot, RecipePayload, RecipeSnapshot};
use crate::traits::RecipeSource;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest response body kept in a [`ApiError::Status`] error.
const MAX_ERROR_BODY: usize = 512;

/// Options for [`DssClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Timeout applied to every request, connect included.
    pub timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClientOptions {
    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Client for one DSS instance.
pub struct DssClient {
    base_url: String,
    authorization: String,
    agent: ureq::Agent,
}

impl std::fmt::Debug for DssClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DssClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl DssClient {
    /// Build a client without contacting the server.
    ///
    /// # Arguments
    /// * `url` - Base URL of the instance
    /// * `api_key` - API key, sent as the basic-auth user name
    /// * `options` - Client options
    pub fn new(url: &str, api_key: &str, options: &ClientOptions) -> Result<Self, ApiError> {
        let base_url: &str = url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(ApiError::InvalidConfig("url can not be blank".to_string()));
        }

        let agent: ureq::Agent = ureq::AgentBuilder::new().timeout(options.timeout).build();

        Ok(Self {
            base_url: base_url.to_string(),
            authorization: basic_auth(api_key),
            agent,
        })
    }

    /// Build a client and check that the instance answers.
    ///
    /// # Arguments
    /// * `url` - Base URL of the instance
    /// * `api_key` - API key
    /// * `options` - Client options
    pub fn connect(url: &str, api_key: &str, options: &ClientOptions) -> Result<Self, ApiError> {
        let client: DssClient = Self::new(url, api_key, options)?;
        client.test_connection()?;
        Ok(client)
    }

    /// Base URL with any trailing slash removed.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Ping the instance's configuration endpoint.
    // TODO: hit an authenticated endpoint so a bad API key fails here too.
    pub fn test_connection(&self) -> Result<(), ApiError> {
        let url: String = format!("{}/dip/api/get-configuration", self.base_url);
        info!("Pinging DSS at {}", url);

        self.agent
            .get(&url)
            .call()
            .map(|_| ())
            .map_err(|e| {
                let err: ApiError = map_ureq_error(&url, e);
                warn!("DSS is not available: {}", err);
                err
            })
    }

    /// Full URL of a public API path.
    fn api_url(&self, path: &str) -> String {
        format!("{}/public/api/{}", self.base_url, path)
    }

    fn request(&self, method: &str, url: &str) -> ureq::Request {
        debug!("Preparing request: {} {}", method, url);
        self.agent
            .request(method, url)
            .set("Authorization", &self.authorization)
            .set("Content-Type", "application/json")
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url: String = self.api_url(path);
        let response: ureq::Response = self
            .request("GET", &url)
            .call()
            .map_err(|e| map_ureq_error(&url, e))?;
        read_response_json(&url, response)
    }
}

impl RecipeSource for DssClient {
    fn list_projects(&self) -> Result<Vec<ProjectSnapshot>, ApiError> {
        debug!("Fetching projects");
        self.get_json("projects/")
    }

    fn list_recipes(&self, project_key: &str) -> Result<Vec<RecipeSnapshot>, ApiError> {
        debug!("Fetching recipes of project {}", project_key);
        self.get_json(&format!("projects/{}/recipes/", project_key))
    }

    fn fetch_payload(&self, project_key: &str, recipe_name: &str) -> Result<String, ApiError> {
        debug!("Fetching payload for recipe {}.{}", project_key, recipe_name);
        let payload: RecipePayload =
            self.get_json(&format!("projects/{}/recipes/{}/", project_key, recipe_name))?;
        Ok(payload.payload)
    }

    fn save_payload(
        &self,
        project_key: &str,
        recipe_name: &str,
        content: &str,
    ) -> Result<(), ApiError> {
        debug!("Saving recipe {}.{}", project_key, recipe_name);
        let url: String =
            self.api_url(&format!("projects/{}/recipes/{}/", project_key, recipe_name));
        let body: String = serde_json::to_string(&RecipePayload {
            payload: content.to_string(),
        })?;

        self.request("PUT", &url)
            .send_string(&body)
            .map(|_| ())
            .map_err(|e| map_ureq_error(&url, e))
    }
}

/// Build a basic-auth header with the API key as user and an empty password.
fn basic_auth(api_key: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:", api_key)))
}

/// Decode a JSON response body, insisting on a JSON content type.
fn read_response_json<T: DeserializeOwned>(
    url: &str,
    response: ureq::Response,
) -> Result<T, ApiError> {
    let content_type: String = response.content_type().to_string();
    if !is_json_content_type(&content_type) {
        return Err(ApiError::UnexpectedContentType {
            url: url.to_string(),
            content_type,
        });
    }

    let body: String = response.into_string()?;
    Ok(serde_json::from_str(&body)?)
}

fn is_json_content_type(content_type: &str) -> bool {
    content_type.contains("application/json")
}

fn map_ureq_error(url: &str, error: ureq::Error) -> ApiError {
    match error {
        ureq::Error::Status(status, response) => {
            let mut body: String = response.into_string().unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut: usize = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            ApiError::Status {
                url: url.to_string(),
                status,
                body,
            }
        }
        ureq::Error::Transport(transport) => ApiError::Transport {
            url: url.to_string(),
            message: transport.to_string(),
        },
    }
}
