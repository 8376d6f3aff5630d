//! STACKIT service discovery.
//!
//! Resources are listed through the STACKIT APIs of the configured project
//! and region, every resource that is ready becomes one target.

mod mongodb_flex;
mod types;

use std::time::Duration;

use framework::Done;
use framework::http::{Auth, HttpClient, HttpError};
use http::{StatusCode, Uri};
use serde::Deserialize;
use thiserror::Error;

use crate::Discoverer;
pub use mongodb_flex::MongoDbFlexDiscovery;

/// The source of all target groups produced by STACKIT discoverers.
pub const SOURCE: &str = "stackit";

pub const LABEL_ROLE: &str = "__meta_stackit_role";
pub const LABEL_PROJECT: &str = "__meta_stackit_project";

fn default_region() -> String {
    "eu01".to_string()
}

const fn default_refresh_interval() -> Duration {
    Duration::from_secs(60)
}

const fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

/// The kind of resource to discover.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub enum Role {
    #[serde(rename = "mongodb_flex")]
    MongoDbFlex,
}

impl Role {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Role::MongoDbFlex => "mongodb_flex",
        }
    }
}

/// STACKIT service discovery
///
/// ```yaml
/// role: mongodb_flex
/// project: 7a9e3b4c-0000-4000-8000-000000000000
/// region: eu01
/// auth:
///   strategy: bearer
///   token: ${STACKIT_TOKEN}
/// refresh_interval: 60s
/// timeout: 10s
/// ```
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SdConfig {
    /// The kind of resource to discover.
    pub role: Role,

    /// The STACKIT project ID.
    pub project: String,

    /// The region the resources are located in.
    #[serde(default = "default_region")]
    pub region: String,

    /// Overrides the API endpoint of the role, e.g. to go through a proxy.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Credentials attached to every API request.
    #[serde(default)]
    pub auth: Option<Auth>,

    /// The time between two refreshes.
    #[serde(
        default = "default_refresh_interval",
        with = "humanize::duration::serde"
    )]
    pub refresh_interval: Duration,

    /// Timeout of a single refresh, it should be less than `refresh_interval`.
    #[serde(default = "default_timeout", with = "humanize::duration::serde")]
    pub timeout: Duration,
}

impl SdConfig {
    pub fn new(role: Role, project: impl Into<String>) -> Self {
        Self {
            role,
            project: project.into(),
            region: default_region(),
            endpoint: None,
            auth: None,
            refresh_interval: default_refresh_interval(),
            timeout: default_timeout(),
        }
    }

    pub fn build(&self) -> Result<Box<dyn Discoverer<Error = Error>>, SetupError> {
        match self.role {
            Role::MongoDbFlex => Ok(Box::new(MongoDbFlexDiscovery::new(self)?)),
        }
    }
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("invalid {api} endpoint {endpoint:?}, {reason}")]
    InvalidEndpoint {
        api: &'static str,
        endpoint: String,
        reason: String,
    },
    #[error("project is required")]
    MissingProject,
    #[error("region is required")]
    MissingRegion,
    #[error("build http client failed, {0}")]
    Http(#[from] HttpError),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("context canceled")]
    Canceled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

impl From<Done> for TransportError {
    fn from(done: Done) -> Self {
        match done {
            Done::Canceled => TransportError::Canceled,
            Done::DeadlineExceeded => TransportError::DeadlineExceeded,
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("sending request failed, {0}")]
    Transport(#[from] TransportError),
    #[error("unexpected status code: {status}, message: {body}")]
    UnexpectedStatus { status: StatusCode, body: String },
    #[error("decoding response failed, {0}")]
    Decode(#[from] serde_json::Error),
}

/// The parts shared by all STACKIT discoverers.
struct DiscoveryBase {
    api_endpoint: String,
    http_client: HttpClient,
}

fn setup_discovery_base(
    config: &SdConfig,
    api: &'static str,
    default_endpoint: fn(&SdConfig) -> &'static str,
) -> Result<DiscoveryBase, SetupError> {
    if config.project.trim().is_empty() {
        return Err(SetupError::MissingProject);
    }
    if config.region.trim().is_empty() {
        return Err(SetupError::MissingRegion);
    }

    let endpoint = config
        .endpoint
        .as_deref()
        .unwrap_or_else(|| default_endpoint(config));
    let api_endpoint = endpoint.trim_end_matches('/').to_string();

    let invalid = |reason: String| SetupError::InvalidEndpoint {
        api,
        endpoint: endpoint.to_string(),
        reason,
    };
    let uri = api_endpoint
        .parse::<Uri>()
        .map_err(|err| invalid(err.to_string()))?;
    match uri.scheme_str() {
        Some("http") | Some("https") => {}
        Some(other) => return Err(invalid(format!("unsupported scheme {other:?}"))),
        None => return Err(invalid("scheme is required".to_string())),
    }
    if uri.authority().is_none() {
        return Err(invalid("host is required".to_string()));
    }

    let http_client = HttpClient::new(config.auth.as_ref())?;

    debug!(
        message = "discovery configured",
        api,
        endpoint = api_endpoint,
        project = config.project,
        region = config.region,
    );

    Ok(DiscoveryBase {
        api_endpoint,
        http_client,
    })
}
