use std::time::Duration;

use bytes::Bytes;
use framework::Context;
use framework::http::{HttpClient, read_body};
use framework::observe::{
    ADDRESS_LABEL, INSTANCE_LABEL, LabelSet, METRICS_PATH_LABEL, SCHEME_LABEL, TargetGroup,
};
use http::header::ACCEPT;
use http::{Request, StatusCode, Uri};
use http_body_util::Full;

use super::types::{ListResponse, MongoDbFlex};
use super::{
    Error, LABEL_PROJECT, LABEL_ROLE, Role, SOURCE, SdConfig, SetupError, TransportError,
    setup_discovery_base,
};
use crate::Discoverer;

const API_ENDPOINT: &str = "https://mongodb-flex-service.api.stackit.cloud";

/// Metrics of MongoDB Flex instances are not reachable directly, they are
/// served by this proxy instead.
const PROMETHEUS_PROXY_HOST: &str = "mongodb-prom-proxy.api.stackit.cloud";

/// Instances in any other state are skipped.
const RUNNING_STATE: &str = "READY";

const LABEL_ID: &str = "__meta_stackit_mongodb_flex_id";
const LABEL_NAME: &str = "__meta_stackit_mongodb_flex_name";
const LABEL_STATUS: &str = "__meta_stackit_mongodb_flex_status";
const LABEL_REGION: &str = "__meta_stackit_mongodb_flex_region";

/// Discovers the MongoDB Flex instances of a project.
#[derive(Debug)]
pub struct MongoDbFlexDiscovery {
    http_client: HttpClient,
    project: String,
    region: String,
    timeout: Duration,

    // `{endpoint}/v2/projects/{project}/regions/{region}/instances`
    instances: Uri,
}

impl MongoDbFlexDiscovery {
    pub fn new(config: &SdConfig) -> Result<Self, SetupError> {
        let base = setup_discovery_base(config, "STACKIT MongoDB Flex API", |_| API_ENDPOINT)?;

        let url = format!(
            "{}/v2/projects/{}/regions/{}/instances",
            base.api_endpoint, config.project, config.region
        );
        let instances = url
            .parse::<Uri>()
            .map_err(|err| SetupError::InvalidEndpoint {
                api: "STACKIT MongoDB Flex API",
                endpoint: url.clone(),
                reason: err.to_string(),
            })?;

        Ok(MongoDbFlexDiscovery {
            http_client: base.http_client,
            project: config.project.clone(),
            region: config.region.clone(),
            timeout: config.timeout,
            instances,
        })
    }

    async fn list_instances(&self, cx: &Context) -> Result<Bytes, Error> {
        let req = Request::get(self.instances.clone())
            .header(ACCEPT, "application/json")
            .body(Full::default())
            .map_err(|err| TransportError::Http(err.into()))?;

        let resp = cx
            .run(self.http_client.send(req))
            .await
            .map_err(TransportError::from)?
            .map_err(TransportError::from)?;

        let (parts, incoming) = resp.into_parts();
        if parts.status != StatusCode::OK {
            // the body is only used to tell what went wrong
            let body = match cx.run(read_body(incoming)).await {
                Ok(Ok(body)) => String::from_utf8_lossy(&body).into_owned(),
                _ => String::new(),
            };

            return Err(Error::UnexpectedStatus {
                status: parts.status,
                body,
            });
        }

        let body = cx
            .run(read_body(incoming))
            .await
            .map_err(TransportError::from)?
            .map_err(TransportError::from)?;

        Ok(body)
    }

    fn target(&self, instance: &MongoDbFlex) -> LabelSet {
        let metrics_path = format!(
            "/v2/projects/{}/regions/{}/instances/{}/metrics",
            self.project, self.region, instance.id
        );

        LabelSet::from([
            (LABEL_ROLE.to_string(), Role::MongoDbFlex.as_str().to_string()),
            (LABEL_PROJECT.to_string(), self.project.clone()),
            (LABEL_ID.to_string(), instance.id.clone()),
            (LABEL_NAME.to_string(), instance.name.clone()),
            (LABEL_STATUS.to_string(), instance.status.clone()),
            (LABEL_REGION.to_string(), self.region.clone()),
            (INSTANCE_LABEL.to_string(), instance.id.clone()),
            (SCHEME_LABEL.to_string(), "https".to_string()),
            (METRICS_PATH_LABEL.to_string(), metrics_path),
            (ADDRESS_LABEL.to_string(), PROMETHEUS_PROXY_HOST.to_string()),
        ])
    }
}

#[async_trait::async_trait]
impl Discoverer for MongoDbFlexDiscovery {
    type Error = Error;

    async fn refresh(&self, cx: &Context) -> Result<Vec<TargetGroup>, Error> {
        let cx = cx.with_timeout(self.timeout);

        let body = self.list_instances(&cx).await?;
        let resp = serde_json::from_slice::<Option<ListResponse<MongoDbFlex>>>(&body)?;

        let Some(items) = resp.and_then(|resp| resp.items) else {
            return Ok(vec![TargetGroup::new(SOURCE, vec![])]);
        };

        let total = items.len();
        let targets = items
            .iter()
            .filter(|instance| instance.status == RUNNING_STATE)
            .map(|instance| self.target(instance))
            .collect::<Vec<_>>();

        debug!(
            message = "list MongoDB Flex instances success",
            project = self.project,
            region = self.region,
            total,
            ready = targets.len(),
        );

        Ok(vec![TargetGroup::new(SOURCE, targets)])
    }
}
