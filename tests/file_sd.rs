use std::collections::HashMap;

use discovery::Discoverer;
use framework::Context;
use http::StatusCode;
use pretty_assertions::assert_eq;
use stackit_sd::{config, file_sd};
use testify::http::{MockServer, json};

const INSTANCES: &str = r#"{
  "items": [
    {"id": "abc", "name": "db1", "status": "READY", "version": "7.0"},
    {"id": "xyz", "name": "db2", "status": "STOPPED"},
    {"id": "def", "name": "db3", "status": "READY"}
  ]
}"#;

#[tokio::test]
async fn discover_and_write() {
    testify::trace_init();

    let server = MockServer::start(|req| async move {
        if req.uri().path() == "/v2/projects/p1/regions/eu01/instances" {
            json(StatusCode::OK, INSTANCES)
        } else {
            testify::http::not_found()
        }
    })
    .await;

    let dir = testify::temp_dir();
    let output = dir.join("stackit.json");
    let config_path = dir.join("config.yaml");
    std::fs::write(
        &config_path,
        format!(
            r#"
stackit:
  role: mongodb_flex
  project: p1
  endpoint: {}
  auth:
    strategy: basic
    user: foo
    password: bar

output: {}
"#,
            server.endpoint(),
            output.display()
        ),
    )
    .unwrap();

    let config = config::load(&config_path).unwrap();
    let discoverer = config.stackit.build().unwrap();
    let groups = discoverer.refresh(&Context::background()).await.unwrap();
    file_sd::write(config.output.as_deref(), &groups).unwrap();

    let written: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&output).unwrap()).unwrap();
    assert_eq!(
        written,
        serde_json::json!([
            {
                "targets": ["mongodb-prom-proxy.api.stackit.cloud"],
                "labels": {
                    "__meta_stackit_mongodb_flex_id": "abc",
                    "__meta_stackit_mongodb_flex_name": "db1",
                    "__meta_stackit_mongodb_flex_region": "eu01",
                    "__meta_stackit_mongodb_flex_status": "READY",
                    "__meta_stackit_project": "p1",
                    "__meta_stackit_role": "mongodb_flex",
                    "__metrics_path__": "/v2/projects/p1/regions/eu01/instances/abc/metrics",
                    "__scheme__": "https",
                    "instance": "abc"
                }
            },
            {
                "targets": ["mongodb-prom-proxy.api.stackit.cloud"],
                "labels": {
                    "__meta_stackit_mongodb_flex_id": "def",
                    "__meta_stackit_mongodb_flex_name": "db3",
                    "__meta_stackit_mongodb_flex_region": "eu01",
                    "__meta_stackit_mongodb_flex_status": "READY",
                    "__meta_stackit_project": "p1",
                    "__meta_stackit_role": "mongodb_flex",
                    "__metrics_path__": "/v2/projects/p1/regions/eu01/instances/def/metrics",
                    "__scheme__": "https",
                    "instance": "def"
                }
            }
        ])
    );

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    // "foo:bar"
    assert_eq!(requests[0].headers["authorization"], "Basic Zm9vOmJhcg==");
}

#[tokio::test]
async fn unexpected_status() {
    let server = MockServer::start(|_req| async {
        json(StatusCode::UNAUTHORIZED, r#"{"message":"unauthorized"}"#)
    })
    .await;

    let vars = HashMap::from([("ENDPOINT".to_string(), server.endpoint())]);
    let config = config::load_from_str(
        r#"
stackit:
  role: mongodb_flex
  project: p1
  endpoint: $ENDPOINT
"#,
        &vars,
    )
    .unwrap();

    let err = config
        .stackit
        .build()
        .unwrap()
        .refresh(&Context::background())
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        r#"unexpected status code: 401 Unauthorized, message: {"message":"unauthorized"}"#
    );
}
