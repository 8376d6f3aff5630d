mod auth;

use std::fmt;

use bytes::Bytes;
use futures::future::BoxFuture;
use http::header::{ACCEPT_ENCODING, AUTHORIZATION, COOKIE, PROXY_AUTHORIZATION, SET_COOKIE, USER_AGENT};
use http::{HeaderMap, HeaderValue, Request, Response};
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Incoming};
use hyper_rustls::{ConfigBuilderExt, HttpsConnector};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use rustls::{ClientConfig, RootCertStore};
use thiserror::Error;
use tracing::Instrument;

pub use auth::Auth;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Invalid bearer token")]
    InvalidBearerToken,
    #[error("Failed to make HTTP(S) request: {0}")]
    CallRequest(#[from] hyper_util::client::legacy::Error),
    #[error("Failed to reading response: {0}")]
    ReadIncoming(#[from] hyper::Error),
    #[error("Failed to build HTTP request: {0}")]
    BuildRequest(#[from] http::Error),
}

/// HttpClient is cheap to clone, clones share the same connection pool.
///
/// When built with [`Auth`], the credential is attached to every request
/// that doesn't carry an `Authorization` header already.
#[derive(Clone)]
pub struct HttpClient<B = Full<Bytes>> {
    client: Client<HttpsConnector<HttpConnector>, B>,
    user_agent: HeaderValue,
    authorization: Option<HeaderValue>,
}

impl<B> HttpClient<B>
where
    B: fmt::Debug + Body + Send + Unpin + 'static,
    B::Data: Send,
    B::Error: Into<crate::Error>,
{
    pub fn new(auth: Option<&Auth>) -> Result<HttpClient<B>, HttpError> {
        let mut http = HttpConnector::new();
        http.enforce_http(false);

        let config = match ClientConfig::builder().with_native_roots() {
            Ok(builder) => builder.with_no_client_auth(),
            Err(err) => {
                // plain HTTP endpoints still work
                warn!(
                    message = "Failed to load native root certificates, HTTPS requests will fail",
                    %err
                );

                ClientConfig::builder()
                    .with_root_certificates(RootCertStore::empty())
                    .with_no_client_auth()
            }
        };
        let https = HttpsConnector::from((http, config));

        let client = Client::builder(TokioExecutor::new()).build(https);

        let user_agent = HeaderValue::from_str(&format!("stackit-sd/{}", crate::get_version()))
            .expect("Invalid header value for version!");

        let authorization = match auth {
            Some(auth) => {
                let mut value = auth.header_value()?;
                value.set_sensitive(true);
                Some(value)
            }
            None => None,
        };

        Ok(HttpClient {
            client,
            user_agent,
            authorization,
        })
    }

    pub fn send(
        &self,
        mut req: Request<B>,
    ) -> BoxFuture<'static, Result<Response<Incoming>, HttpError>> {
        let span = info_span!("http", method = %req.method(), uri = %req.uri());

        default_request_headers(&mut req, &self.user_agent);
        if let Some(authorization) = &self.authorization {
            if !req.headers().contains_key(AUTHORIZATION) {
                req.headers_mut()
                    .insert(AUTHORIZATION, authorization.clone());
            }
        }

        let resp = self.client.request(req);

        let fut = async move {
            // Request doesn't start the processing until we start polling it.
            let before = std::time::Instant::now();

            let resp = resp.await.inspect_err(|err| {
                debug!(message = "HTTP request failed", %err, elapsed = ?before.elapsed());
            })?;

            debug!(
                message = "HTTP response received",
                status = %resp.status(),
                version = ?resp.version(),
                headers = ?remove_sensitive(resp.headers()),
                elapsed = ?before.elapsed(),
            );

            Ok(resp)
        }
        .instrument(span);

        Box::pin(fut)
    }
}

impl<B> fmt::Debug for HttpClient<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("user_agent", &self.user_agent)
            .field("authorization", &self.authorization.is_some())
            .finish()
    }
}

/// Reads the whole response body into memory.
pub async fn read_body(incoming: Incoming) -> Result<Bytes, HttpError> {
    let collected = incoming.collect().await?;
    Ok(collected.to_bytes())
}

fn default_request_headers<B>(request: &mut Request<B>, user_agent: &HeaderValue) {
    if !request.headers().contains_key(USER_AGENT) {
        request.headers_mut().insert(USER_AGENT, user_agent.clone());
    }

    if !request.headers().contains_key(ACCEPT_ENCODING) {
        // compressed responses are not supported
        request
            .headers_mut()
            .insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
    }
}

fn remove_sensitive(headers: &HeaderMap<HeaderValue>) -> HeaderMap<HeaderValue> {
    let mut headers = headers.clone();
    for name in &[AUTHORIZATION, PROXY_AUTHORIZATION, COOKIE, SET_COOKIE] {
        if let Some(value) = headers.get_mut(name) {
            value.set_sensitive(true);
        }
    }

    headers
}
