//! Transport seam between the retry scheduler and the network

use async_trait::async_trait;
use reqwest::{redirect, Client};
use tracing::debug;
use url::Url;

use super::{FetchError, FetchRequest, FetchResponse, Method};

/// User agent sent with every request
const USER_AGENT: &str = concat!("jqurl/", env!("CARGO_PKG_VERSION"));

/// Performs one HTTP exchange against one URL
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends the request to `url` and returns the full response.
    ///
    /// Any status code counts as a completed exchange; only transport
    /// failures and timeouts are errors.
    async fn fetch(&self, url: &Url, request: &FetchRequest) -> Result<FetchResponse, FetchError>;
}

/// reqwest-backed transport, configured once per run
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Builds the client from the request's TLS and redirect policy
    pub fn new(request: &FetchRequest) -> Result<Self, FetchError> {
        let redirect_policy = if request.follow_redirects {
            redirect::Policy::default()
        } else {
            redirect::Policy::none()
        };

        let mut builder = Client::builder()
            .use_rustls_tls()
            .user_agent(USER_AGENT)
            .redirect(redirect_policy)
            .danger_accept_invalid_certs(request.tls.insecure);

        if let Some(certs) = &request.tls.ca_certs {
            builder = builder.tls_built_in_root_certs(false);
            for cert in certs {
                builder = builder.add_root_certificate(cert.clone());
            }
        }

        if let Some(identity) = &request.tls.identity {
            builder = builder.identity(identity.clone());
        }

        let client = builder.build().map_err(FetchError::Client)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, url: &Url, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let mut builder = self.client.request(request.method.as_reqwest(), url.clone());
        for (key, value) in request.headers.iter() {
            debug!(key, value, "request header");
            builder = builder.header(key, value);
        }
        if request.method == Method::Post {
            builder = builder.body(request.body.clone().unwrap_or_default());
        }

        let exchange = async {
            let response = builder.send().await?;
            let version = response.version();
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await?;

            Ok::<_, FetchError>(FetchResponse {
                version,
                status,
                headers,
                body: body.to_vec(),
            })
        };

        tokio::time::timeout(request.timeout, exchange)
            .await
            .map_err(|_| FetchError::Timeout(request.timeout))?
    }
}
