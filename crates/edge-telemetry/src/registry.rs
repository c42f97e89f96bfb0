//! Outbound call targets: the network transport and named service routing.
//!
//! A call can go to a literal URL over the network, or to a logical service
//! name resolved through a [`ServiceRegistry`]. Both kinds of target are plain
//! tower services over [`OutboundRequest`], boxed as [`Target`], so tests and
//! in-process bindings can stand in for the network.

use crate::error::BoxError;
use crate::fetch::OutboundRequest;
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::util::BoxCloneSyncService;
use tower::{Service, ServiceExt};

/// Response type of every outbound call.
pub type OutboundResponse = http::Response<Bytes>;

/// A type-erased outbound call target.
pub type Target = BoxCloneSyncService<OutboundRequest, OutboundResponse, BoxError>;

/// Boxes any suitable tower service into a [`Target`].
pub fn target<S>(service: S) -> Target
where
    S: Service<OutboundRequest, Response = OutboundResponse> + Clone + Send + Sync + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send + 'static,
{
    BoxCloneSyncService::new(service.map_err(Into::into))
}

/// Maps logical service names to call targets.
///
/// Built once and passed to the layer; cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    targets: Arc<HashMap<String, Target>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `service` under `name`, replacing any previous binding.
    pub fn register<S>(mut self, name: impl Into<String>, service: S) -> Self
    where
        S: Service<OutboundRequest, Response = OutboundResponse> + Clone + Send + Sync + 'static,
        S::Error: Into<BoxError>,
        S::Future: Send + 'static,
    {
        Arc::make_mut(&mut self.targets).insert(name.into(), target(service));
        self
    }

    /// Returns a fresh handle to the target bound to `name`.
    pub fn get(&self, name: &str) -> Option<Target> {
        self.targets.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.targets.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("ServiceRegistry")
            .field("services", &names)
            .finish()
    }
}

/// Plain network transport backed by a `reqwest` client.
#[derive(Clone, Debug, Default)]
pub struct NetworkTransport {
    client: reqwest::Client,
}

impl NetworkTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a preconfigured client (timeouts, proxies, TLS roots).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Service<OutboundRequest> for NetworkTransport {
    type Response = OutboundResponse;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: OutboundRequest) -> Self::Future {
        let client = self.client.clone();

        Box::pin(async move {
            let (method, url, headers, body) = request.into_parts();
            let response = client
                .request(method, url)
                .headers(headers)
                .body(body)
                .send()
                .await?;

            let status = response.status();
            let headers = response.headers().clone();
            let version = response.version();
            let body = response.bytes().await?;

            let mut out = http::Response::new(body);
            *out.status_mut() = status;
            *out.headers_mut() = headers;
            *out.version_mut() = version;
            Ok(out)
        })
    }
}
