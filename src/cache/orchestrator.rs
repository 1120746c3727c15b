//! Caching request state machine
//!
//! Every cacheable operation goes through [`run`]:
//!
//! 1. Unless `DO_NOT_RETURN_CACHED_RESULT` is set, a cached value is delivered on the
//!    calling thread before `run` returns. Without `REQUEST_EVEN_IF_CACHED` that ends
//!    the request.
//! 2. `REMOVE_EXISTING_CACHE` purges memory and disk before fetching.
//! 3. The request is sent from a spawned task.
//! 4. A successful, decodable response is cached unless the options forbid it, then
//!    delivered, unless it equals the value already delivered in step 1.

use std::sync::Arc;

use bytes::Bytes;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::memory::CacheContext;
use super::options::CacheOptions;
use super::resource::CachedResource;
use crate::webdav::{DavRequest, Transport, TransportResponse, WebDavError};

/// A request running in the background
#[derive(Debug)]
pub struct RequestHandle {
    task: JoinHandle<()>,
}

impl RequestHandle {
    pub(crate) fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }

    /// Abort the request. If the response has not arrived yet, nothing is cached and
    /// the completion is never called.
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the request to settle. Returns `false` when it was cancelled.
    pub async fn wait(self) -> bool {
        match self.task.await {
            Ok(()) => true,
            Err(e) if e.is_cancelled() => false,
            Err(e) => {
                warn!(error = %e, "Request task failed");
                false
            }
        }
    }
}

/// Everything a cacheable request needs besides its slot
pub(crate) struct Orchestrator<'a> {
    pub cache: &'a Arc<CacheContext>,
    pub transport: &'a Arc<dyn Transport>,
    pub runtime: &'a Handle,
}

impl Orchestrator<'_> {
    /// Drive `resource` through the cache state machine.
    ///
    /// `request` is `Err` when the request could not be built; that is reported after
    /// the cache lookup and no network call is made.
    pub fn run<R, F>(
        &self,
        resource: R,
        request: Result<DavRequest, WebDavError>,
        options: CacheOptions,
        mut completion: F,
    ) -> Option<RequestHandle>
    where
        R: CachedResource,
        F: FnMut(Option<R::Output>, Option<WebDavError>) + Send + 'static,
    {
        let cache = self.cache;
        let mut prior: Option<R::Output> = None;

        if !options.contains(CacheOptions::DO_NOT_RETURN_CACHED_RESULT) {
            match resource.lookup(cache) {
                Some(value) => {
                    let output = resource.present(&value);
                    debug!(path = %resource.key().path, "Serving cached value");
                    completion(Some(output.clone()), None);
                    prior = Some(output);

                    if !options.contains(CacheOptions::REQUEST_EVEN_IF_CACHED) {
                        if options.contains(CacheOptions::REMOVE_EXISTING_CACHE) {
                            resource.purge(cache);
                        }
                        return None;
                    }
                }
                None => {
                    if let Some(placeholder) = resource.placeholder(cache) {
                        trace!(path = %resource.key().path, "Serving placeholder");
                        completion(Some(placeholder), Some(WebDavError::Placeholder));
                    }
                }
            }
        }

        if options.contains(CacheOptions::REMOVE_EXISTING_CACHE) {
            debug!(path = %resource.key().path, "Purging cached value before fetch");
            resource.purge(cache);
        }

        let request = match request {
            Ok(request) => request,
            Err(e) => {
                completion(None, Some(e));
                return None;
            }
        };

        let cache = Arc::clone(cache);
        let transport = Arc::clone(self.transport);
        let task = self.runtime.spawn(async move {
            let response = transport.perform(request).await;
            let (output, error) = settle(&cache, &resource, options, response);

            if prior.is_some() && output.is_some() && prior == output {
                trace!(path = %resource.key().path, "Fetched value unchanged, not redelivering");
                return;
            }
            completion(output, error);
        });

        Some(RequestHandle::new(task))
    }
}

/// Turn a response into the value-or-error pair delivered to the caller
fn settle<R: CachedResource>(
    cache: &CacheContext,
    resource: &R,
    options: CacheOptions,
    response: TransportResponse,
) -> (Option<R::Output>, Option<WebDavError>) {
    let TransportResponse { body, status, error } = response;

    if let Some(error) = WebDavError::from_response(status, error.as_deref()) {
        debug!(path = %resource.key().path, error = %error, "Request failed");
        return (None, Some(error));
    }

    let body = match (body, error) {
        (Some(body), _) => body,
        (None, Some(error)) => return (None, Some(WebDavError::Transport(error))),
        (None, None) => Bytes::new(),
    };

    let Some(value) = resource.decode(&body) else {
        debug!(path = %resource.key().path, size = body.len(), "Response could not be decoded");
        return (None, None);
    };

    let mut cache_error = None;
    if options.stores_result() {
        if let Err(e) = resource.store(cache, &value, &body) {
            warn!(path = %resource.key().path, error = %e, "Failed to cache fetched value");
            cache_error = Some(e);
        }
    }
    resource.reconcile(cache, &value);

    (Some(resource.present(&value)), cache_error)
}
