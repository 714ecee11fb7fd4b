use std::time::Duration;

use restbench_core::{WorkFactory, WorkUnit};
use tokio::runtime::Handle;

use super::{HttpClient, HttpRequest, HttpResponse, Result};

/// Turns one request template into a work unit per attempt.
///
/// Units run on the pool's OS threads and drive the request to completion on
/// `handle`. Shared units reuse one connection pool; with `reconnect` each unit
/// gets a client of its own, so every attempt pays for a fresh connection.
#[derive(Debug, Clone)]
pub struct HttpWorkFactory {
    handle: Handle,
    client: HttpClient,
    connect_timeout: Option<Duration>,
    template: HttpRequest,
}

impl HttpWorkFactory {
    /// Validates `template` up front so configuration errors never reach a worker.
    pub fn new(
        handle: Handle,
        template: HttpRequest,
        connect_timeout: Option<Duration>,
    ) -> Result<Self> {
        template.validate()?;
        Ok(Self {
            handle,
            client: HttpClient::new(connect_timeout),
            connect_timeout,
            template,
        })
    }
}

impl WorkFactory for HttpWorkFactory {
    type Output = HttpResponse;

    fn make(&self, reconnect: bool) -> WorkUnit<HttpResponse> {
        let client = if reconnect {
            HttpClient::new(self.connect_timeout)
        } else {
            self.client.clone()
        };
        let handle = self.handle.clone();
        let req = self.template.clone();

        Box::new(move || {
            handle
                .block_on(client.request(req))
                .map_err(Into::into)
        })
    }
}
