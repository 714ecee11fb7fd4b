use bytes::Bytes;
use http_body_util::{BodyExt as _, Full};
use hyper::Request;
use hyper::body::Incoming;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::collections::BTreeMap;
use std::time::Duration;

use super::util::has_header;
use super::{Error, HttpRequest, HttpResponse, Result};

/// Default TCP connect timeout.
///
/// The OS-level connect timeout can be tens of seconds, which makes short runs look
/// hung when the target is unreachable.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Pooled HTTP/1 client. Clones share the same connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(Some(DEFAULT_CONNECT_TIMEOUT))
    }
}

impl HttpClient {
    #[must_use]
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false);
        http_connector.set_connect_timeout(connect_timeout);
        http_connector.set_nodelay(true);

        let https_connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let inner = Client::builder(TokioExecutor::new()).build(https_connector);

        Self { inner }
    }

    /// Sends `req` and reads the whole response. The request timeout, if any,
    /// covers the body as well as the response head.
    pub async fn request(&self, req: HttpRequest) -> Result<HttpResponse> {
        let timeout = req.timeout;
        let req = build_request(req)?;

        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.exchange(req))
                .await
                .map_err(|_| Error::Timeout(timeout))?,
            None => self.exchange(req).await,
        }
    }

    async fn exchange(&self, req: Request<Full<Bytes>>) -> Result<HttpResponse> {
        let res: hyper::Response<Incoming> = self.inner.request(req).await?;
        let (parts, body) = res.into_parts();
        let status = parts.status.as_u16();

        // Lowercase keys; repeated headers are joined with ", ".
        let mut merged: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in parts.headers.iter() {
            let key = name.as_str().to_ascii_lowercase();
            let v = String::from_utf8_lossy(value.as_bytes()).to_string();
            merged
                .entry(key)
                .and_modify(|cur| {
                    if !cur.is_empty() {
                        cur.push_str(", ");
                    }
                    cur.push_str(&v);
                })
                .or_insert(v);
        }
        let headers: Vec<(String, String)> = merged.into_iter().collect();

        let body = body.collect().await?.to_bytes();

        Ok(HttpResponse {
            status,
            body,
            headers,
        })
    }

    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.request(HttpRequest::get(url)).await
    }
}

fn build_request(req: HttpRequest) -> Result<Request<Full<Bytes>>> {
    req.validate()?;

    let uri: hyper::Uri = req
        .url
        .parse()
        .map_err(|_| Error::InvalidUrl(req.url.clone()))?;

    let mut builder = Request::builder().method(req.method).uri(uri);

    if !req.body.is_empty() && !has_header(&req.headers, "content-length") {
        builder = builder.header(http::header::CONTENT_LENGTH, req.body.len());
    }

    for (k, v) in req.headers {
        let name = http::header::HeaderName::from_bytes(k.as_bytes())?;
        let value = http::header::HeaderValue::from_str(&v)?;
        builder = builder.header(name, value);
    }

    Ok(builder.body(Full::new(req.body))?)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use restbench_testserver::TestServer;
    use std::time::Instant;
    use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn unreachable_host_fails_fast_with_connect_timeout() {
        let client = HttpClient::new(Some(Duration::from_millis(200)));
        let req = HttpRequest::get("http://192.0.2.1:81/");

        let started = Instant::now();
        let _err = client.request(req).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(
            elapsed < Duration::from_secs(2),
            "expected fast failure, elapsed={elapsed:?}"
        );
    }

    #[tokio::test]
    async fn request_timeout_surfaces_as_timeout_error() {
        let server = TestServer::start().await.unwrap();
        let client = HttpClient::default();
        let req = HttpRequest::get(format!("{}?ms=500", server.urls().slow))
            .with_timeout(Some(Duration::from_millis(50)));

        let err = client.request(req).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)), "got {err}");

        server.shutdown().await;
    }

    #[tokio::test]
    async fn request_timeout_covers_a_stalled_body() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            // Head and the first bytes of a 10 byte body, then nothing.
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 10\r\n\r\nab")
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let client = HttpClient::default();
        let req = HttpRequest::get(format!("http://{addr}/"))
            .with_timeout(Some(Duration::from_millis(100)));

        let started = Instant::now();
        let err = client.request(req).await.unwrap_err();
        let elapsed = started.elapsed();
        server.abort();

        assert!(matches!(err, Error::Timeout(_)), "got {err}");
        assert!(elapsed < Duration::from_secs(2), "elapsed={elapsed:?}");
    }

    #[tokio::test]
    async fn echo_round_trips_body_and_headers() {
        let server = TestServer::start().await.unwrap();
        let client = HttpClient::default();
        let req = HttpRequest::post(server.urls().echo.clone(), Bytes::from_static(b"ping"))
            .with_header("x-test", "1")
            .with_bearer("secret");

        let res = client.request(req).await.unwrap();
        assert_eq!(res.status, 200);
        assert_eq!(res.body_utf8(), Some("ping"));

        let stats = server.stats().clone();
        server.shutdown().await;
        assert_eq!(stats.saw_test_header(), 1);
        assert_eq!(stats.saw_bearer(), 1);
        assert_eq!(stats.saw_echo_body(), 1);
    }

    #[tokio::test]
    async fn status_endpoint_reports_requested_code() {
        let server = TestServer::start().await.unwrap();
        let client = HttpClient::default();

        let res = client.get(&server.urls().status(404)).await.unwrap();
        assert_eq!(res.status, 404);

        server.shutdown().await;
    }
}
