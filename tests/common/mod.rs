#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use futures::future::BoxFuture;
use ocsp_stapling::{BoxError, Clock, OcspCodec, OcspResponse, ResponseBody, Transport};
use std::sync::Mutex;
use time::OffsetDateTime;
use tokio::time::Instant;
use x509_parser::certificate::X509Certificate;

pub fn leaf_der() -> &'static [u8] {
    include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/testdata/leaf.der"))
}

pub fn ca_der() -> &'static [u8] {
    include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/testdata/ca.der"))
}

pub fn plain_der() -> &'static [u8] {
    include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/testdata/plain.der"))
}

pub fn chain() -> Vec<Vec<u8>> {
    vec![leaf_der().to_vec(), ca_der().to_vec()]
}

/// Wall clock driven by tokio's paused test clock.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    base: OffsetDateTime,
    start: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            base: OffsetDateTime::UNIX_EPOCH + time::Duration::days(20_000),
            start: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> OffsetDateTime {
        self.base + (Instant::now() - self.start)
    }
}

/// Codec answering with responses valid for a fixed period.
///
/// `b"malformed"` is rejected as unparsable.
#[derive(Debug)]
pub struct FakeCodec {
    clock: TokioClock,
    validity: time::Duration,
}

impl FakeCodec {
    pub fn new(clock: TokioClock, validity: time::Duration) -> Self {
        Self { clock, validity }
    }
}

impl OcspCodec for FakeCodec {
    fn build_request(
        &self,
        leaf: &X509Certificate<'_>,
        issuer: &X509Certificate<'_>,
    ) -> Result<Vec<u8>, BoxError> {
        Ok(format!("{} / {}", leaf.subject(), issuer.subject()).into_bytes())
    }

    fn parse_response(
        &self,
        response: &[u8],
        _issuer: &X509Certificate<'_>,
    ) -> Result<OcspResponse, BoxError> {
        if response == b"malformed" {
            return Err("malformed OCSP response".into());
        }
        Ok(OcspResponse::new(self.clock.now() + self.validity))
    }
}

#[derive(Clone, Debug)]
pub enum Reply {
    Respond(&'static [u8]),
    Refuse,
}

/// Transport whose reply to the n-th request (0-based) is scripted.
pub struct ScriptedTransport {
    script: Box<dyn Fn(usize) -> Reply + Send + Sync>,
    posts: Mutex<Vec<(Instant, String)>>,
}

impl ScriptedTransport {
    pub fn new(script: impl Fn(usize) -> Reply + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            posts: Mutex::new(Vec::new()),
        }
    }

    pub fn post_count(&self) -> usize {
        self.posts.lock().unwrap().len()
    }

    pub fn post_times(&self) -> Vec<Instant> {
        self.posts.lock().unwrap().iter().map(|(at, _)| *at).collect()
    }

    pub fn urls(&self) -> Vec<String> {
        self.posts
            .lock()
            .unwrap()
            .iter()
            .map(|(_, url)| url.clone())
            .collect()
    }
}

struct Body(Option<Vec<u8>>);

impl ResponseBody for Body {
    fn read_to_end(&mut self) -> BoxFuture<'_, Result<Vec<u8>, BoxError>> {
        let result: Result<Vec<u8>, BoxError> =
            self.0.take().ok_or_else(|| "body already read".into());
        Box::pin(async move { result })
    }

    fn close(self: Box<Self>) -> Result<(), BoxError> {
        Ok(())
    }
}

impl Transport for ScriptedTransport {
    fn post<'a>(
        &'a self,
        url: &'a str,
        _content_type: &'static str,
        _body: Vec<u8>,
    ) -> BoxFuture<'a, Result<Box<dyn ResponseBody>, BoxError>> {
        let index = {
            let mut posts = self.posts.lock().unwrap();
            posts.push((Instant::now(), url.to_string()));
            posts.len() - 1
        };
        let result: Result<Box<dyn ResponseBody>, BoxError> = match (self.script)(index) {
            Reply::Respond(bytes) => Ok(Box::new(Body(Some(bytes.to_vec())))),
            Reply::Refuse => Err("connection refused".into()),
        };
        Box::pin(async move { result })
    }
}
