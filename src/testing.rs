//! In-memory collaborators shared by unit tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::error::{BoxError, FetchErrorKind};
use crate::metrics::MetricsRecorder;
use crate::ocsp::{OcspCodec, OcspResponse};
use crate::transport::{ResponseBody, Transport};
use crate::Clock;
use futures::future::BoxFuture;
use std::sync::Mutex;
use time::OffsetDateTime;
use tokio::time::Instant;
use x509_parser::certificate::X509Certificate;

pub(crate) const LEAF: &[u8] = include_bytes!("../tests/testdata/leaf.der");
pub(crate) const CA: &[u8] = include_bytes!("../tests/testdata/ca.der");
pub(crate) const PLAIN: &[u8] = include_bytes!("../tests/testdata/plain.der");

pub(crate) fn chain() -> Vec<Vec<u8>> {
    vec![LEAF.to_vec(), CA.to_vec()]
}

/// Wall clock that advances with tokio's (possibly paused) clock.
#[derive(Debug)]
pub(crate) struct TokioClock {
    base: OffsetDateTime,
    start: Instant,
}

impl TokioClock {
    pub(crate) fn new() -> Self {
        Self {
            base: OffsetDateTime::UNIX_EPOCH + time::Duration::days(20_000),
            start: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> OffsetDateTime {
        let elapsed = Instant::now() - self.start;
        self.base + elapsed
    }
}

/// Codec whose responses are valid for `validity` past the codec clock.
///
/// A response body of `b"malformed"` fails to parse.
#[derive(Debug)]
pub(crate) struct FakeCodec {
    pub(crate) clock: TokioClock,
    pub(crate) validity: time::Duration,
}

impl FakeCodec {
    pub(crate) fn valid_for(validity: time::Duration) -> Self {
        Self {
            clock: TokioClock::new(),
            validity,
        }
    }
}

impl OcspCodec for FakeCodec {
    fn build_request(
        &self,
        _leaf: &X509Certificate<'_>,
        _issuer: &X509Certificate<'_>,
    ) -> Result<Vec<u8>, BoxError> {
        Ok(b"request".to_vec())
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

/// What the scripted transport does for one request.
#[derive(Clone, Debug)]
pub(crate) enum Reply {
    Respond(Vec<u8>),
    Refuse,
}

type Script = Box<dyn Fn(usize) -> Reply + Send + Sync>;

/// Transport replying according to a function of the 0-based request index.
pub(crate) struct ScriptedTransport {
    script: Script,
    posts: Mutex<Vec<Instant>>,
}

impl ScriptedTransport {
    pub(crate) fn new(script: impl Fn(usize) -> Reply + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            posts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn always(reply: Reply) -> Self {
        Self::new(move |_| reply.clone())
    }

    pub(crate) fn post_count(&self) -> usize {
        self.posts.lock().unwrap().len()
    }

    pub(crate) fn post_times(&self) -> Vec<Instant> {
        self.posts.lock().unwrap().clone()
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
        _url: &'a str,
        _content_type: &'static str,
        _body: Vec<u8>,
    ) -> BoxFuture<'a, Result<Box<dyn ResponseBody>, BoxError>> {
        let index = {
            let mut posts = self.posts.lock().unwrap();
            posts.push(Instant::now());
            posts.len() - 1
        };
        let result: Result<Box<dyn ResponseBody>, BoxError> = match (self.script)(index) {
            Reply::Respond(bytes) => Ok(Box::new(Body(Some(bytes)))),
            Reply::Refuse => Err("connection refused".into()),
        };
        Box::pin(async move { result })
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingMetrics {
    pub(crate) updates: Mutex<u64>,
    pub(crate) retries: Mutex<u64>,
    pub(crate) errors: Mutex<Vec<FetchErrorKind>>,
}

impl MetricsRecorder for RecordingMetrics {
    fn record_update(&self) {
        *self.updates.lock().unwrap() += 1;
    }

    fn record_retry(&self) {
        *self.retries.lock().unwrap() += 1;
    }

    fn record_error(&self, kind: FetchErrorKind) {
        self.errors.lock().unwrap().push(kind);
    }
}
