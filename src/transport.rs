//! Delivery of encoded OCSP requests to the responder.
//!
//! [`Transport`] is the seam between the fetch logic and the network. With the
//! `http` feature (enabled by default) [`HttpTransport`] provides an HTTP POST
//! implementation backed by `reqwest`.

use crate::error::BoxError;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Content type of an encoded OCSP request.
pub const OCSP_REQUEST_CONTENT_TYPE: &str = "application/ocsp-request";

/// Sends an encoded OCSP request and hands back the response body.
pub trait Transport: Send + Sync + 'static {
    /// POSTs `body` to `url` with the given content type.
    ///
    /// An error means the request could not be delivered or no response was
    /// received; the caller treats it as transient.
    fn post<'a>(
        &'a self,
        url: &'a str,
        content_type: &'static str,
        body: Vec<u8>,
    ) -> BoxFuture<'a, Result<Box<dyn ResponseBody>, BoxError>>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn post<'a>(
        &'a self,
        url: &'a str,
        content_type: &'static str,
        body: Vec<u8>,
    ) -> BoxFuture<'a, Result<Box<dyn ResponseBody>, BoxError>> {
        (**self).post(url, content_type, body)
    }
}

/// The body of a response returned by a [`Transport`].
pub trait ResponseBody: Send {
    /// Reads the complete body.
    fn read_to_end(&mut self) -> BoxFuture<'_, Result<Vec<u8>, BoxError>>;

    /// Releases the underlying resource.
    ///
    /// Called once after [`ResponseBody::read_to_end`], whether or not the read
    /// succeeded. A failure here does not invalidate bytes already read.
    fn close(self: Box<Self>) -> Result<(), BoxError>;
}

#[cfg(feature = "http")]
pub use http::{HttpTransport, DEFAULT_HTTP_TIMEOUT};

#[cfg(feature = "http")]
mod http {
    use super::{ResponseBody, Transport};
    use crate::error::BoxError;
    use crate::prelude::debug;
    use futures::future::BoxFuture;
    use std::time::Duration;

    /// Default bound on a whole OCSP exchange over HTTP.
    pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

    /// [`Transport`] that POSTs requests over HTTP(S) with `reqwest`.
    #[derive(Clone, Debug)]
    pub struct HttpTransport {
        client: reqwest::Client,
    }

    impl HttpTransport {
        /// Creates a transport using [`DEFAULT_HTTP_TIMEOUT`].
        ///
        /// # Errors
        ///
        /// Returns an error if the HTTP client cannot be initialized.
        pub fn new() -> Result<Self, BoxError> {
            Self::with_timeout(DEFAULT_HTTP_TIMEOUT)
        }

        /// Creates a transport whose exchanges are bounded by `timeout`.
        ///
        /// # Errors
        ///
        /// Returns an error if the HTTP client cannot be initialized.
        pub fn with_timeout(timeout: Duration) -> Result<Self, BoxError> {
            let client = reqwest::Client::builder().timeout(timeout).build()?;
            Ok(Self { client })
        }

        /// Wraps an existing client, e.g. one configured with a proxy.
        pub fn from_client(client: reqwest::Client) -> Self {
            Self { client }
        }
    }

    impl Transport for HttpTransport {
        fn post<'a>(
            &'a self,
            url: &'a str,
            content_type: &'static str,
            body: Vec<u8>,
        ) -> BoxFuture<'a, Result<Box<dyn ResponseBody>, BoxError>> {
            Box::pin(self.send(url, content_type, body))
        }
    }

    impl HttpTransport {
        async fn send(
            &self,
            url: &str,
            content_type: &'static str,
            body: Vec<u8>,
        ) -> Result<Box<dyn ResponseBody>, BoxError> {
            let response = self
                .client
                .post(url)
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .body(body)
                .send()
                .await?;

            debug!(
                "OCSP responder replied: url={}, status={}",
                url,
                response.status()
            );

            Ok(Box::new(HttpResponseBody {
                response: Some(response),
            }))
        }
    }

    struct HttpResponseBody {
        response: Option<reqwest::Response>,
    }

    impl HttpResponseBody {
        async fn read(&mut self) -> Result<Vec<u8>, BoxError> {
            let response = self
                .response
                .take()
                .ok_or("OCSP response body already consumed")?;
            Ok(response.bytes().await?.to_vec())
        }
    }

    impl ResponseBody for HttpResponseBody {
        fn read_to_end(&mut self) -> BoxFuture<'_, Result<Vec<u8>, BoxError>> {
            Box::pin(self.read())
        }

        fn close(self: Box<Self>) -> Result<(), BoxError> {
            // reqwest returns the connection to the pool on drop
            Ok(())
        }
    }

}
