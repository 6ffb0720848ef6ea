//! HTTP capability the pipeline dispatches through.
//!
//! The trait carries exactly what the gateway needs (method, absolute URL,
//! body, headers) so tests can substitute a scripted double without a
//! network.

use std::error::Error as StdError;
use std::future::Future;
use std::pin::Pin;

use reqwest::Method;

use crate::transport::RequestBody;

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone)]
pub(crate) struct HttpResponse {
    pub status: u16,
    pub body: String,
}

pub(crate) trait HttpTransport: Send + Sync {
    fn send<'a>(
        &'a self,
        method: Method,
        url: &'a str,
        body: RequestBody,
        headers: Vec<(String, String)>,
    ) -> BoxFuture<'a, Result<HttpResponse, Box<dyn StdError + Send + Sync>>>;
}

#[derive(Debug, Clone)]
pub(crate) struct ReqwestTransport {
    pub client: reqwest::Client,
}

impl HttpTransport for ReqwestTransport {
    fn send<'a>(
        &'a self,
        method: Method,
        url: &'a str,
        body: RequestBody,
        headers: Vec<(String, String)>,
    ) -> BoxFuture<'a, Result<HttpResponse, Box<dyn StdError + Send + Sync>>> {
        Box::pin(async move {
            let mut request = self.client.request(method, url);
            request = match body {
                RequestBody::Empty => request,
                RequestBody::Form(fields) => request.form(&fields),
                RequestBody::Json(value) => request.json(&value),
            };
            for (name, value) in headers {
                request = request.header(name, value);
            }
            let response = request.send().await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            Ok(HttpResponse { status, body })
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Debug, Clone)]
    pub(crate) struct RecordedRequest {
        pub method: Method,
        pub url: String,
        pub body: RequestBody,
        pub headers: Vec<(String, String)>,
    }

    impl RecordedRequest {
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
        }

        pub fn form_field(&self, name: &str) -> Option<&str> {
            match &self.body {
                RequestBody::Form(fields) => fields
                    .iter()
                    .find(|(key, _)| key == name)
                    .map(|(_, value)| value.as_str()),
                _ => None,
            }
        }
    }

    /// Scripted [`HttpTransport`]: hands out queued responses in order and
    /// records every request it sees.
    #[derive(Debug, Clone)]
    pub(crate) struct FakeTransport {
        state: Arc<Mutex<FakeTransportState>>,
    }

    #[derive(Debug)]
    struct FakeTransportState {
        responses: VecDeque<HttpResponse>,
        requests: Vec<RecordedRequest>,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self {
                state: Arc::new(Mutex::new(FakeTransportState {
                    responses: VecDeque::new(),
                    requests: Vec::new(),
                })),
            }
        }

        pub fn respond(self, status: u16, body: impl Into<String>) -> Self {
            self.push_response(status, body);
            self
        }

        pub fn push_response(&self, status: u16, body: impl Into<String>) {
            self.state
                .lock()
                .unwrap()
                .responses
                .push_back(HttpResponse {
                    status,
                    body: body.into(),
                });
        }

        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.state.lock().unwrap().requests.clone()
        }

        pub fn request_count(&self) -> usize {
            self.state.lock().unwrap().requests.len()
        }
    }

    impl HttpTransport for FakeTransport {
        fn send<'a>(
            &'a self,
            method: Method,
            url: &'a str,
            body: RequestBody,
            headers: Vec<(String, String)>,
        ) -> BoxFuture<'a, Result<HttpResponse, Box<dyn StdError + Send + Sync>>> {
            Box::pin(async move {
                let mut state = self.state.lock().unwrap();
                state.requests.push(RecordedRequest {
                    method,
                    url: url.to_owned(),
                    body,
                    headers,
                });
                let response = state
                    .responses
                    .pop_front()
                    .expect("FakeTransport ran out of scripted responses");
                Ok(response)
            })
        }
    }
}
