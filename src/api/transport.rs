use futures_util::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

use crate::api::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

impl From<Method> for reqwest::Method {
    fn from(m: Method) -> Self {
        match m {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

#[derive(Debug, Clone)]
pub enum FormPart {
    Text { name: String, value: String },
    File { name: String, file_name: String, mime: Option<String>, bytes: Vec<u8> },
}

#[derive(Debug, Clone, Default)]
pub enum Body {
    #[default]
    Empty,
    Json(Value),
    Form(Vec<FormPart>),
}

impl Body {
    pub fn is_form(&self) -> bool {
        matches!(self, Body::Form(_))
    }
}

/// A fully resolved request, ready for the wire.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Body,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.to_ascii_lowercase().contains("json"))
            .unwrap_or(false)
    }
}

/// The wire seam of [`crate::api::client::ApiClient`].
pub trait Transport: Send + Sync {
    fn send(&self, req: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, TransportError>>;
}

pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("exam-portal-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Request { url: String::new(), detail: e.to_string() })?;
        Ok(Self { http })
    }

    fn build_form(url: &str, parts: Vec<FormPart>) -> Result<reqwest::multipart::Form, TransportError> {
        let mut form = reqwest::multipart::Form::new();
        for part in parts {
            form = match part {
                FormPart::Text { name, value } => form.text(name, value),
                FormPart::File { name, file_name, mime, bytes } => {
                    let mut p = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
                    if let Some(m) = mime {
                        p = p.mime_str(&m).map_err(|e| TransportError::Request {
                            url: url.to_string(),
                            detail: e.to_string(),
                        })?;
                    }
                    form.part(name, p)
                }
            };
        }
        Ok(form)
    }

    async fn execute(&self, req: HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = req.url.clone();
        let mut builder = self
            .http
            .request(req.method.into(), &req.url)
            .timeout(req.timeout);
        for (k, v) in &req.headers {
            builder = builder.header(k.as_str(), v.as_str());
        }
        builder = match req.body {
            Body::Empty => builder,
            Body::Json(value) => builder.body(value.to_string()),
            Body::Form(parts) => builder.multipart(Self::build_form(&url, parts)?),
        };

        let resp = builder.send().await.map_err(|e| map_reqwest_error(&url, e))?;
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.text().await.map_err(|e| map_reqwest_error(&url, e))?;
        Ok(HttpResponse { status, content_type, body })
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, req: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, TransportError>> {
        Box::pin(self.execute(req))
    }
}

fn map_reqwest_error(url: &str, e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout { url: url.to_string() }
    } else if e.is_builder() {
        TransportError::Request { url: url.to_string(), detail: e.to_string() }
    } else {
        TransportError::Connect { url: url.to_string(), detail: e.to_string() }
    }
}
