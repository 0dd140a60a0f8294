#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::sync::mpsc;

use exam_portal_client::api::events::IncomingEvent;
use exam_portal_client::api::models::AuthTokens;
use exam_portal_client::api::transport::{HttpRequest, HttpResponse, Transport};
use exam_portal_client::api::{ApiClient, TransportError};
use exam_portal_client::app::{CacheSettings, ServiceBases, Settings};
use exam_portal_client::chat::{HubConnector, HubLink, Invocation};
use exam_portal_client::chat::hub::HubError;
use exam_portal_client::storage::Store;

pub const GATEWAY: &str = "http://gateway.test/api";

type Handler = dyn Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync;

/// Answers every request from a closure and records what was sent.
pub struct ScriptedTransport {
    handler: Box<Handler>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    {
        Arc::new(Self { handler: Box::new(handler), requests: Mutex::new(Vec::new()) })
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.url).collect()
    }

    pub fn count(&self, fragment: &str) -> usize {
        self.urls().iter().filter(|u| u.contains(fragment)).count()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, req: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, TransportError>> {
        let result = (self.handler)(&req);
        self.requests.lock().unwrap().push(req);
        Box::pin(async move { result })
    }
}

pub fn json_response(status: u16, body: Value) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse {
        status,
        content_type: Some("application/json; charset=utf-8".into()),
        body: body.to_string(),
    })
}

pub fn empty(status: u16) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse { status, content_type: None, body: String::new() })
}

pub fn timeout(req: &HttpRequest) -> Result<HttpResponse, TransportError> {
    Err(TransportError::Timeout { url: req.url.clone() })
}

pub fn settings() -> Settings {
    Settings {
        gateway_base: GATEWAY.into(),
        services: ServiceBases {
            auth: "http://auth.test/api".into(),
            exams: "http://exams.test/api".into(),
            courses: "http://courses.test/api".into(),
            materials: "http://materials.test/api".into(),
            chat: "http://chat.test/api".into(),
        },
        ..Settings::default()
    }
}

pub fn memory_store() -> Arc<Store> {
    Arc::new(Store::in_memory(CacheSettings::default()).unwrap())
}

/// A client over `transport` with a fresh in-memory store, optionally logged in.
pub fn client(transport: Arc<ScriptedTransport>, tokens: Option<(&str, Option<&str>)>) -> (Arc<ApiClient>, Arc<Store>) {
    let store = memory_store();
    if let Some((access, refresh)) = tokens {
        store
            .save_tokens(&AuthTokens { access_token: access.into(), refresh_token: refresh.map(str::to_string) })
            .unwrap();
    }
    let api = Arc::new(ApiClient::with_transport(&settings(), store.clone(), transport));
    (api, store)
}

/// Server side of one fake hub connection.
pub struct FakeServer {
    pub invocations: mpsc::UnboundedReceiver<Invocation>,
    pub events: mpsc::UnboundedSender<IncomingEvent>,
}

/// Hub connector that hands out in-process links after an optional delay.
#[derive(Default)]
pub struct FakeConnector {
    pub attempts: AtomicUsize,
    pub fail: AtomicBool,
    pub delay: Duration,
    servers: Mutex<Vec<FakeServer>>,
}

impl FakeConnector {
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self { delay, ..Self::default() })
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn take_server(&self) -> Option<FakeServer> {
        let mut servers = self.servers.lock().unwrap();
        if servers.is_empty() { None } else { Some(servers.remove(0)) }
    }
}

impl HubConnector for FakeConnector {
    fn connect(&self, _access_token: &str) -> BoxFuture<'static, Result<HubLink, HubError>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Box::pin(async { Err(HubError::Connect("refused".into())) });
        }
        let (invocations_tx, invocations_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.servers
            .lock()
            .unwrap()
            .push(FakeServer { invocations: invocations_rx, events: events_tx });
        let delay = self.delay;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            Ok(HubLink { invocations: invocations_tx, events: events_rx })
        })
    }
}
