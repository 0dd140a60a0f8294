use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::api::error::{ApiError, TransportError};
use crate::api::models::{self, AuthTokens};
use crate::api::routes::{service_for_path, NotFoundPolicy};
use crate::api::transport::{Body, FormPart, HttpRequest, HttpResponse, Method, ReqwestTransport, Transport};
use crate::app::{ServiceBases, Settings};
use crate::storage::Store;
use crate::utils::{is_absolute_url, join_url};

pub const REFRESH_PATH: &str = "/Auth/refresh-token";

/// A request as callers describe it: relative path plus optional body and header overrides.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Body,
    pub headers: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), body: Body::Empty, headers: Vec::new() }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path).json(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Put, path).json(body)
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Patch, path).json(body)
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Body::Json(body);
        self
    }

    pub fn form(mut self, parts: Vec<FormPart>) -> Self {
        self.body = Body::Form(parts);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// REST client that tries the gateway first, falls back once to the owning
/// service's direct base, and refreshes the access token once on a 401.
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    gateway: String,
    services: ServiceBases,
    timeout: Duration,
    not_found: NotFoundPolicy,
    store: Arc<Store>,
    auth: RwLock<Option<AuthTokens>>,
}

impl ApiClient {
    pub fn new(settings: &Settings, store: Arc<Store>) -> Result<Self, ApiError> {
        let transport = Arc::new(ReqwestTransport::new()?);
        Ok(Self::with_transport(settings, store, transport))
    }

    pub fn with_transport(settings: &Settings, store: Arc<Store>, transport: Arc<dyn Transport>) -> Self {
        let tokens = store.tokens().unwrap_or_else(|e| {
            log::warn!("Could not read stored tokens: {e}");
            None
        });
        Self {
            transport,
            gateway: settings.gateway_base.clone(),
            services: settings.services.clone(),
            timeout: settings.request_timeout(),
            not_found: settings.retry_not_found,
            store,
            auth: RwLock::new(tokens),
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn access_token(&self) -> Option<String> {
        self.auth
            .read()
            .ok()
            .and_then(|slot| slot.as_ref().map(|t| t.access_token.clone()))
    }

    fn refresh_token(&self) -> Option<String> {
        self.auth
            .read()
            .ok()
            .and_then(|slot| slot.as_ref().and_then(|t| t.refresh_token.clone()))
            .filter(|r| !r.is_empty())
    }

    /// Persists `tokens` and makes them the in-memory auth state.
    pub fn set_tokens(&self, tokens: AuthTokens) -> Result<(), ApiError> {
        self.store.save_tokens(&tokens)?;
        if let Ok(mut slot) = self.auth.write() {
            *slot = Some(tokens);
        }
        Ok(())
    }

    pub fn clear_session(&self) {
        if let Ok(mut slot) = self.auth.write() {
            *slot = None;
        }
        if let Err(e) = self.store.clear_session() {
            log::warn!("Could not clear stored session: {e}");
        }
    }

    pub async fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.execute(ApiRequest::get(path)).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        self.execute(ApiRequest::post(path, body)).await
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        self.execute(ApiRequest::put(path, body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.execute(ApiRequest::delete(path)).await
    }

    pub async fn get_as<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        models::decode(self.get(path).await?)
    }

    pub async fn execute(&self, req: ApiRequest) -> Result<Value, ApiError> {
        let (resp, base) = self.send_with_fallback(&req).await?;
        let resp = if resp.status == 401 {
            self.refresh_and_replay(&req, base.as_deref()).await?
        } else {
            resp
        };
        Self::interpret(resp)
    }

    /// Sends `req` to the gateway and, on a transport failure, a 5xx, or a
    /// retryable 404, once more to the direct base. Returns the response and
    /// the base that produced it.
    async fn send_with_fallback(&self, req: &ApiRequest) -> Result<(HttpResponse, Option<String>), ApiError> {
        if is_absolute_url(&req.path) {
            let resp = self.send_once(req, None).await?;
            return Ok((resp, None));
        }

        let gateway_result = self.send_once(req, Some(&self.gateway)).await;
        let retry_reason = match &gateway_result {
            Ok(resp) if resp.status >= 500 => Some(format!("HTTP {}", resp.status)),
            Ok(resp) if resp.status == 404 && self.not_found.should_retry(&resp.body) => {
                Some("HTTP 404 (no route)".to_string())
            }
            Ok(_) => None,
            Err(e) => Some(e.to_string()),
        };
        let direct = service_for_path(&req.path)
            .and_then(|service| self.services.base_for(service).map(|base| (service, base.to_string())));

        let (Some(reason), Some((service, base))) = (retry_reason, direct) else {
            return Ok((gateway_result?, Some(self.gateway.clone())));
        };
        log::warn!(
            "{} {} via gateway failed ({reason}); retrying against {service} service at {base}",
            req.method,
            req.path
        );
        let resp = self.send_once(req, Some(&base)).await?;
        Ok((resp, Some(base)))
    }

    async fn refresh_and_replay(&self, req: &ApiRequest, base: Option<&str>) -> Result<HttpResponse, ApiError> {
        let Some(refresh) = self.refresh_token() else {
            log::info!("401 on {} with no refresh token", req.path);
            self.clear_session();
            return Err(ApiError::AuthenticationRequired);
        };

        match self.request_new_tokens(&refresh).await {
            Ok(tokens) => self.set_tokens(tokens)?,
            Err(e) => {
                log::warn!("Token refresh failed: {e}");
                self.clear_session();
                return Err(ApiError::AuthenticationRequired);
            }
        }

        let resp = self.send_once(req, base).await?;
        if resp.status == 401 {
            self.clear_session();
            return Err(ApiError::AuthenticationRequired);
        }
        Ok(resp)
    }

    /// Exchanges the stored refresh token for a new pair outside of a 401.
    pub async fn refresh_session(&self) -> Result<AuthTokens, ApiError> {
        let refresh = self.refresh_token().ok_or(ApiError::AuthenticationRequired)?;
        let tokens = self.request_new_tokens(&refresh).await?;
        self.set_tokens(tokens.clone())?;
        Ok(tokens)
    }

    async fn request_new_tokens(&self, refresh: &str) -> Result<AuthTokens, ApiError> {
        let req = ApiRequest::post(REFRESH_PATH, json!({ "refreshToken": refresh }));
        let (resp, _) = self.send_with_fallback(&req).await?;
        if !resp.is_success() {
            return Err(ApiError::from_response(resp.status, resp.body));
        }
        let mut tokens = AuthTokens::from_response(parse_body(&resp))
            .ok_or_else(|| ApiError::Decode("refresh response carried no access token".into()))?;
        if tokens.refresh_token.is_none() {
            tokens.refresh_token = Some(refresh.to_string());
        }
        Ok(tokens)
    }

    async fn send_once(&self, req: &ApiRequest, base: Option<&str>) -> Result<HttpResponse, TransportError> {
        let url = match base {
            Some(b) => join_url(b, &req.path),
            None => req.path.clone(),
        };
        let http = HttpRequest {
            method: req.method,
            url,
            headers: self.build_headers(req),
            body: req.body.clone(),
            timeout: self.timeout,
        };
        log::debug!("{} {}", http.method, http.url);
        self.transport.send(http).await
    }

    fn build_headers(&self, req: &ApiRequest) -> Vec<(String, String)> {
        let mut headers = vec![("Accept".to_string(), "application/json".to_string())];
        if matches!(req.body, Body::Json(_)) {
            headers.push(("Content-Type".into(), "application/json".into()));
        }
        if let Some(token) = self.access_token() {
            headers.push(("Authorization".into(), format!("Bearer {}", token)));
        }
        for (name, value) in &req.headers {
            // multipart bodies carry their own boundary-bearing content type
            if req.body.is_form() && name.eq_ignore_ascii_case("content-type") {
                continue;
            }
            headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
            headers.push((name.clone(), value.clone()));
        }
        headers
    }

    fn interpret(resp: HttpResponse) -> Result<Value, ApiError> {
        match resp.status {
            s if (200..300).contains(&s) => Ok(parse_body(&resp)),
            401 => Err(ApiError::AuthenticationRequired),
            403 => Err(ApiError::Forbidden),
            s => Err(ApiError::from_response(s, resp.body)),
        }
    }
}

/// JSON when the body is JSON (declared or not); otherwise the raw text in a
/// synthetic success envelope.
pub fn parse_body(resp: &HttpResponse) -> Value {
    let text = resp.body.trim();
    if text.is_empty() {
        return Value::Null;
    }
    match serde_json::from_str::<Value>(text) {
        Ok(v) => v,
        Err(e) => {
            if resp.is_json() {
                log::warn!("Response declared JSON but did not parse: {e}");
            }
            json!({ "success": true, "data": resp.body })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resp(status: u16, ct: Option<&str>, body: &str) -> HttpResponse {
        HttpResponse { status, content_type: ct.map(str::to_string), body: body.to_string() }
    }

    #[test]
    fn parse_body_variants() {
        assert_eq!(parse_body(&resp(200, Some("application/json"), r#"{"a":1}"#))["a"], 1);
        assert_eq!(parse_body(&resp(200, Some("text/plain"), r#"[1,2]"#)).as_array().unwrap().len(), 2);
        let wrapped = parse_body(&resp(200, Some("text/plain"), "OK"));
        assert_eq!(wrapped["success"], true);
        assert_eq!(wrapped["data"], "OK");
        assert!(parse_body(&resp(204, None, "")).is_null());
    }

    #[test]
    fn interpret_maps_statuses() {
        assert!(matches!(ApiClient::interpret(resp(403, None, "")), Err(ApiError::Forbidden)));
        match ApiClient::interpret(resp(422, Some("application/json"), r#"{"title":"Bad"}"#)) {
            Err(ApiError::Status { status, message, body, .. }) => {
                assert_eq!(status, 422);
                assert_eq!(message, "Bad");
                assert!(body.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
