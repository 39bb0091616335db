//! Generic JSON client for the clinic API.
//!
//! # Design
//! `ApiClient` is an explicit instance: base URL, optional bearer token and
//! default headers are fixed at construction. Changing any of them yields a
//! new client (`with_token`, `with_header`), so no header state leaks between
//! callers sharing a client.
//!
//! Every call is split the same way: `build_request` produces an
//! `HttpRequest`, the `Transport` executes it, `parse_response` turns the
//! `HttpResponse` into a typed value or an `ApiError`. The build and parse
//! halves are pure and are tested without a network.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::http::{HttpBody, HttpMethod, HttpRequest, HttpResponse};
use crate::query::QueryParams;
use crate::transport::{ReqwestTransport, Transport};

const CONTENT_TYPE: &str = "content-type";
const AUTHORIZATION: &str = "authorization";

/// HTTP client bound to one API base URL.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    token: Option<String>,
    headers: Vec<(String, String)>,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.token.is_some())
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Client using a fresh `ReqwestTransport`.
    pub fn new(base_url: &str) -> Self {
        Self::with_transport(base_url, Arc::new(ReqwestTransport::new()))
    }

    pub fn with_transport(base_url: &str, transport: Arc<dyn Transport>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            headers: vec![(CONTENT_TYPE.to_string(), "application/json".to_string())],
            transport,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        let client = Self::new(&config.api_url);
        match &config.token {
            Some(token) => client.with_token(token),
            None => client,
        }
    }

    /// Copy of this client that sends `Authorization: Bearer <token>`.
    pub fn with_token(&self, token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
            ..self.clone()
        }
    }

    pub fn without_token(&self) -> Self {
        Self {
            token: None,
            ..self.clone()
        }
    }

    /// Copy of this client with an extra default header. A header with the
    /// same name (ignoring case) is replaced.
    pub fn with_header(&self, name: &str, value: &str) -> Self {
        let mut client = self.clone();
        client.headers.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
        client.headers.push((name.to_string(), value.to_string()));
        client
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// `base + endpoint`, followed by the query string in insertion order.
    pub fn build_url(&self, endpoint: &str, params: Option<&QueryParams>) -> String {
        let mut url = format!("{}{endpoint}", self.base_url);
        if let Some(params) = params.filter(|p| !p.is_empty()) {
            url.push(if endpoint.contains('?') { '&' } else { '?' });
            url.push_str(&params.to_query_string());
        }
        url
    }

    /// Build a request with the default headers merged with `overrides`.
    /// Multipart bodies drop the JSON content type so the transport can set
    /// its own boundary.
    pub fn build_request(
        &self,
        method: HttpMethod,
        endpoint: &str,
        body: Option<HttpBody>,
        params: Option<&QueryParams>,
        overrides: &[(String, String)],
    ) -> HttpRequest {
        let mut headers = self.headers.clone();
        if let Some(token) = &self.token {
            headers.push((AUTHORIZATION.to_string(), format!("Bearer {token}")));
        }
        for (name, value) in overrides {
            headers.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
            headers.push((name.clone(), value.clone()));
        }
        if matches!(body, Some(HttpBody::Multipart(_))) {
            headers.retain(|(key, _)| !key.eq_ignore_ascii_case(CONTENT_TYPE));
        }

        HttpRequest {
            method,
            url: self.build_url(endpoint, params),
            headers,
            body,
        }
    }

    /// `build_request` with `body` serialized as JSON.
    pub fn build_json_request<B: Serialize + ?Sized>(
        &self,
        method: HttpMethod,
        endpoint: &str,
        body: Option<&B>,
        params: Option<&QueryParams>,
    ) -> Result<HttpRequest, ApiError> {
        let body = body
            .map(|body| {
                serde_json::to_string(body)
                    .map(HttpBody::Json)
                    .map_err(|e| ApiError::Serialization(e.to_string()))
            })
            .transpose()?;
        Ok(self.build_request(method, endpoint, body, params, &[]))
    }

    /// Execute a prepared request. Non-2xx responses are returned as data.
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let method = request.method.as_str();
        let url = request.url.clone();
        tracing::debug!(method, url = %url, "sending request");
        let response = self.transport.execute(request).await.inspect_err(|e| {
            tracing::warn!(method, url = %url, error = %e, "request failed before a response");
        })?;
        if !response.is_success() {
            tracing::warn!(method, url = %url, status = response.status, "non-success response");
        }
        Ok(response)
    }

    async fn request<T, B>(
        &self,
        method: HttpMethod,
        endpoint: &str,
        body: Option<&B>,
        params: Option<&QueryParams>,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let request = self.build_json_request(method, endpoint, body, params)?;
        let response = self.send(request).await?;
        parse_response(&response)
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: Option<&QueryParams>,
    ) -> Result<T, ApiError> {
        self.request::<T, ()>(HttpMethod::Get, endpoint, None, params).await
    }

    pub async fn post<T, B>(
        &self,
        endpoint: &str,
        body: Option<&B>,
        params: Option<&QueryParams>,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(HttpMethod::Post, endpoint, body, params).await
    }

    pub async fn put<T, B>(
        &self,
        endpoint: &str,
        body: Option<&B>,
        params: Option<&QueryParams>,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(HttpMethod::Put, endpoint, body, params).await
    }

    pub async fn patch<T, B>(
        &self,
        endpoint: &str,
        body: Option<&B>,
        params: Option<&QueryParams>,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(HttpMethod::Patch, endpoint, body, params).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: Option<&QueryParams>,
    ) -> Result<T, ApiError> {
        self.request::<T, ()>(HttpMethod::Delete, endpoint, None, params).await
    }
}

/// Map a non-success status to `ApiError::Http`. Each envelope field of a
/// JSON object body is read on its own, so one malformed field never hides
/// the others. Empty strings count as absent.
pub fn check_status(response: &HttpResponse) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    let body: Value = serde_json::from_slice(&response.body).unwrap_or(Value::Null);
    let message = match body.get("message") {
        Some(Value::String(m)) if !m.is_empty() => Some(m.clone()),
        _ => None,
    };
    let code = match body.get("code") {
        Some(Value::String(c)) if !c.is_empty() => Some(c.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    let details = body.get("details").filter(|d| !d.is_null()).cloned();
    Err(ApiError::Http {
        status: response.status,
        status_text: response.status_text.clone(),
        message,
        code,
        details,
    })
}

/// Decode a response body. Unparseable 2xx bodies become `InvalidJson`;
/// parseable bodies of the wrong shape become `Deserialization`.
pub fn parse_response<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, ApiError> {
    check_status(response)?;
    let value: Value = serde_json::from_slice(&response.body).map_err(|e| ApiError::InvalidJson {
        status: response.status,
        reason: e.to_string(),
    })?;
    serde_json::from_value(value).map_err(|e| ApiError::Deserialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::FormPart;
    use crate::test_support::StubTransport;
    use crate::types::{ApiResponse, Doctor};

    fn client() -> ApiClient {
        ApiClient::with_transport("http://localhost:3001", Arc::new(StubTransport::new()))
    }

    #[test]
    fn build_url_omits_absent_params() {
        let params = QueryParams::new()
            .insert("startDate", "2025-03-01")
            .insert_opt::<&str>("doctorId", None)
            .insert("endDate", "2025-03-31");
        assert_eq!(
            client().build_url("/api/admin/appointments/range", Some(&params)),
            "http://localhost:3001/api/admin/appointments/range?startDate=2025-03-01&endDate=2025-03-31"
        );
    }

    #[test]
    fn build_url_without_params_has_no_question_mark() {
        assert_eq!(
            client().build_url("/api/admin/doctors", Some(&QueryParams::new())),
            "http://localhost:3001/api/admin/doctors"
        );
    }

    #[test]
    fn build_url_appends_to_existing_query() {
        let params = QueryParams::new().insert("size", 5i64);
        assert_eq!(
            client().build_url("/api/notes?page=1", Some(&params)),
            "http://localhost:3001/api/notes?page=1&size=5"
        );
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let stub = Arc::new(StubTransport::new());
        let client = ApiClient::with_transport("http://localhost:3001/", stub);
        assert_eq!(client.build_url("/api/x", None), "http://localhost:3001/api/x");
    }

    #[test]
    fn default_headers_include_json_and_bearer() {
        let req = client()
            .with_token("abc")
            .build_json_request(
                HttpMethod::Post,
                "/api/admin/doctors",
                Some(&serde_json::json!({"name": "A"})),
                None,
            )
            .unwrap();
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.header("authorization"), Some("Bearer abc"));
        assert_eq!(req.body, Some(HttpBody::Json(r#"{"name":"A"}"#.to_string())));
    }

    #[test]
    fn with_token_does_not_touch_the_original() {
        let base = client();
        let authed = base.with_token("abc");
        assert!(base.token().is_none());
        let req = base.build_request(HttpMethod::Get, "/api/x", None, None, &[]);
        assert!(req.header("authorization").is_none());
        assert_eq!(authed.token(), Some("abc"));
    }

    #[test]
    fn overrides_replace_defaults_case_insensitively() {
        let req = client().with_token("abc").build_request(
            HttpMethod::Get,
            "/api/x",
            None,
            None,
            &[("Authorization".to_string(), "Basic xyz".to_string())],
        );
        let auth: Vec<_> = req
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("authorization"))
            .collect();
        assert_eq!(auth.len(), 1);
        assert_eq!(req.header("authorization"), Some("Basic xyz"));
    }

    #[test]
    fn multipart_requests_drop_json_content_type() {
        let body = HttpBody::Multipart(vec![FormPart::json("note", "{}".to_string())]);
        let req = client().build_request(HttpMethod::Post, "/api/notes", Some(body), None, &[]);
        assert!(req.header("content-type").is_none());
    }

    #[test]
    fn get_without_body_sends_no_body() {
        let req = client()
            .build_json_request::<()>(HttpMethod::Get, "/api/admin/doctors", None, None)
            .unwrap();
        assert!(req.body.is_none());
    }

    #[test]
    fn parse_error_uses_envelope_message() {
        let response = HttpResponse::new(
            409,
            r#"{"message":"X","code":"SLOT_TAKEN","details":{"time":"10:00"}}"#,
        );
        let err = parse_response::<Value>(&response).unwrap_err();
        assert_eq!(err.to_string(), "X");
        assert_eq!(err.status(), Some(409));
        assert_eq!(err.code().as_deref(), Some("SLOT_TAKEN"));
        assert_eq!(err.details().unwrap()["time"], "10:00");
    }

    #[test]
    fn parse_error_with_non_json_body_uses_status_line() {
        let mut response = HttpResponse::new(502, "<html>Bad gateway</html>");
        response.status_text = "Bad Gateway".to_string();
        let err = parse_response::<Value>(&response).unwrap_err();
        assert_eq!(err.to_string(), "HTTP 502: Bad Gateway");
        assert_eq!(err.code().as_deref(), Some("502"));
    }

    #[test]
    fn mistyped_envelope_field_keeps_the_others() {
        let response = HttpResponse::new(409, r#"{"message":"X","code":409}"#);
        let err = parse_response::<Value>(&response).unwrap_err();
        assert_eq!(err.to_string(), "X");
        assert_eq!(err.code().as_deref(), Some("409"));

        let response = HttpResponse::new(400, r#"{"message":{"es":"X"},"code":"BAD"}"#);
        let err = parse_response::<Value>(&response).unwrap_err();
        assert_eq!(err.to_string(), "HTTP 400: Bad Request");
        assert_eq!(err.code().as_deref(), Some("BAD"));
    }

    #[test]
    fn parse_error_with_empty_message_uses_status_line() {
        let response = HttpResponse::new(400, r#"{"message":""}"#);
        let err = parse_response::<Value>(&response).unwrap_err();
        assert_eq!(err.to_string(), "HTTP 400: Bad Request");
    }

    #[test]
    fn unparseable_success_body_is_invalid_json() {
        let response = HttpResponse::new(200, "not json");
        let err = parse_response::<Value>(&response).unwrap_err();
        assert!(err.is_invalid_json());
        assert_eq!(err.code().as_deref(), Some("INVALID_JSON"));
        assert!(!matches!(err, ApiError::Http { .. }));
    }

    #[test]
    fn empty_success_body_is_invalid_json() {
        let err = parse_response::<Value>(&HttpResponse::new(204, Vec::new())).unwrap_err();
        assert!(err.is_invalid_json());
    }

    #[test]
    fn wrong_shape_is_a_deserialization_error() {
        let response = HttpResponse::new(200, r#"{"data":{"id":1},"success":true}"#);
        let err = parse_response::<ApiResponse<Doctor>>(&response).unwrap_err();
        assert!(matches!(err, ApiError::Deserialization(_)));
    }

    #[tokio::test]
    async fn get_executes_through_the_transport() {
        let stub = Arc::new(StubTransport::new());
        stub.respond(200, r#"{"data":[],"success":true}"#);
        let client = ApiClient::with_transport("http://api.test", stub.clone());

        let params = QueryParams::new().insert("search", "ana");
        let res: ApiResponse<Vec<Doctor>> =
            client.get("/api/patient/doctors", Some(&params)).await.unwrap();

        assert!(res.success);
        assert!(res.data.is_empty());
        let sent = stub.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, HttpMethod::Get);
        assert_eq!(sent[0].url, "http://api.test/api/patient/doctors?search=ana");
    }

    #[tokio::test]
    async fn network_failures_propagate() {
        let stub = Arc::new(StubTransport::new());
        stub.fail("connection refused");
        let client = ApiClient::with_transport("http://api.test", stub);
        let err = client.get::<Value>("/api/x", None).await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
    }
}
