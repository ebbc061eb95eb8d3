//! HTTP access to the backend.
//!
//! [`ApiClient::request`] is the single primitive; the typed endpoint methods
//! below are thin wrappers over it. The bearer token is read from the
//! [`SessionStore`] on every call, and a 401 on an authenticated call logs
//! the session out before the error is returned.

use api_types::{
    ErrorBody,
    auth::{SendOtp, VerifyOtp, VerifyOtpResponse},
    dashboard::DashboardSummary,
    export::DownloadScope,
    identity::Identity,
    profile::{ProfileResponse, ProfileUpdate},
    transaction::{
        CategorizeRequest, CategorizeResponse, Category, Transaction, TransactionEnvelope,
        TransactionPage, TransactionUpdate,
    },
};
use reqwest::{Method, StatusCode, Url, header};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{cache::QueryCache, error::ApiError, session::SessionStore};

/// How the caller wants a successful body decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Json,
    Blob,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Blob(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: ResponseBody,
}

impl ApiResponse {
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn into_json<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        match self.body {
            ResponseBody::Json(value) => {
                serde_json::from_value(value).map_err(|err| ApiError::Malformed(err.to_string()))
            }
            ResponseBody::Blob(_) => Err(ApiError::Malformed("expected json body".to_string())),
        }
    }

    pub fn into_blob(self) -> Result<Vec<u8>, ApiError> {
        match self.body {
            ResponseBody::Blob(bytes) => Ok(bytes),
            ResponseBody::Json(_) => Err(ApiError::Malformed("expected binary body".to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: Url,
    http: reqwest::Client,
    session: SessionStore,
    /// Cleared along with the session when the server rejects the token.
    cache: Option<QueryCache>,
}

impl ApiClient {
    pub fn new(base_url: Url, session: SessionStore) -> Self {
        Self::with_http(base_url, session, reqwest::Client::new())
    }

    pub fn with_http(base_url: Url, session: SessionStore, http: reqwest::Client) -> Self {
        Self {
            base_url,
            http,
            session,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: QueryCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::Transport(format!("invalid base_url: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Issues one request against `path` (relative to the base URL).
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        kind: ResponseKind,
    ) -> Result<ApiResponse, ApiError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|err| ApiError::Transport(format!("invalid path `{path}`: {err}")))?;
        self.send(method, url, body, kind).await
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
        kind: ResponseKind,
    ) -> Result<ApiResponse, ApiError> {
        let path = url.path().to_string();
        let mut req = self.http.request(method.clone(), url);

        let token = self.session.token();
        if let Some(token) = token.as_deref() {
            let mut value = header::HeaderValue::try_from(format!("Bearer {token}"))
                .map_err(|err| ApiError::Transport(format!("invalid auth header value: {err}")))?;
            value.set_sensitive(true);
            req = req.header(header::AUTHORIZATION, value);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let res = req.send().await.map_err(|err| {
            tracing::warn!("{method} {path} failed: {err}");
            ApiError::Transport(err.to_string())
        })?;
        let status = res.status();
        tracing::debug!("{method} {path} -> {}", status.as_u16());

        let bytes = res.bytes().await.map_err(|err| {
            if status.is_success() {
                ApiError::Malformed(err.to_string())
            } else {
                ApiError::Transport(err.to_string())
            }
        })?;

        if !status.is_success() {
            return Err(self.classify(status, &bytes, token.is_some()));
        }

        let body = match kind {
            ResponseKind::Blob => ResponseBody::Blob(bytes.to_vec()),
            ResponseKind::Json if bytes.iter().all(u8::is_ascii_whitespace) => {
                ResponseBody::Json(Value::Null)
            }
            ResponseKind::Json => ResponseBody::Json(
                serde_json::from_slice(&bytes).map_err(|err| ApiError::Malformed(err.to_string()))?,
            ),
        };

        Ok(ApiResponse {
            status: status.as_u16(),
            body,
        })
    }

    fn classify(&self, status: StatusCode, bytes: &[u8], authenticated: bool) -> ApiError {
        let body = serde_json::from_slice::<ErrorBody>(bytes).unwrap_or_default();
        let message = if body.error.trim().is_empty() {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        } else {
            body.error
        };

        match status.as_u16() {
            401 if authenticated => {
                tracing::warn!("token rejected by server, logging out");
                self.session.logout();
                if let Some(cache) = &self.cache {
                    cache.clear();
                }
                ApiError::AuthExpired
            }
            _ if body.requires_whatsapp_message => ApiError::PreconditionRequired { message },
            404 => ApiError::NotFound { message },
            code @ 400..=499 => ApiError::Validation {
                status: code,
                message,
            },
            code => ApiError::Server {
                status: code,
                message,
            },
        }
    }

    async fn json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<T, ApiError> {
        let url = self.endpoint(segments)?;
        self.send(method, url, body, ResponseKind::Json)
            .await?
            .into_json()
    }

    pub async fn send_otp(&self, phone_number: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["api", "auth", "send-otp"])?;
        let body = SendOtp {
            phone_number: phone_number.to_string(),
        };
        self.send(Method::POST, url, Some(&body), ResponseKind::Json)
            .await
            .map(|_| ())
    }

    pub async fn verify_otp(
        &self,
        phone_number: &str,
        otp: &str,
    ) -> Result<VerifyOtpResponse, ApiError> {
        let body = VerifyOtp {
            phone_number: phone_number.to_string(),
            otp: otp.to_string(),
        };
        self.json(Method::POST, &["api", "auth", "verify-otp"], Some(&body))
            .await
    }

    pub async fn dashboard(&self, wa_id: &str) -> Result<DashboardSummary, ApiError> {
        self.json::<(), _>(Method::GET, &["api", "dashboard", wa_id], None)
            .await
    }

    pub async fn transactions(
        &self,
        wa_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<TransactionPage, ApiError> {
        let mut url = self.endpoint(&["api", "transactions", wa_id])?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("limit", &limit.to_string());
        self.send::<()>(Method::GET, url, None, ResponseKind::Json)
            .await?
            .into_json()
    }

    pub async fn update_transaction(
        &self,
        tx_id: &str,
        update: &TransactionUpdate,
    ) -> Result<Transaction, ApiError> {
        let envelope: TransactionEnvelope = self
            .json(Method::PUT, &["api", "transactions", tx_id], Some(update))
            .await?;
        Ok(envelope.transaction)
    }

    pub async fn delete_transaction(&self, tx_id: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["api", "transactions", tx_id])?;
        self.send::<()>(Method::DELETE, url, None, ResponseKind::Json)
            .await
            .map(|_| ())
    }

    pub async fn categorize(&self, request: &CategorizeRequest) -> Result<Category, ApiError> {
        let res: CategorizeResponse = self
            .json(Method::POST, &["api", "categorize"], Some(request))
            .await?;
        Ok(res.category)
    }

    pub async fn download_excel(
        &self,
        wa_id: &str,
        scope: DownloadScope,
    ) -> Result<Vec<u8>, ApiError> {
        let url = match scope {
            DownloadScope::All => self.endpoint(&["api", "download-excel", wa_id])?,
            scope => self.endpoint(&["api", "download-excel", wa_id, scope.as_str()])?,
        };
        self.send::<()>(Method::GET, url, None, ResponseKind::Blob)
            .await?
            .into_blob()
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<Identity, ApiError> {
        let res: ProfileResponse = self
            .json(Method::PUT, &["api", "user", "profile"], Some(update))
            .await?;
        Ok(res.user)
    }
}
