// Message API HTTP client
//
// Wraps `reqwest::Client` with chat-server URL construction, status
// mapping, and error-body extraction. Also derives the push-channel URL
// from the same base so both transports always target one server.

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::models::{DeleteResponse, ErrorBody, LoginResponse, Message, MessageId, NewMessage};
use crate::transport::TransportConfig;

/// Raw HTTP client for the chat server's `/api` surface.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    base_url: Url,
}

#[derive(Serialize)]
struct AdminLoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

impl ChatClient {
    /// Create a new client from a `TransportConfig`.
    ///
    /// `base_url` is the server root (e.g. `https://chat.example.com`);
    /// all REST paths live under its `/api` prefix.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self { http, base_url })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// Convenience constructor from a string URL.
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        Ok(Self::with_client(http, Url::parse(base_url)?))
    }

    /// The server base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build `{base}/api/{segments...}`, percent-encoding each segment.
    pub(crate) fn api_url(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?;
            path.pop_if_empty().push("api");
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    /// Push-channel address for `identity`: `ws(s)://{host}/ws/{identity}`.
    pub fn push_url(&self, identity: &str) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme).map_err(|()| {
            Error::WebSocketConnect(format!("cannot derive push URL from {}", self.base_url))
        })?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?;
            path.pop_if_empty().push("ws").push(identity);
        }
        url.set_query(None);
        Ok(url)
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// `GET /api/messages`: the ordered snapshot, oldest first.
    ///
    /// `limit` bounds the number of most recent messages; the server
    /// applies its own default (50) when omitted.
    pub async fn list_messages(&self, limit: Option<u32>) -> Result<Vec<Message>, Error> {
        let mut url = self.api_url(&["messages"])?;
        if let Some(limit) = limit {
            url.query_pairs_mut()
                .append_pair("limit", &limit.to_string());
        }
        debug!("GET {}", url);

        let resp = self.http.get(url).send().await?;
        self.parse_response(resp, None).await
    }

    /// `POST /api/messages`. Returns the created message as echoed by the server.
    pub async fn create_message(&self, message: &NewMessage) -> Result<Message, Error> {
        let url = self.api_url(&["messages"])?;
        debug!("POST {}", url);

        let resp = self.http.post(url).json(message).send().await?;
        self.parse_response(resp, None).await
    }

    /// `DELETE /api/admin/messages/{id}`.
    pub async fn delete_message(&self, id: &MessageId) -> Result<DeleteResponse, Error> {
        let url = self.api_url(&["admin", "messages", id.as_str()])?;
        debug!("DELETE {}", url);

        let resp = self.http.delete(url).send().await?;
        self.parse_response(resp, Some(id)).await
    }

    /// `POST /api/admin/login`. A `401` maps to [`Error::Authentication`].
    pub async fn admin_login(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<LoginResponse, Error> {
        let url = self.api_url(&["admin", "login"])?;
        debug!("POST {}", url);

        let body = AdminLoginRequest {
            username,
            password: password.expose_secret(),
        };
        let resp = self.http.post(url).json(&body).send().await?;
        self.parse_response(resp, None).await
    }

    // ── Response handling ────────────────────────────────────────────

    /// Map non-success statuses to typed errors, then deserialize the body.
    async fn parse_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
        subject: Option<&MessageId>,
    ) -> Result<T, Error> {
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.detail)
                .unwrap_or_else(|_| status.canonical_reason().unwrap_or("unknown").to_owned());

            return Err(match (status, subject) {
                (reqwest::StatusCode::UNAUTHORIZED, _) => Error::Authentication { message },
                (reqwest::StatusCode::NOT_FOUND, Some(id)) => Error::NotFound { id: id.to_string() },
                _ => Error::Api {
                    status: status.as_u16(),
                    message,
                },
            });
        }

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }
}
