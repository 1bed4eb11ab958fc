use crate::AcsError;
use base64::prelude::*;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client as ReqwestClient, Method, Response};
use serde::Deserialize;
use sha2::Sha256;
use std::fmt::{self, Debug, Formatter};
use std::time::Duration;
use url::Url;

const STORAGE_API_VERSION: &str = "2021-08-06";

#[derive(Clone)]
enum StorageCredential {
    SharedKey { account: String, key: Vec<u8> },
    Sas(String),
}

/// An Azure Storage connection string, reduced to what the queue service needs.
#[derive(Clone)]
pub struct StorageConnectionString {
    queue_endpoint: Url,
    credential: StorageCredential,
}

impl Debug for StorageConnectionString {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("StorageConnectionString")
            .field("queue_endpoint", &self.queue_endpoint.as_str())
            .finish_non_exhaustive()
    }
}

impl StorageConnectionString {
    pub fn parse(value: &str) -> Result<StorageConnectionString, AcsError> {
        let mut protocol = "https";
        let mut suffix = "core.windows.net";
        let mut account = None;
        let mut key = None;
        let mut queue_endpoint = None;
        let mut sas = None;

        for segment in value.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (name, val) = segment.split_once('=').ok_or_else(|| {
                AcsError::ConnectionString(format!("malformed segment `{segment}`"))
            })?;
            match name.trim().to_ascii_lowercase().as_str() {
                "defaultendpointsprotocol" => protocol = val,
                "endpointsuffix" => suffix = val,
                "accountname" => account = Some(val),
                "accountkey" => key = Some(val),
                "queueendpoint" => queue_endpoint = Some(val),
                "sharedaccesssignature" => sas = Some(val),
                _ => {}
            }
        }

        let queue_endpoint = match (queue_endpoint, account) {
            (Some(endpoint), _) => endpoint.to_string(),
            (None, Some(account)) => format!("{protocol}://{account}.queue.{suffix}"),
            (None, None) => {
                return Err(AcsError::ConnectionString(
                    "missing `AccountName` or `QueueEndpoint`".to_string(),
                ))
            }
        };
        let queue_endpoint = Url::parse(&queue_endpoint)
            .map_err(|e| AcsError::ConnectionString(format!("invalid queue endpoint: {e}")))?;

        let credential = match (account, key, sas) {
            (Some(account), Some(key), _) => StorageCredential::SharedKey {
                account: account.to_string(),
                key: BASE64_STANDARD.decode(key).map_err(|_| {
                    AcsError::ConnectionString("`AccountKey` is not base64".to_string())
                })?,
            },
            (_, _, Some(sas)) => StorageCredential::Sas(sas.trim_start_matches('?').to_string()),
            _ => {
                return Err(AcsError::ConnectionString(
                    "missing `AccountKey` or `SharedAccessSignature`".to_string(),
                ))
            }
        };

        Ok(StorageConnectionString {
            queue_endpoint,
            credential,
        })
    }
}

/// A message received from a storage queue. `body` holds the base64-decoded
/// message text, or the raw text when it is not base64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub message_id: String,
    pub pop_receipt: String,
    pub dequeue_count: u32,
    pub body: String,
}

#[derive(Deserialize)]
struct QueueMessagesList {
    #[serde(rename = "QueueMessage", default)]
    messages: Vec<RawQueueMessage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawQueueMessage {
    message_id: String,
    pop_receipt: String,
    #[serde(default)]
    dequeue_count: u32,
    #[serde(default)]
    message_text: String,
}

impl From<RawQueueMessage> for QueueMessage {
    fn from(raw: RawQueueMessage) -> Self {
        let body = BASE64_STANDARD
            .decode(raw.message_text.trim())
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .unwrap_or(raw.message_text);

        QueueMessage {
            message_id: raw.message_id,
            pop_receipt: raw.pop_receipt,
            dequeue_count: raw.dequeue_count,
            body,
        }
    }
}

#[derive(Clone)]
pub struct QueueClient {
    queue_url: Url,
    credential: StorageCredential,
    client: ReqwestClient,
}

impl QueueClient {
    pub fn new(connection_string: &str, queue_name: &str) -> Result<QueueClient, AcsError> {
        let connection = StorageConnectionString::parse(connection_string)?;
        let mut queue_url = connection.queue_endpoint;
        queue_url
            .path_segments_mut()
            .map_err(|_| AcsError::InvalidInput("queue endpoint cannot be a base URL".to_string()))?
            .pop_if_empty()
            .push(queue_name);

        Ok(QueueClient {
            queue_url,
            credential: connection.credential,
            client: ReqwestClient::new(),
        })
    }

    /// Receives up to `max_messages` (the service caps this at 32), hiding them
    /// from other consumers for `visibility_timeout`.
    pub async fn receive_messages(
        &self,
        max_messages: u32,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueueMessage>, AcsError> {
        let mut url = self.messages_url()?;
        url.query_pairs_mut()
            .append_pair("numofmessages", &max_messages.clamp(1, 32).to_string())
            .append_pair("visibilitytimeout", &visibility_timeout.as_secs().max(1).to_string());

        let text = self.send(Method::GET, url).await?.text().await?;
        let list: QueueMessagesList =
            quick_xml::de::from_str(&text).map_err(|e| AcsError::Parsing(e.to_string()))?;

        Ok(list.messages.into_iter().map(QueueMessage::from).collect())
    }

    pub async fn delete_message(&self, message: &QueueMessage) -> Result<(), AcsError> {
        let mut url = self.messages_url()?;
        url.path_segments_mut()
            .map_err(|_| AcsError::InvalidInput("queue URL cannot be a base URL".to_string()))?
            .push(&message.message_id);
        url.query_pairs_mut()
            .append_pair("popreceipt", &message.pop_receipt);

        self.send(Method::DELETE, url).await?;
        Ok(())
    }

    fn messages_url(&self) -> Result<Url, AcsError> {
        let mut url = self.queue_url.clone();
        url.path_segments_mut()
            .map_err(|_| AcsError::InvalidInput("queue URL cannot be a base URL".to_string()))?
            .push("messages");
        Ok(url)
    }

    async fn send(&self, method: Method, mut url: Url) -> Result<Response, AcsError> {
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();

        let authorization = match &self.credential {
            StorageCredential::SharedKey { account, key } => {
                let payload = shared_key_lite_payload(&method, &url, account, &date);
                let mut hasher = Hmac::<Sha256>::new_from_slice(key)
                    .map_err(|_| AcsError::InvalidInput("invalid account key length".to_string()))?;
                hasher.update(payload.as_bytes());
                let signature = BASE64_STANDARD.encode(hasher.finalize().into_bytes());
                Some(format!("SharedKeyLite {account}:{signature}"))
            }
            StorageCredential::Sas(sas) => {
                let query = match url.query() {
                    Some(q) => format!("{q}&{sas}"),
                    None => sas.clone(),
                };
                url.set_query(Some(&query));
                None
            }
        };

        let mut request = self
            .client
            .request(method, url)
            .header("x-ms-date", &date)
            .header("x-ms-version", STORAGE_API_VERSION);
        if let Some(authorization) = authorization {
            request = request.header(AUTHORIZATION, authorization);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(AcsError::Http { status, body })
    }
}

/// `SharedKeyLite` string-to-sign for the queue service. `Date` stays empty
/// because `x-ms-date` is sent and signed as a canonicalized header.
fn shared_key_lite_payload(method: &Method, url: &Url, account: &str, date: &str) -> String {
    let comp = url
        .query_pairs()
        .find(|(name, _)| name == "comp")
        .map(|(_, value)| format!("?comp={value}"))
        .unwrap_or_default();

    format!(
        "{}\n\n\n\nx-ms-date:{date}\nx-ms-version:{STORAGE_API_VERSION}\n/{account}{}{comp}",
        method.as_str(),
        url.path()
    )
}
