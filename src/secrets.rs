use anyhow::{anyhow, Context, Result};
use std::env::var;
use url::Url;

#[derive(Debug, Clone)]
pub struct Secrets {
    pub acs_connection_string: String,
    pub storage_connection_string: String,
    pub storage_queue_name: String,
    pub callback_host: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            acs_connection_string: required("ACS_CONNECTION_STRING")?,
            storage_connection_string: required("STORAGE_CONNECTION_STRING")?,
            storage_queue_name: required("STORAGE_QUEUE_NAME")?,
            callback_host: var("ACS_CALLBACK_URI")
                .or_else(|_| var("VS_TUNNEL_URL"))
                .ok()
                .filter(|host| !host.trim().is_empty()),
        })
    }

    /// The `/api/callbacks` endpoint under the configured callback host, if any.
    pub fn callback_uri(&self) -> Result<Option<Url>> {
        self.callback_host
            .as_deref()
            .map(|host| {
                let uri = format!("{}/api/callbacks", host.trim_end_matches('/'));
                Url::parse(&uri).with_context(|| format!("Invalid callback URI {uri}"))
            })
            .transpose()
    }
}

fn required(name: &str) -> Result<String> {
    var(name).map_err(|_| anyhow!("{name} must be set"))
}
