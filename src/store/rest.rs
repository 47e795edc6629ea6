//! PostgREST-dialect remote store.
//!
//! Rows live at `{base_url}/rest/v1/{table}`; filters are query parameters
//! of the form `column=eq.value`.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::config::RemoteConfig;
use crate::error::RemoteError;
use crate::store::traits::{Filter, Record, RemoteDataStore};

/// HTTP client for a PostgREST-compatible backend.
pub struct RestRemoteStore {
    base_url: String,
    api_key: SecretString,
    client: reqwest::Client,
}

impl RestRemoteStore {
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            base_url: config.base_url,
            api_key: config.api_key,
            client: reqwest::Client::new(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        let key = self.api_key.expose_secret();
        self.client
            .request(method, self.table_url(table))
            .header("apikey", key)
            .bearer_auth(key)
    }

    async fn send(table: &str, builder: RequestBuilder) -> Result<Response, RemoteError> {
        let resp = builder.send().await.map_err(|e| RemoteError::Request {
            table: table.to_string(),
            reason: e.to_string(),
        })?;

        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Err(RemoteError::Status {
            table: table.to_string(),
            status,
            body,
        })
    }

    fn patch_request(&self, table: &str, filter: &Filter, fields: &Record) -> RequestBuilder {
        self.request(Method::PATCH, table)
            .header("Prefer", "return=representation")
            .query(&filter_param(filter))
            .json(fields)
    }

    async fn decode_rows(table: &str, resp: Response) -> Result<Vec<Record>, RemoteError> {
        let value: Value = resp.json().await.map_err(|e| RemoteError::Decode {
            table: table.to_string(),
            reason: e.to_string(),
        })?;
        rows_from_value(table, value)
    }
}

fn filter_param(filter: &Filter) -> [(String, String); 1] {
    [(filter.column.clone(), format!("eq.{}", filter.value))]
}

/// PostgREST answers with an array of rows.
fn rows_from_value(table: &str, value: Value) -> Result<Vec<Record>, RemoteError> {
    let decode_err = |reason: &str| RemoteError::Decode {
        table: table.to_string(),
        reason: reason.to_string(),
    };
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => Ok(map),
                _ => Err(decode_err("expected an array of objects")),
            })
            .collect(),
        Value::Object(map) => Ok(vec![map]),
        _ => Err(decode_err("expected an array of objects")),
    }
}

#[async_trait]
impl RemoteDataStore for RestRemoteStore {
    async fn fetch(&self, table: &str, filter: &Filter) -> Result<Option<Record>, RemoteError> {
        let builder = self
            .request(Method::GET, table)
            .query(&filter_param(filter))
            .query(&[("select", "*"), ("limit", "1")]);
        let resp = Self::send(table, builder).await?;
        let rows = Self::decode_rows(table, resp).await?;
        Ok(rows.into_iter().next())
    }

    async fn create(&self, table: &str, record: &Record) -> Result<Record, RemoteError> {
        let builder = self
            .request(Method::POST, table)
            .header("Prefer", "return=representation")
            .json(record);
        let resp = Self::send(table, builder).await?;
        let rows = Self::decode_rows(table, resp).await?;
        rows.into_iter().next().ok_or_else(|| RemoteError::Decode {
            table: table.to_string(),
            reason: "insert returned no rows".to_string(),
        })
    }

    async fn update(
        &self,
        table: &str,
        filter: &Filter,
        fields: &Record,
    ) -> Result<(), RemoteError> {
        let resp = Self::send(table, self.patch_request(table, filter, fields)).await?;
        let body = resp.text().await.map_err(|e| RemoteError::Decode {
            table: table.to_string(),
            reason: e.to_string(),
        })?;

        // A PATCH matching nothing still succeeds, with an empty row list.
        // Servers that ignore `Prefer` send no body at all, so ask directly.
        let matched = if body.trim().is_empty() {
            self.fetch(table, filter).await?.is_some()
        } else {
            let value: Value =
                serde_json::from_str(&body).map_err(|e| RemoteError::Decode {
                    table: table.to_string(),
                    reason: e.to_string(),
                })?;
            !rows_from_value(table, value)?.is_empty()
        };
        if !matched {
            return Err(RemoteError::NotFound {
                table: table.to_string(),
                filter: filter.to_string(),
            });
        }
        Ok(())
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<(), RemoteError> {
        let builder = self
            .request(Method::DELETE, table)
            .query(&filter_param(filter));
        Self::send(table, builder).await?;
        Ok(())
    }
}
