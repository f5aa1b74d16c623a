//! Per-resource façade over the client

use reqwest::Method;
use serde::de::DeserializeOwned;

use crate::client::Client;
use crate::filter::Filter;
use crate::task::RequestTask;

/// Thin per-resource façade: domain-specific providers wrap one of these
/// and translate their calls into typed requests. All scheduling, auth
/// recovery and delivery behavior comes from the underlying [`Client`].
#[derive(Debug, Clone)]
pub struct Provider {
    client: Client,
}

impl Provider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn get<T>(&self, filter: &Filter) -> RequestTask<T>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.client.request(Method::GET, filter, None)
    }

    pub fn post<T>(&self, filter: &Filter, body: serde_json::Value) -> RequestTask<T>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.client.request(Method::POST, filter, Some(body))
    }

    pub fn put<T>(&self, filter: &Filter, body: serde_json::Value) -> RequestTask<T>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.client.request(Method::PUT, filter, Some(body))
    }

    pub fn delete<T>(&self, filter: &Filter) -> RequestTask<T>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.client.request(Method::DELETE, filter, None)
    }
}
