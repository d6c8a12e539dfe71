//! An in-process [`RpcChannel`] straight into a [`Dispatcher`].
//!
//! Requests still go through full envelope JSON, so the marshaling path is
//! the same as over TCP; only the socket is skipped.

use async_trait::async_trait;
use fsremote_types::{Request, RpcChannel, RpcError};
use serde_json::Value as Json;
use std::sync::Arc;

use crate::dispatch::Dispatcher;

#[derive(Debug, Clone)]
pub struct LoopbackChannel {
    dispatcher: Arc<Dispatcher>,
}

impl LoopbackChannel {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl RpcChannel for LoopbackChannel {
    async fn call(&self, method: &str, args: Json) -> Result<Json, RpcError> {
        let request = Request::new(method, args);
        let dispatcher = Arc::clone(&self.dispatcher);
        let response = tokio::task::spawn_blocking(move || dispatcher.dispatch(&request))
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        Ok(response.into_result()?)
    }

    fn call_sync(&self, method: &str, args: Json) -> Result<Json, RpcError> {
        let request = Request::new(method, args);
        Ok(self.dispatcher.dispatch(&request).into_result()?)
    }
}
