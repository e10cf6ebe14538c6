// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Idle-aware ownership of a stateful client
//!
//! Some backends hand out sessions that the server silently drops after a
//! period of inactivity. [`IdleReconnect`] owns such a client, recreates it
//! through its [`Connector`] when it has been idle longer than the threshold,
//! and retries a call once on a fresh client after a connection-level
//! failure. Callers never see the stale-session error.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::backend::BackendError;

#[async_trait]
pub trait Connector: Send + Sync {
    type Client: Send + Sync;

    async fn connect(&self) -> Result<Self::Client, BackendError>;
}

struct Slot<T> {
    client: Arc<T>,
    last_used: Instant,
}

pub struct IdleReconnect<C: Connector> {
    connector: C,
    idle_timeout: Duration,
    slot: Mutex<Option<Slot<C::Client>>>,
    connects: AtomicU64,
}

impl<C: Connector> IdleReconnect<C> {
    pub fn new(connector: C, idle_timeout: Duration) -> Self {
        Self { connector, idle_timeout, slot: Mutex::new(None), connects: AtomicU64::new(0) }
    }

    /// Current client, reconnecting first if it is missing or has been idle
    /// past the threshold.
    pub async fn client(&self) -> Result<Arc<C::Client>, BackendError> {
        let mut slot = self.slot.lock().await;
        let now = Instant::now();

        if let Some(current) = slot.as_mut() {
            let idle = now.duration_since(current.last_used);
            if idle <= self.idle_timeout {
                current.last_used = now;
                return Ok(current.client.clone());
            }
            info!(idle_ms = idle.as_millis() as u64, "Client idle past threshold, reconnecting");
        }

        let client = Arc::new(self.connector.connect().await?);
        self.connects.fetch_add(1, Ordering::Relaxed);
        *slot = Some(Slot { client: client.clone(), last_used: now });
        debug!("Backend client connected");
        Ok(client)
    }

    /// Drop the current client; the next call reconnects.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }

    /// Run `op` against the client. A transient failure drops the client and
    /// retries once on a fresh connection.
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T, BackendError>
    where
        F: Fn(Arc<C::Client>) -> Fut + Send,
        Fut: Future<Output = Result<T, BackendError>> + Send,
        T: Send,
    {
        let client = self.client().await?;
        match op(client).await {
            Err(e) if e.is_transient() => {
                warn!(error = %e, "Connection-level failure, retrying on a fresh client");
                self.invalidate().await;
                let client = self.client().await?;
                op(client).await
            }
            other => other,
        }
    }

    /// Number of successful connects so far.
    pub fn connect_count(&self) -> u64 {
        self.connects.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct CountingConnector {
        next_id: AtomicU32,
    }

    #[async_trait]
    impl Connector for CountingConnector {
        type Client = u32;

        async fn connect(&self) -> Result<u32, BackendError> {
            Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
        }
    }

    fn wrapper(idle: Duration) -> IdleReconnect<CountingConnector> {
        IdleReconnect::new(CountingConnector { next_id: AtomicU32::new(0) }, idle)
    }

    #[tokio::test]
    async fn test_reuses_client_within_threshold() {
        let reconnect = wrapper(Duration::from_secs(60));
        assert_eq!(*reconnect.client().await.unwrap(), 0);
        assert_eq!(*reconnect.client().await.unwrap(), 0);
        assert_eq!(reconnect.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_reconnects_after_idle() {
        let reconnect = wrapper(Duration::from_millis(20));
        assert_eq!(*reconnect.client().await.unwrap(), 0);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(*reconnect.client().await.unwrap(), 1);
        assert_eq!(reconnect.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_retries_once_after_transient_failure() {
        let reconnect = wrapper(Duration::from_secs(60));
        let result = reconnect
            .call(|client| async move {
                if *client == 0 {
                    Err(BackendError::Network("session expired".into()))
                } else {
                    Ok(*client)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_non_transient_failure_is_returned() {
        let reconnect = wrapper(Duration::from_secs(60));
        let result: Result<(), _> = reconnect
            .call(|_| async { Err(BackendError::Rejected("bad query".into())) })
            .await;
        assert!(matches!(result, Err(BackendError::Rejected(_))));
        assert_eq!(reconnect.connect_count(), 1);
    }
}
