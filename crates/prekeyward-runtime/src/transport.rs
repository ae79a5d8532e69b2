//! Outbound seam between the driver and the host's connections.

use async_trait::async_trait;
use prekeyward_client::AccountId;
use prekeyward_proto::Request;
use tokio::sync::mpsc;

use crate::error::RuntimeError;

/// Carries client output onto the host's account connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a discovery request on `account`'s connection.
    async fn send_request(&self, account: &str, request: Request) -> Result<(), RuntimeError>;

    /// Send an instant message from `account` to `to`.
    async fn send_message(
        &self,
        account: &str,
        to: &str,
        body: String,
    ) -> Result<(), RuntimeError>;

    /// The message from `from` was consumed and must not reach the user.
    ///
    /// Hosts that decide display before handing messages over can ignore it.
    async fn suppress_message(&self, _account: &str, _from: &str) -> Result<(), RuntimeError> {
        Ok(())
    }
}

/// One item handed to the host by [`ChannelTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Discovery request to send.
    Request {
        /// Connection to use.
        account: AccountId,
        /// The request.
        request: Request,
    },
    /// Instant message to send.
    Message {
        /// Sending account.
        account: AccountId,
        /// Destination address.
        to: String,
        /// Message body.
        body: String,
    },
    /// Inbound message that must not be displayed.
    Suppressed {
        /// Receiving account.
        account: AccountId,
        /// Sender of the consumed message.
        from: String,
    },
}

/// Transport that hands everything to a bounded channel.
///
/// Backpressure from a slow host stalls the driver rather than dropping
/// requests, so correlation entries never outlive their request.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::Sender<Outbound>,
}

impl ChannelTransport {
    /// Create a transport and the receiver the host drains.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    async fn push(&self, item: Outbound) -> Result<(), RuntimeError> {
        self.tx
            .send(item)
            .await
            .map_err(|_| RuntimeError::Transport("host receiver dropped".into()))
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send_request(&self, account: &str, request: Request) -> Result<(), RuntimeError> {
        self.push(Outbound::Request { account: account.to_string(), request }).await
    }

    async fn send_message(
        &self,
        account: &str,
        to: &str,
        body: String,
    ) -> Result<(), RuntimeError> {
        self.push(Outbound::Message { account: account.to_string(), to: to.to_string(), body })
            .await
    }

    async fn suppress_message(&self, account: &str, from: &str) -> Result<(), RuntimeError> {
        self.push(Outbound::Suppressed { account: account.to_string(), from: from.to_string() })
            .await
    }
}
