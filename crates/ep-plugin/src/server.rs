//! Workflow side of the plugin protocol
//!
//! [`serve_plugin_connection`] drives one plugin connection against a
//! [`WorkflowHandler`]. [`WorkflowListener`] accepts connections and serves
//! each on its own task.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use ep_protocol::{
    CompleteStatus, ConnectStatus, ErrorCode, FrameCodec, Message, ProtocolError, WorkflowData,
};

/// Answer to a plugin joining the workflow
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectOutcome {
    /// Workflow is already done
    Completed,
    /// Plugin may run on this snapshot
    Connected(WorkflowData),
}

/// Refusal sent back to the plugin as an error message
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub code: ErrorCode,
    pub message: String,
}

impl Rejection {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unknown_plugin(name: &str) -> Self {
        Self::new(ErrorCode::UnknownPlugin, format!("no plugin named {}", name))
    }
}

/// Workflow engine hooks
#[async_trait]
pub trait WorkflowHandler: Send + Sync {
    /// Plugin `name` wants to join. May wait until its inputs are ready.
    async fn plugin_connect(&self, name: &str) -> Result<ConnectOutcome, Rejection>;

    /// Plugin `name` finished. `plugin_data` is its private data and is
    /// only present on success.
    async fn plugin_complete(
        &self,
        name: &str,
        status: CompleteStatus,
        plugin_data: Option<Bytes>,
    ) -> Result<(), Rejection>;
}

/// Serve one plugin connection until the plugin completes or hangs up
pub async fn serve_plugin_connection<T>(
    stream: T,
    handler: &dyn WorkflowHandler,
) -> Result<(), ProtocolError>
where
    T: AsyncRead + AsyncWrite + Send + Unpin,
{
    let mut channel = Framed::new(stream, FrameCodec::new());

    while let Some(frame) = channel.next().await {
        let message = match frame {
            Ok(message) => message,
            Err(e) => {
                let code = match e {
                    ProtocolError::UnsupportedVersion(_) => ErrorCode::UnsupportedVersion,
                    _ => ErrorCode::InvalidMessage,
                };
                tracing::warn!(error = %e, "Rejecting malformed plugin frame");
                channel
                    .send(Message::Error {
                        code,
                        message: e.to_string(),
                    })
                    .await?;
                return Err(e);
            }
        };

        match message {
            Message::PluginConnect { name } => {
                tracing::debug!(plugin = %name, "Plugin connecting");
                let reply = match handler.plugin_connect(&name).await {
                    Ok(ConnectOutcome::Completed) => {
                        Message::connect_reply(ConnectStatus::Completed, WorkflowData::default())
                    }
                    Ok(ConnectOutcome::Connected(data)) => {
                        Message::connect_reply(ConnectStatus::Connected, data)
                    }
                    Err(rejection) => rejection_message(rejection),
                };
                channel.send(reply).await?;
            }
            Message::PluginComplete {
                name,
                status,
                workflow_data,
            } => {
                tracing::info!(plugin = %name, ?status, "Plugin reported completion");
                let reply = match handler
                    .plugin_complete(&name, status, workflow_data.plugin_data)
                    .await
                {
                    Ok(()) => Message::CompleteAck,
                    Err(rejection) => rejection_message(rejection),
                };
                channel.send(reply).await?;
                return Ok(());
            }
            other => {
                tracing::warn!(message_type = ?other.message_type(), "Unexpected message from plugin");
                channel
                    .send(Message::Error {
                        code: ErrorCode::InvalidMessage,
                        message: format!("unexpected {:?}", other.message_type()),
                    })
                    .await?;
            }
        }
    }

    tracing::debug!("Plugin closed connection");
    Ok(())
}

fn rejection_message(rejection: Rejection) -> Message {
    Message::Error {
        code: rejection.code,
        message: rejection.message,
    }
}

/// Accepts plugin connections
pub struct WorkflowListener {
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    handler: Arc<dyn WorkflowHandler>,
}

impl WorkflowListener {
    /// Serve over mutually authenticated TLS
    pub fn new(listener: TcpListener, tls: TlsAcceptor, handler: Arc<dyn WorkflowHandler>) -> Self {
        Self {
            listener,
            tls: Some(tls),
            handler,
        }
    }

    /// Serve without TLS. Only for loopback use.
    pub fn plaintext(listener: TcpListener, handler: Arc<dyn WorkflowHandler>) -> Self {
        Self {
            listener,
            tls: None,
            handler,
        }
    }

    /// Accept connections until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) -> std::io::Result<()> {
        tracing::info!(address = ?self.listener.local_addr().ok(), "Workflow listener started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Workflow listener shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted?;
                    let handler = Arc::clone(&self.handler);
                    let tls = self.tls.clone();

                    tokio::spawn(async move {
                        let result = match tls {
                            Some(acceptor) => match acceptor.accept(stream).await {
                                Ok(stream) => serve_plugin_connection(stream, handler.as_ref()).await,
                                Err(e) => {
                                    tracing::warn!(%peer, error = %e, "TLS handshake failed");
                                    return;
                                }
                            },
                            None => serve_plugin_connection(stream, handler.as_ref()).await,
                        };
                        if let Err(e) = result {
                            tracing::warn!(%peer, error = %e, "Plugin connection failed");
                        }
                    });
                }
            }
        }
    }
}
