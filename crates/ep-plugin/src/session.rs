//! Plugin session lifecycle
//!
//! ```text
//! PluginSession --connect()--> ConnectedSession --complete()--> (channel released)
//! ```
//!
//! `connect` consumes the unconnected session and `complete` consumes the
//! connected one, so completing before connecting or completing twice does
//! not compile. The channel is owned by [`ConnectedSession`] and is closed
//! when `complete` returns, whatever the outcome. A connected session that
//! is dropped without completing closes its channel as well.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::time::timeout;
use tokio_util::codec::Framed;

use ep_core::config::PluginConfig;
use ep_core::SchemaData;
use ep_protocol::{CompleteStatus, ConnectStatus, FrameCodec, Message, WorkflowData};

use crate::dialer::{BoxedStream, Dialer};
use crate::error::SessionError;

type Channel = Framed<BoxedStream, FrameCodec>;

const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(3600);

/// A plugin that has not joined its workflow yet.
///
/// `S` holds the shared workflow data, `P` the plugin's private data.
pub struct PluginSession<S, P> {
    name: String,
    shared: S,
    private: Option<P>,
    dialer: Arc<dyn Dialer>,
    dial_timeout: Duration,
    handshake_timeout: Duration,
}

impl<S: SchemaData, P: SchemaData> PluginSession<S, P> {
    /// Create a session for plugin `name`
    pub fn new(
        name: impl Into<String>,
        shared: S,
        private: Option<P>,
        dialer: Arc<dyn Dialer>,
    ) -> Self {
        Self {
            name: name.into(),
            shared,
            private,
            dialer,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Override the dial and handshake bounds
    pub fn with_timeouts(mut self, dial: Duration, handshake: Duration) -> Self {
        self.dial_timeout = dial;
        self.handshake_timeout = handshake;
        self
    }

    /// Apply the bounds from a plugin config
    pub fn with_config(self, config: &PluginConfig) -> Self {
        self.with_timeouts(config.dial_timeout, config.handshake_timeout)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Join the workflow served at `address`.
    ///
    /// On success the session is either finished (the workflow is already
    /// done and no data was loaded) or holds the shared data snapshot and,
    /// when the server sent one, the private data. On failure the channel
    /// has been released.
    pub async fn connect(mut self, address: &str) -> Result<ConnectedSession<S, P>, SessionError> {
        tracing::debug!(plugin = %self.name, address, "Dialing workflow server");

        let stream = match timeout(self.dial_timeout, self.dialer.dial(address)).await {
            Ok(stream) => stream?,
            Err(_) => {
                return Err(SessionError::Transport(format!(
                    "dial {} timed out after {:?}",
                    address, self.dial_timeout
                )))
            }
        };
        let mut channel = Framed::new(stream, FrameCodec::new());

        let reply = timeout(self.handshake_timeout, handshake(&mut channel, &self.name))
            .await
            .map_err(|_| SessionError::Timeout(self.handshake_timeout))??;

        let finished = match reply {
            Message::ConnectReply {
                status,
                workflow_data,
            } => match ConnectStatus::from_code(status) {
                Some(ConnectStatus::Completed) => true,
                Some(ConnectStatus::Connected) => {
                    self.load(workflow_data)?;
                    false
                }
                None => {
                    return Err(SessionError::Protocol(format!(
                        "unknown connect status {}",
                        status
                    )))
                }
            },
            Message::Error { code, message } => {
                return Err(SessionError::Protocol(format!(
                    "server rejected connect ({:?}): {}",
                    code, message
                )))
            }
            other => {
                return Err(SessionError::Protocol(format!(
                    "expected connect reply, got {:?}",
                    other.message_type()
                )))
            }
        };

        if finished {
            tracing::info!(plugin = %self.name, "Workflow already completed");
        } else {
            tracing::info!(plugin = %self.name, "Connected to workflow");
        }

        Ok(ConnectedSession {
            name: self.name,
            channel,
            shared: self.shared,
            private: self.private,
            finished,
            complete_timeout: self.dial_timeout,
        })
    }

    fn load(&mut self, workflow_data: WorkflowData) -> Result<(), SessionError> {
        if let (Some(private), Some(bytes)) = (self.private.as_mut(), workflow_data.plugin_data) {
            private
                .unmarshal_binary(&bytes)
                .map_err(SessionError::PrivateDataCorrupt)?;
        }

        // No snapshot yet: the caller's defaults stand
        let Some(shared) = workflow_data.data else {
            tracing::debug!(plugin = %self.name, "Connected reply carries no shared data");
            return Ok(());
        };
        self.shared
            .unmarshal_binary(&shared)
            .map_err(SessionError::SharedDataCorrupt)
    }
}

async fn handshake(channel: &mut Channel, name: &str) -> Result<Message, SessionError> {
    channel
        .send(Message::PluginConnect {
            name: name.to_string(),
        })
        .await?;

    match channel.next().await {
        Some(reply) => Ok(reply?),
        None => Err(SessionError::Transport(
            "connection closed before connect reply".to_string(),
        )),
    }
}

/// A plugin that has joined its workflow
pub struct ConnectedSession<S, P> {
    name: String,
    channel: Channel,
    shared: S,
    private: Option<P>,
    finished: bool,
    complete_timeout: Duration,
}

impl<S: SchemaData, P: SchemaData> ConnectedSession<S, P> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The workflow was already complete when the plugin connected.
    /// Plugin logic should not run.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn shared(&self) -> &S {
        &self.shared
    }

    pub fn shared_mut(&mut self) -> &mut S {
        &mut self.shared
    }

    pub fn private(&self) -> Option<&P> {
        self.private.as_ref()
    }

    pub fn private_mut(&mut self) -> Option<&mut P> {
        self.private.as_mut()
    }

    /// Shared data for reading alongside private data for writing
    pub fn split_mut(&mut self) -> (&S, Option<&mut P>) {
        (&self.shared, self.private.as_mut())
    }

    /// Report the plugin outcome and release the channel.
    ///
    /// `failure` is the plugin's own error, if any. On failure the private
    /// data is not serialized and only an error status is reported. A
    /// finished session has nothing to report and only releases the
    /// channel.
    pub async fn complete(
        self,
        failure: Option<&(dyn fmt::Display + Sync)>,
    ) -> Result<(), SessionError> {
        let ConnectedSession {
            name,
            mut channel,
            private,
            finished,
            complete_timeout,
            ..
        } = self;

        let result = if finished {
            tracing::debug!(plugin = %name, "Workflow finished, nothing to report");
            Ok(())
        } else {
            let outcome = encode_outcome(&name, private.as_ref(), failure);
            match outcome {
                Ok((status, workflow_data)) => {
                    report(&mut channel, &name, status, workflow_data, complete_timeout).await
                }
                Err(e) => Err(e),
            }
        };

        if let Err(e) = channel.close().await {
            tracing::debug!(plugin = %name, error = %e, "Error closing workflow channel");
        }
        drop(channel);

        match &result {
            Ok(()) => tracing::info!(plugin = %name, "Plugin completed"),
            Err(e) => tracing::warn!(plugin = %name, error = %e, "Plugin complete failed"),
        }
        result
    }
}

/// Status and payload to report. Private data is only encoded on success.
fn encode_outcome<P: SchemaData>(
    name: &str,
    private: Option<&P>,
    failure: Option<&(dyn fmt::Display + Sync)>,
) -> Result<(CompleteStatus, WorkflowData), SessionError> {
    let mut workflow_data = WorkflowData::default();
    if let Some(err) = failure {
        tracing::warn!(plugin = %name, error = %err, "Reporting plugin failure");
        return Ok((CompleteStatus::Error, workflow_data));
    }
    if let Some(private) = private {
        let bytes = private
            .marshal_binary()
            .map_err(SessionError::PrivateDataEncode)?;
        workflow_data.plugin_data = Some(Bytes::from(bytes));
    }
    Ok((CompleteStatus::Success, workflow_data))
}

async fn report(
    channel: &mut Channel,
    name: &str,
    status: CompleteStatus,
    workflow_data: WorkflowData,
    bound: Duration,
) -> Result<(), SessionError> {
    let exchange = async {
        channel
            .send(Message::PluginComplete {
                name: name.to_string(),
                status,
                workflow_data,
            })
            .await
            .map_err(|e| SessionError::Complete(e.to_string()))?;

        match channel.next().await {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(e)) => Err(SessionError::Complete(e.to_string())),
            None => Err(SessionError::Complete(
                "connection closed before acknowledgment".to_string(),
            )),
        }
    };

    match timeout(bound, exchange).await {
        Err(_) => Err(SessionError::Complete(format!(
            "no acknowledgment within {:?}",
            bound
        ))),
        Ok(Err(e)) => Err(e),
        Ok(Ok(Message::CompleteAck)) => Ok(()),
        Ok(Ok(Message::Error { code, message })) => Err(SessionError::Complete(format!(
            "server rejected completion ({:?}): {}",
            code, message
        ))),
        Ok(Ok(other)) => Err(SessionError::Protocol(format!(
            "expected complete acknowledgment, got {:?}",
            other.message_type()
        ))),
    }
}
