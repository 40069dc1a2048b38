//! SSH node transport
//!
//! One SSH connection per node. Every command runs on its own session
//! channel, so several commands can run over the same connection at once.

use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Config, Handle};
use russh::{ChannelMsg, Disconnect};
use russh_keys::key::{KeyPair, PublicKey};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use ep_core::config::{NodeConfig, SshSettings};
use ep_core::traits::{AttachedIo, NodeTransport};
use ep_core::TransportError;

/// Verifies the node's host key against an optional fingerprint
struct HostKeyCheck {
    node: String,
    expected: Option<String>,
}

#[async_trait]
impl client::Handler for HostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint();
        match &self.expected {
            Some(expected) if *expected != fingerprint => {
                tracing::warn!(
                    node = %self.node,
                    expected = %expected,
                    actual = %fingerprint,
                    "Host key mismatch"
                );
                Ok(false)
            }
            _ => {
                tracing::debug!(node = %self.node, fingerprint = %fingerprint, "Host key accepted");
                Ok(true)
            }
        }
    }
}

/// Transport to one node over SSH
pub struct SshTransport {
    node: String,
    address: String,
    user: String,
    key: Arc<KeyPair>,
    host_key: Option<String>,
    connect_timeout: Duration,
    session: Mutex<Option<Arc<Handle<HostKeyCheck>>>>,
}

impl SshTransport {
    pub fn new(
        node: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        key: Arc<KeyPair>,
    ) -> Self {
        let node = node.into();
        let address = if node.contains(':') {
            format!("[{}]:{}", node, port)
        } else {
            format!("{}:{}", node, port)
        };
        Self {
            node,
            address,
            user: user.into(),
            key,
            host_key: None,
            connect_timeout: Duration::from_secs(30),
            session: Mutex::new(None),
        }
    }

    /// Reject the node unless its host key has this fingerprint
    pub fn with_host_key(mut self, fingerprint: impl Into<String>) -> Self {
        self.host_key = Some(fingerprint.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Transport for a configured node, falling back to the SSH defaults
    pub fn from_config(node: &NodeConfig, ssh: &SshSettings) -> Result<Self, TransportError> {
        let key_path = node
            .private_key_path
            .as_deref()
            .unwrap_or(&ssh.private_key_path);
        let key = load_key(&node.ip, key_path)?;

        let mut transport = Self::new(
            node.ip.clone(),
            node.port.unwrap_or(ssh.port),
            node.user.clone().unwrap_or_else(|| ssh.user.clone()),
            key,
        )
        .with_connect_timeout(ssh.connect_timeout);
        if let Some(fingerprint) = &node.host_key {
            transport = transport.with_host_key(fingerprint.clone());
        }
        Ok(transport)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn handle(&self) -> Result<Arc<Handle<HostKeyCheck>>, TransportError> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| TransportError::NotConnected(self.node.clone()))
    }

    fn exec_error(&self, reason: impl ToString) -> TransportError {
        TransportError::Exec {
            node: self.node.clone(),
            reason: reason.to_string(),
        }
    }
}

fn load_key(node: &str, path: &Path) -> Result<Arc<KeyPair>, TransportError> {
    russh_keys::load_secret_key(path, None)
        .map(Arc::new)
        .map_err(|e| TransportError::Connect {
            node: node.to_string(),
            reason: format!("failed to load key {}: {}", path.display(), e),
        })
}

/// Quote a word for the remote shell
fn shell_quote(word: &str) -> Cow<'_, str> {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@%+".contains(c));
    if plain {
        Cow::Borrowed(word)
    } else {
        Cow::Owned(format!("'{}'", word.replace('\'', r"'\''")))
    }
}

fn command_line(command: &[String]) -> String {
    command
        .iter()
        .map(|word| shell_quote(word))
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl NodeTransport for SshTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            return Ok(());
        }

        tracing::debug!(node = %self.node, address = %self.address, "Connecting");
        let handler = HostKeyCheck {
            node: self.node.clone(),
            expected: self.host_key.clone(),
        };
        let connect_error = |reason: String| TransportError::Connect {
            node: self.node.clone(),
            reason,
        };

        let mut handle = tokio::time::timeout(
            self.connect_timeout,
            client::connect(Arc::new(Config::default()), self.address.as_str(), handler),
        )
        .await
        .map_err(|_| connect_error(format!("timed out after {:?}", self.connect_timeout)))?
        .map_err(|e| connect_error(e.to_string()))?;

        let authenticated = handle
            .authenticate_publickey(&self.user, Arc::clone(&self.key))
            .await
            .map_err(|e| connect_error(format!("authentication error: {}", e)))?;
        if !authenticated {
            return Err(connect_error(format!(
                "public key rejected for user {}",
                self.user
            )));
        }

        tracing::info!(node = %self.node, user = %self.user, "Connected");
        *session = Some(Arc::new(handle));
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let Some(handle) = self.session.lock().await.take() else {
            return Ok(());
        };
        handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(|e| self.exec_error(format!("disconnect: {}", e)))?;
        tracing::debug!(node = %self.node, "Disconnected");
        Ok(())
    }

    async fn run_with_attached_io(
        &self,
        command: &[String],
        io: AttachedIo,
    ) -> Result<(), TransportError> {
        let handle = self.handle().await?;
        let line = command_line(command);
        tracing::debug!(node = %self.node, command = %line, "Running command");

        let mut channel = handle
            .channel_open_session()
            .await
            .map_err(|e| self.exec_error(e))?;
        if io.interactive {
            channel
                .request_pty(false, "xterm", 80, 24, 0, 0, &[])
                .await
                .map_err(|e| self.exec_error(e))?;
        }
        channel
            .exec(true, line.as_str())
            .await
            .map_err(|e| self.exec_error(e))?;

        let AttachedIo {
            stdin,
            mut stdout,
            mut stderr,
            ..
        } = io;

        let feed = match stdin {
            Some(reader) => Some((reader, Box::pin(channel.make_writer()))),
            None => {
                channel.eof().await.map_err(|e| self.exec_error(e))?;
                None
            }
        };

        let pump = async move {
            if let Some((reader, mut writer)) = feed {
                tokio::io::copy_buf(&mut BufReader::new(reader), &mut writer).await?;
                writer.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };

        // Output streams are owned here and dropped when the command ends
        let drain = async move {
            let mut exit_status = None;
            while let Some(message) = channel.wait().await {
                match message {
                    ChannelMsg::Data { ref data } => stdout.write_all(data).await?,
                    ChannelMsg::ExtendedData { ref data, ext: 1 } => {
                        stderr.write_all(data).await?
                    }
                    ChannelMsg::ExitStatus { exit_status: status } => exit_status = Some(status),
                    _ => {}
                }
            }
            stdout.flush().await?;
            stderr.flush().await?;
            Ok::<Option<u32>, std::io::Error>(exit_status)
        };
        tokio::pin!(drain);

        // Input may outlive the command (a terminal's stdin never ends);
        // the command finishing is what completes the call.
        let finished = tokio::select! {
            drained = &mut drain => Some(drained),
            pumped = pump => {
                if let Err(e) = pumped {
                    tracing::debug!(node = %self.node, error = %e, "Input stream ended with error");
                }
                None
            }
        };
        let drained = match finished {
            Some(drained) => drained,
            None => drain.await,
        };

        match drained? {
            Some(0) => Ok(()),
            Some(status) => Err(TransportError::ExitStatus {
                node: self.node.clone(),
                status,
            }),
            None => Err(self.exec_error("channel closed without exit status")),
        }
    }
}
