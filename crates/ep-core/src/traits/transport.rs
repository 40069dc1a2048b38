//! Node transport trait

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::TransportError;

/// Owned, type-erased input stream
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Owned, type-erased output stream
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Streams attached to one remote command.
///
/// The transport takes ownership of every stream and drops them when the
/// command returns. Callers rely on that: dropping the write half of a
/// stream bridge is what tells the consumer on the other side that the
/// input has ended.
pub struct AttachedIo {
    /// Fed to the remote command's stdin, then closed
    pub stdin: Option<BoxedReader>,
    /// Receives the remote command's stdout
    pub stdout: BoxedWriter,
    /// Receives the remote command's stderr
    pub stderr: BoxedWriter,
    /// Request a terminal for the command
    pub interactive: bool,
}

impl AttachedIo {
    /// Attach the command to arbitrary output streams, no input
    pub fn new(stdout: BoxedWriter, stderr: BoxedWriter) -> Self {
        Self {
            stdin: None,
            stdout,
            stderr,
            interactive: false,
        }
    }

    /// Attach to this process's own stdout and stderr.
    ///
    /// Interactive invocations also get this process's stdin. Every handle
    /// reads the same terminal, so attach at most one interactive command
    /// at a time. A pending stdin read can hold up runtime shutdown until
    /// the next line arrives.
    pub fn process(interactive: bool) -> Self {
        let stdin: Option<BoxedReader> = if interactive {
            Some(Box::new(tokio::io::stdin()))
        } else {
            None
        };
        Self {
            stdin,
            stdout: Box::new(tokio::io::stdout()),
            stderr: Box::new(tokio::io::stderr()),
            interactive,
        }
    }

    /// Feed the command from the given reader
    pub fn with_stdin(mut self, stdin: BoxedReader) -> Self {
        self.stdin = Some(stdin);
        self
    }
}

/// Connection to one remote node.
///
/// A transport may be asked to run several commands at once (the bootstrap
/// node serves every pair of a stream bridge), so implementations must
/// accept concurrent `run_with_attached_io` calls once connected.
/// `connect` on an already connected transport is a no-op.
#[async_trait]
pub trait NodeTransport: Send + Sync {
    /// Open the connection
    async fn connect(&self) -> Result<(), TransportError>;

    /// Close the connection
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Run a command with the given streams attached.
    ///
    /// Returns once the remote command has exited and its output has been
    /// written out. A non-zero exit is an error.
    async fn run_with_attached_io(
        &self,
        command: &[String],
        io: AttachedIo,
    ) -> Result<(), TransportError>;
}
