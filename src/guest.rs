//! Guest-side collaborators: the communicator readiness probe and the
//! provisioning and folder-sync hooks.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;

const SSH_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Where the guest's SSH endpoint can be reached.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SshInfo {
    /// Host name or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

/// Errors raised by guest collaborators.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{message}")]
pub struct GuestError {
    /// Human-readable error message.
    pub message: String,
}

impl GuestError {
    /// Wraps a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Future returned by guest collaborators.
pub type GuestFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, GuestError>> + Send + 'a>>;

/// Reports whether the guest accepts connections.
pub trait Communicator: Send + Sync {
    /// Probes the guest once.
    fn ready<'a>(&'a self, ssh: &'a SshInfo) -> GuestFuture<'a, bool>;
}

/// Considers the guest ready once its SSH port accepts a TCP connection.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpProbe;

impl Communicator for TcpProbe {
    fn ready<'a>(&'a self, ssh: &'a SshInfo) -> GuestFuture<'a, bool> {
        Box::pin(async move {
            let connect = timeout(
                SSH_CONNECT_TIMEOUT,
                TcpStream::connect((ssh.host.as_str(), ssh.port)),
            )
            .await;
            let ready = matches!(connect, Ok(Ok(_)));
            tracing::trace!(host = %ssh.host, port = ssh.port, ready, "probed guest");
            Ok(ready)
        })
    }
}

/// Guest work run once the instance is up.
pub trait GuestHooks: Send + Sync {
    /// Runs configured provisioners on the guest.
    fn provision<'a>(&'a self, machine: &'a str, ssh: Option<&'a SshInfo>) -> GuestFuture<'a, ()>;

    /// Synchronises shared folders to the guest.
    fn sync_folders<'a>(
        &'a self,
        machine: &'a str,
        ssh: Option<&'a SshInfo>,
    ) -> GuestFuture<'a, ()>;
}

/// Hooks that do nothing; the binary uses these until guest tooling is
/// configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoGuestHooks;

impl GuestHooks for NoGuestHooks {
    fn provision<'a>(&'a self, machine: &'a str, _ssh: Option<&'a SshInfo>) -> GuestFuture<'a, ()> {
        Box::pin(async move {
            tracing::debug!(machine, "no provisioners configured");
            Ok(())
        })
    }

    fn sync_folders<'a>(
        &'a self,
        machine: &'a str,
        _ssh: Option<&'a SshInfo>,
    ) -> GuestFuture<'a, ()> {
        Box::pin(async move {
            tracing::debug!(machine, "no synced folders configured");
            Ok(())
        })
    }
}
