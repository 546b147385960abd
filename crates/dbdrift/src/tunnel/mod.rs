//! Local-port forwarder boundary used by the adapters.
//!
//! When a connection carries an SSH proxy, the adapter never dials the remote
//! host directly: it connects to a loopback listener owned by a [`Tunnel`],
//! and tears the tunnel down through [`Tunnel::stop`] on close. The forwarder
//! relays accepted connections to the remote endpoint; the SSH hop itself is
//! an external collaborator behind this boundary.

use std::fmt;

use tokio::io::copy_bidirectional;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SshProxy;
use crate::error::{DriftError, Result};

/// A host/port pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A running local forwarder.
///
/// Owns one listener task plus a relay task per accepted connection; all of
/// them observe the done-signal and unwind when [`stop`](Tunnel::stop) fires.
pub struct Tunnel {
    local: Endpoint,
    remote: Endpoint,
    done: CancellationToken,
}

impl Tunnel {
    /// Validate the proxy description, bind a loopback listener, and start
    /// forwarding. Returns the tunnel; the adapter connects to
    /// [`local`](Tunnel::local) instead of the remote endpoint.
    pub async fn open(proxy: &SshProxy, remote: Endpoint) -> Result<Tunnel> {
        validate_proxy(proxy)?;

        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let local_addr = listener.local_addr()?;
        let local = Endpoint::new("127.0.0.1", local_addr.port());
        info!(
            "tunnel listening on {} for {} via {}:{}",
            local, remote, proxy.host, proxy.port
        );

        let done = CancellationToken::new();
        let accept_done = done.clone();
        let accept_remote = remote.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = accept_done.cancelled() => {
                        debug!("tunnel listener shutting down");
                        break;
                    }
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((conn, peer)) => {
                                debug!("tunnel accepted connection from {}", peer);
                                let remote = accept_remote.clone();
                                let done = accept_done.clone();
                                tokio::spawn(forward(conn, remote, done));
                            }
                            Err(e) => {
                                warn!("tunnel accept failed: {}", e);
                            }
                        }
                    }
                }
            }
        });

        Ok(Tunnel {
            local,
            remote,
            done,
        })
    }

    /// The loopback endpoint the adapter should connect to.
    pub fn local(&self) -> &Endpoint {
        &self.local
    }

    /// The remote endpoint traffic is relayed to.
    pub fn remote(&self) -> &Endpoint {
        &self.remote
    }

    /// Release hook: signals the listener and every relay to stop.
    pub fn stop(&self) {
        debug!("stopping tunnel on {}", self.local);
        self.done.cancel();
    }
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        self.done.cancel();
    }
}

async fn forward(mut local_conn: TcpStream, remote: Endpoint, done: CancellationToken) {
    let mut remote_conn = match TcpStream::connect((remote.host.as_str(), remote.port)).await {
        Ok(conn) => conn,
        Err(e) => {
            warn!("tunnel failed to reach {}: {}", remote, e);
            return;
        }
    };

    tokio::select! {
        _ = done.cancelled() => {
            debug!("tunnel relay to {} interrupted by shutdown", remote);
        }
        result = copy_bidirectional(&mut local_conn, &mut remote_conn) => {
            match result {
                Ok((up, down)) => debug!("tunnel relay to {} closed ({}B up, {}B down)", remote, up, down),
                Err(e) => debug!("tunnel relay to {} ended: {}", remote, e),
            }
        }
    }
}

fn validate_proxy(proxy: &SshProxy) -> Result<()> {
    match proxy.auth_type.as_str() {
        "pass" => Ok(()),
        "rsa" => {
            if proxy.rsa_key.is_empty() && proxy.rsa_key_path.is_empty() {
                Err(DriftError::Tunnel("no RSA key provided".to_string()))
            } else {
                Ok(())
            }
        }
        other => Err(DriftError::Tunnel(format!(
            "unsupported auth type: {}",
            other
        ))),
    }
}
