//! SSH tunnel to a PostgreSQL server behind a bastion host.
//!
//! A [`Tunnel`] owns one authenticated SSH session and a loopback listener.
//! Every connection accepted on the listener gets its own `direct-tcpip`
//! channel to the database host, so the PostgreSQL driver can connect to
//! `127.0.0.1:<local_port>` as if the database were local.

mod host_key;
mod relay;

pub use host_key::{fingerprint_matches, SessionError, TunnelClient};
pub use relay::{AsyncStream, ChannelOpener, Forwarder, TunnelStream};

use crate::config::SshConfig;
use crate::error::{MigrateError, Result};
use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::Disconnect;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Opens `direct-tcpip` channels on an authenticated SSH session.
struct SshChannelOpener {
    handle: Handle<TunnelClient>,
    target_host: String,
    target_port: u16,
}

#[async_trait]
impl ChannelOpener for SshChannelOpener {
    async fn open(&self, peer: SocketAddr) -> Result<TunnelStream> {
        let channel = self
            .handle
            .channel_open_direct_tcpip(
                self.target_host.clone(),
                u32::from(self.target_port),
                peer.ip().to_string(),
                u32::from(peer.port()),
            )
            .await
            .map_err(|e| {
                MigrateError::tunnel(
                    e,
                    format!(
                        "opening channel to {}:{}",
                        self.target_host, self.target_port
                    ),
                )
            })?;

        debug!(
            "Opened tunnel channel for {} to {}:{}",
            peer, self.target_host, self.target_port
        );
        Ok(Box::pin(channel.into_stream()))
    }
}

/// An established SSH tunnel.
pub struct Tunnel {
    session: Arc<SshChannelOpener>,
    forwarder: Forwarder,
}

impl Tunnel {
    /// Authenticate to the bastion and start forwarding a local port to
    /// `target_host:target_port` as seen from the bastion.
    pub async fn establish(ssh: &SshConfig, target_host: &str, target_port: u16) -> Result<Self> {
        let key_path = ssh
            .key_path
            .as_deref()
            .ok_or_else(|| MigrateError::Config("SSH tunnel requires a key path".into()))?;
        let key = load_key(key_path, ssh.key_passphrase.as_deref())?;

        let client = TunnelClient::new(&ssh.host, ssh.port, ssh.host_key.clone());
        let config = Arc::new(client::Config::default());

        let mut handle = client::connect(config, (ssh.host.as_str(), ssh.port), client)
            .await
            .map_err(|e| {
                MigrateError::tunnel(e, format!("connecting to SSH host {}:{}", ssh.host, ssh.port))
            })?;

        let authenticated = handle
            .authenticate_publickey(&ssh.user, Arc::new(key))
            .await
            .map_err(|e| MigrateError::tunnel(e, format!("authenticating as {}", ssh.user)))?;
        if !authenticated {
            return Err(MigrateError::tunnel(
                "public key authentication rejected",
                format!("authenticating as {}@{}", ssh.user, ssh.host),
            ));
        }

        let session = Arc::new(SshChannelOpener {
            handle,
            target_host: target_host.to_string(),
            target_port,
        });
        let forwarder = match Forwarder::bind(session.clone()).await {
            Ok(forwarder) => forwarder,
            Err(e) => {
                disconnect(&session.handle).await;
                return Err(e);
            }
        };

        info!(
            "SSH tunnel established: {} -> {}@{}:{} -> {}:{}",
            forwarder.local_addr(),
            ssh.user,
            ssh.host,
            ssh.port,
            target_host,
            target_port
        );

        Ok(Self { session, forwarder })
    }

    /// Loopback address the tunnel listens on.
    pub fn local_addr(&self) -> SocketAddr {
        self.forwarder.local_addr()
    }

    /// Loopback port the tunnel listens on.
    pub fn local_port(&self) -> u16 {
        self.forwarder.local_addr().port()
    }

    /// Stop the listener, then end the SSH session.
    pub async fn close(self) {
        self.forwarder.shutdown().await;
        disconnect(&self.session.handle).await;
        info!("SSH tunnel closed");
    }
}

fn load_key(path: &Path, passphrase: Option<&str>) -> Result<russh_keys::key::KeyPair> {
    if !path.exists() {
        return Err(MigrateError::tunnel(
            format!("key file {} not found", path.display()),
            "loading SSH private key",
        ));
    }
    russh_keys::load_secret_key(path, passphrase).map_err(|e| {
        MigrateError::tunnel(e, format!("loading SSH private key {}", path.display()))
    })
}

async fn disconnect(handle: &Handle<TunnelClient>) {
    if let Err(e) = handle
        .disconnect(Disconnect::ByApplication, "", "English")
        .await
    {
        warn!("Error disconnecting SSH session: {}", e);
    }
}
