//! SSH client handler enforcing the configured host-key policy.

use crate::config::HostKeyPolicy;
use async_trait::async_trait;
use russh::client;
use russh_keys::key::PublicKey;
use thiserror::Error;
use tracing::{info, warn};

/// Errors raised while the SSH session is being set up.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Ssh(#[from] russh::Error),

    #[error("host key for {host}:{port} rejected: {reason}")]
    HostKeyRejected {
        host: String,
        port: u16,
        reason: String,
    },
}

/// russh client handler that checks the bastion's key against a policy.
pub struct TunnelClient {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
}

impl TunnelClient {
    pub fn new(host: impl Into<String>, port: u16, policy: HostKeyPolicy) -> Self {
        Self {
            host: host.into(),
            port,
            policy,
        }
    }

    fn reject(&self, reason: impl Into<String>) -> SessionError {
        SessionError::HostKeyRejected {
            host: self.host.clone(),
            port: self.port,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl client::Handler for TunnelClient {
    type Error = SessionError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint();

        match &self.policy {
            HostKeyPolicy::Insecure => {
                warn!(
                    "SECURITY WARNING: accepting SSH host key SHA256:{} for {} without verification",
                    fingerprint, self.host
                );
                Ok(true)
            }
            HostKeyPolicy::Fingerprint(expected) => {
                if fingerprint_matches(expected, &fingerprint) {
                    info!("SSH host key for {} matches pinned fingerprint", self.host);
                    Ok(true)
                } else {
                    Err(self.reject(format!(
                        "fingerprint SHA256:{} does not match pinned SHA256:{}",
                        fingerprint, expected
                    )))
                }
            }
            HostKeyPolicy::KnownHosts => {
                match russh_keys::check_known_hosts(&self.host, self.port, server_public_key) {
                    Ok(true) => Ok(true),
                    Ok(false) => Err(self.reject(format!(
                        "SHA256:{} is not in known_hosts (add it, pin it with \
                         host_key: fingerprint:<SHA256>, or use host_key: insecure)",
                        fingerprint
                    ))),
                    Err(e) => Err(self.reject(e.to_string())),
                }
            }
        }
    }
}

/// Compare fingerprints, ignoring an optional `SHA256:` prefix and base64 padding.
pub fn fingerprint_matches(expected: &str, actual: &str) -> bool {
    fn normalize(fp: &str) -> &str {
        let fp = fp.trim();
        fp.strip_prefix("SHA256:").unwrap_or(fp).trim_end_matches('=')
    }
    normalize(expected) == normalize(actual)
}
