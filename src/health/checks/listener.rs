//! Listener health checks

use std::fs;
use std::net::TcpListener;
use std::path::Path;

use anyhow::{Context, anyhow, bail};
use tracing::debug;

use crate::config::ListenerConfig;
use crate::health::{Ctx, test, warn};

/// Holds bound listeners and closes them all when dropped
#[derive(Debug, Default)]
pub struct ListenerSet {
    listeners: Vec<TcpListener>,
}

impl ListenerSet {
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl Drop for ListenerSet {
    fn drop(&mut self) {
        for listener in self.listeners.drain(..) {
            if let Ok(addr) = listener.local_addr() {
                debug!(%addr, "Closing listener");
            }
        }
    }
}

/// Binds every configured tcp listener
pub fn create_listeners(configs: &[ListenerConfig]) -> anyhow::Result<ListenerSet> {
    let mut set = ListenerSet::default();
    for config in configs {
        if config.kind != "tcp" {
            bail!("unsupported listener type {:?}", config.kind);
        }
        let listener = TcpListener::bind(&config.address)
            .with_context(|| format!("error initializing listener on {}", config.address))?;
        set.listeners.push(listener);
    }
    Ok(set)
}

/// Validates the TLS settings of each listener, warning on weak ones
pub fn check_listener_tls(ctx: &Ctx, configs: &[ListenerConfig]) -> anyhow::Result<()> {
    for config in configs {
        if config.tls_disable {
            warn(
                ctx,
                format!("TLS is disabled in the listener on {}", config.address),
            );
            continue;
        }
        if !config.tls_require_and_verify_client_cert {
            warn(
                ctx,
                format!(
                    "TLS for the listener on {} is turned on without requiring client certs",
                    config.address
                ),
            );
        }

        let cert = config
            .tls_cert_file
            .as_deref()
            .ok_or_else(|| anyhow!("listener on {} has no tls_cert_file", config.address))?;
        let key = config
            .tls_key_file
            .as_deref()
            .ok_or_else(|| anyhow!("listener on {} has no tls_key_file", config.address))?;
        check_pem(cert, "CERTIFICATE")?;
        check_pem(key, "PRIVATE KEY")?;
    }
    Ok(())
}

fn check_pem(path: &Path, label: &str) -> anyhow::Result<()> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let found = text.lines().any(|line| {
        line.strip_prefix("-----BEGIN ")
            .and_then(|rest| rest.strip_suffix("-----"))
            .is_some_and(|kind| kind.ends_with(label))
    });
    if !found {
        bail!("{} does not contain a PEM {}", path.display(), label);
    }
    Ok(())
}

/// Runs the `listener` stage body
pub fn diagnose_listeners(ctx: &Ctx, configs: &[ListenerConfig]) -> anyhow::Result<()> {
    if configs.is_empty() {
        bail!("no listener stanza found in config");
    }

    let mut listeners = None;
    let _ = test(ctx, "create-listeners", |_| {
        listeners = Some(create_listeners(configs)?);
        Ok(())
    });
    let _ = test(ctx, "check-listener-tls", |ctx| check_listener_tls(ctx, configs));

    drop(listeners);
    Ok(())
}
