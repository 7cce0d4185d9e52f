//! Redirect and cluster address checks

use anyhow::{Context, anyhow, bail};
use url::Url;

use crate::config::ServerConfig;

/// Parses an advertised address, accepting a bare `host:port` as http
pub fn parse_address(address: &str) -> anyhow::Result<Url> {
    let candidate = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{address}")
    };

    let url = Url::parse(&candidate).with_context(|| format!("invalid address {address:?}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("address {address:?} must use http or https");
    }
    if url.host_str().is_none_or(str::is_empty) {
        bail!("address {address:?} has no host");
    }
    Ok(url)
}

/// Validates `api_addr`, returning a description of what will be advertised
pub fn determine_redirect(config: &ServerConfig) -> anyhow::Result<String> {
    match config.api_addr.as_deref() {
        Some(addr) => {
            let url = parse_address(addr)?;
            Ok(format!("redirect address: {url}"))
        }
        None => Ok("no api_addr configured; the redirect address is detected at startup".into()),
    }
}

/// Validates `cluster_addr`, deriving it from `api_addr` when absent
pub fn find_cluster_addr(config: &ServerConfig) -> anyhow::Result<String> {
    if config.disable_clustering {
        return Ok("clustering is disabled".into());
    }

    if let Some(addr) = config.cluster_addr.as_deref() {
        let url = parse_address(addr)?;
        if url.scheme() != "https" {
            bail!("cluster address {addr:?} must use https");
        }
        return Ok(format!("cluster address: {url}"));
    }

    let Some(api_addr) = config.api_addr.as_deref() else {
        return Ok("no cluster_addr configured; it is detected at startup".into());
    };

    let mut url = parse_address(api_addr)?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| anyhow!("cannot determine port of api_addr {api_addr:?}"))?;
    let cluster_port = port
        .checked_add(1)
        .ok_or_else(|| anyhow!("api_addr port {port} leaves no room for a cluster port"))?;
    url.set_scheme("https")
        .map_err(|()| anyhow!("cannot derive cluster address from {api_addr:?}"))?;
    url.set_port(Some(cluster_port))
        .map_err(|()| anyhow!("cannot derive cluster address from {api_addr:?}"))?;
    Ok(format!("cluster address derived from api_addr: {url}"))
}
