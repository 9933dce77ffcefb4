//! HTTP health probe backed by `ureq`.

use std::time::Duration;

use anyhow::{Context, Result};

use crate::application::ports::HttpProbe;

const USER_AGENT: &str = concat!("shipyard/", env!("CARGO_PKG_VERSION"));

/// Blocking `ureq` GET moved onto the blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct UreqProbe;

impl HttpProbe for UreqProbe {
    async fn get_status(&self, url: &str, timeout: Duration) -> Result<u16> {
        let url = url.to_string();
        tokio::task::spawn_blocking(move || {
            let agent = ureq::AgentBuilder::new().timeout(timeout).build();
            match agent.get(&url).set("User-Agent", USER_AGENT).call() {
                Ok(resp) => Ok(resp.status()),
                Err(ureq::Error::Status(code, _)) => Ok(code),
                Err(e) => Err(anyhow::anyhow!("GET {url} failed: {e}")),
            }
        })
        .await
        .context("spawn_blocking for health probe")?
    }
}
