//! Login cookie injection.

use std::path::Path;

use anyhow::{Context, Result};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::Page;
use tracing::{debug, warn};

/// Load cookies from a JSON array (browser-extension export format) into the page.
pub async fn load_cookies(page: &Page, path: &Path) -> Result<usize> {
    debug!("Loading cookies from {}", path.display());

    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read cookies file {}", path.display()))?;
    let cookies: Vec<serde_json::Value> =
        serde_json::from_str(&content).context("Cookies file must be a JSON array")?;

    let mut loaded = 0;
    for cookie in cookies {
        let field = |key: &str| cookie.get(key).and_then(|v| v.as_str()).unwrap_or_default();
        let name = cookie
            .get("name")
            .or_else(|| cookie.get("key"))
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let (value, domain) = (field("value"), field("domain"));

        if name.is_empty() || domain.is_empty() {
            continue;
        }

        match CookieParam::builder()
            .name(name)
            .value(value)
            .domain(domain)
            .build()
        {
            Ok(param) => match page.set_cookie(param).await {
                Ok(_) => loaded += 1,
                Err(e) => warn!("Failed to set cookie {}: {}", name, e),
            },
            Err(e) => warn!("Failed to build cookie {}: {}", name, e),
        }
    }

    debug!("Loaded {} cookies", loaded);
    Ok(loaded)
}
