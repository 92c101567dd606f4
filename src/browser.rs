// src/browser.rs
//! Browser session plumbing. One session is owned by the orchestrator and
//! passed explicitly into every component that touches a page.

use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use std::path::Path;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info, warn};

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// A running headless browser plus its CDP event pump.
pub struct BrowserSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

impl BrowserSession {
    /// Launch a headless Chrome with automation markers disabled.
    pub async fn launch() -> Result<Self> {
        let config = BrowserConfig::builder()
            .arg(format!("--user-agent={}", USER_AGENT))
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build browser config: {}", e))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;

        let handler_task = tokio::task::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler event error: {}", e);
                }
            }
        });

        info!("Browser session started");
        Ok(Self {
            browser,
            handler_task,
        })
    }

    /// Open a fresh page. The caller is responsible for closing it on every
    /// path, including errors.
    pub async fn new_page(&self) -> Result<Page> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("Failed to open new page")?;

        // Hide the webdriver flag before any site script runs.
        let _ = page
            .evaluate("Object.defineProperty(navigator, 'webdriver', {get: () => undefined})")
            .await;

        Ok(page)
    }

    pub async fn close(mut self) -> Result<()> {
        self.browser.close().await.context("Failed to close browser")?;
        self.handler_task.abort();
        info!("Browser session closed");
        Ok(())
    }
}

/// Poll for a selector until it appears or the timeout elapses.
pub async fn wait_for_selector(page: &Page, selector: &str, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        if page.find_element(selector).await.is_ok() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            anyhow::bail!("Timed out waiting for selector: {}", selector);
        }
        sleep(Duration::from_millis(250)).await;
    }
}

/// Wait until the page stops mutating (or the ceiling is hit). Used after
/// navigation clicks where no target selector is known up front.
pub async fn wait_for_settle(page: &Page, quiet_ms: u64, max_ms: u64) -> Result<()> {
    let js = format!(
        r#"() => new Promise(resolve => {{
            let lastChange = Date.now();
            const start = Date.now();
            const obs = new MutationObserver(() => {{ lastChange = Date.now(); }});
            obs.observe(document.body, {{ childList: true, subtree: true, characterData: true }});
            const check = setInterval(() => {{
                const now = Date.now();
                if (now - lastChange > {quiet} || now - start > {max}) {{
                    clearInterval(check);
                    obs.disconnect();
                    resolve(true);
                }}
            }}, 250);
        }})"#,
        quiet = quiet_ms,
        max = max_ms
    );
    page.evaluate(js.as_str())
        .await
        .context("Settle wait failed")?;
    Ok(())
}

/// Capture a forensic screenshot. Best effort: a screenshot failure is
/// logged and swallowed, never surfaced to the caller.
pub async fn capture_screenshot(page: &Page, path: &Path) -> Option<String> {
    if let Some(parent) = path.parent() {
        let _ = tokio::fs::create_dir_all(parent).await;
    }
    match page
        .save_screenshot(CaptureScreenshotParams::default(), path)
        .await
    {
        Ok(_) => {
            info!("Screenshot saved to {}", path.display());
            Some(path.display().to_string())
        }
        Err(e) => {
            warn!("Failed to capture screenshot {}: {}", path.display(), e);
            None
        }
    }
}

/// Persist the page's cookies to a JSON jar so later runs can skip login.
pub async fn save_cookies(page: &Page, jar_path: &Path) -> Result<()> {
    let cookies = page.get_cookies().await.context("Failed to read cookies")?;

    let params: Vec<CookieParam> = cookies
        .into_iter()
        .filter_map(|c| {
            CookieParam::builder()
                .name(c.name)
                .value(c.value)
                .domain(c.domain)
                .path(c.path)
                .secure(c.secure)
                .http_only(c.http_only)
                .build()
                .ok()
        })
        .collect();

    let json = serde_json::to_string(&params).context("Failed to serialize cookie jar")?;
    if let Some(parent) = jar_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }
    tokio::fs::write(jar_path, json)
        .await
        .with_context(|| format!("Failed to write cookie jar: {}", jar_path.display()))?;
    info!("Saved session cookies to {}", jar_path.display());
    Ok(())
}

/// Restore cookies from a previous run. Returns false when no jar exists or
/// it cannot be read; an unreadable jar is not fatal.
pub async fn restore_cookies(page: &Page, jar_path: &Path) -> bool {
    let json = match tokio::fs::read_to_string(jar_path).await {
        Ok(content) => content,
        Err(_) => return false,
    };

    let params: Vec<CookieParam> = match serde_json::from_str(&json) {
        Ok(params) => params,
        Err(e) => {
            warn!("Ignoring corrupt cookie jar {}: {}", jar_path.display(), e);
            return false;
        }
    };

    if params.is_empty() {
        return false;
    }

    match page.set_cookies(params).await {
        Ok(_) => {
            info!("Restored session cookies from {}", jar_path.display());
            true
        }
        Err(e) => {
            warn!("Failed to restore cookies: {}", e);
            false
        }
    }
}
