//! Playwright browser automation
//!
//! Each page is backed by a long-lived `node` process running a generated
//! bridge script. Requests go to the bridge as one JSON object per line on
//! stdin; the bridge answers each with one JSON line on stdout.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::page::{Locator, Page, PageFactory, WaitState};

/// Extra time allowed on top of a command's own timeout before the bridge is
/// considered unresponsive.
const REPLY_GRACE: Duration = Duration::from_secs(5);

const SCREENSHOT_TIMEOUT: Duration = Duration::from_secs(30);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl FromStr for Browser {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" => Ok(Browser::Webkit),
            other => Err(E2eError::Config(format!("unknown browser: {}", other))),
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// `node` executable
    pub node_binary: PathBuf,
    /// Directory whose `node_modules` provides `playwright`
    pub project_dir: PathBuf,
    /// Budget for browser launch
    pub launch_timeout_ms: u64,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            node_binary: PathBuf::from("node"),
            project_dir: PathBuf::from("."),
            launch_timeout_ms: 30_000,
        }
    }
}

/// Launches one Playwright-backed page per row
pub struct PlaywrightLauncher {
    config: PlaywrightConfig,
    script_path: PathBuf,
    _script_dir: TempDir,
}

impl PlaywrightLauncher {
    /// Verify Playwright is installed and write the bridge script.
    pub fn new(config: PlaywrightConfig) -> E2eResult<Self> {
        Self::check_playwright_installed(&config)?;

        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("bridge.js");
        std::fs::write(&script_path, build_script(&config))?;

        debug!("Playwright bridge written to {}", script_path.display());

        Ok(Self {
            config,
            script_path,
            _script_dir: script_dir,
        })
    }

    fn check_playwright_installed(config: &PlaywrightConfig) -> E2eResult<()> {
        let status = Command::new(&config.node_binary)
            .args(["-e", "require.resolve('playwright')"])
            .current_dir(&config.project_dir)
            .env("NODE_PATH", node_path(config))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }
}

#[async_trait]
impl PageFactory for PlaywrightLauncher {
    async fn open(&self) -> E2eResult<Box<dyn Page>> {
        let page = PlaywrightPage::spawn(&self.config, &self.script_path).await?;
        Ok(Box::new(page))
    }
}

fn node_path(config: &PlaywrightConfig) -> PathBuf {
    config.project_dir.join("node_modules")
}

/// Commands understood by the bridge script
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum BridgeCommand<'a> {
    Goto {
        url: &'a str,
        timeout_ms: u64,
    },
    WaitForUrl {
        pattern: &'a str,
        timeout_ms: u64,
    },
    Click {
        locator: &'a Locator,
        double: bool,
        timeout_ms: u64,
    },
    Fill {
        locator: &'a Locator,
        value: &'a str,
        timeout_ms: u64,
    },
    Check {
        locator: &'a Locator,
        timeout_ms: u64,
    },
    WaitFor {
        locator: &'a Locator,
        state: WaitState,
        timeout_ms: u64,
    },
    Screenshot {
        path: String,
        full_page: bool,
    },
    Close,
}

impl BridgeCommand<'_> {
    fn describe(&self) -> String {
        match self {
            BridgeCommand::Goto { url, .. } => format!("navigate:{}", url),
            BridgeCommand::WaitForUrl { pattern, .. } => format!("wait_for_url:{}", pattern),
            BridgeCommand::Click {
                locator,
                double: true,
                ..
            } => format!("dblclick:{}", locator),
            BridgeCommand::Click { locator, .. } => format!("click:{}", locator),
            BridgeCommand::Fill { locator, .. } => format!("fill:{}", locator),
            BridgeCommand::Check { locator, .. } => format!("check:{}", locator),
            BridgeCommand::WaitFor { locator, state, .. } => {
                format!("wait:{}:{:?}", locator, state)
            }
            BridgeCommand::Screenshot { path, .. } => format!("screenshot:{}", path),
            BridgeCommand::Close => "close".to_string(),
        }
    }
}

#[derive(Serialize)]
struct BridgeRequest<'a> {
    id: u64,
    #[serde(flatten)]
    command: &'a BridgeCommand<'a>,
}

#[derive(Debug, Deserialize)]
struct BridgeReply {
    id: u64,
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    timeout: bool,
}

/// A browser page driven through the bridge process
pub struct PlaywrightPage {
    child: Child,
    writer: BufWriter<ChildStdin>,
    reader: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    closed: bool,
}

impl PlaywrightPage {
    async fn spawn(config: &PlaywrightConfig, script_path: &Path) -> E2eResult<Self> {
        let mut child = TokioCommand::new(&config.node_binary)
            .arg(script_path)
            .current_dir(&config.project_dir)
            .env("NODE_PATH", node_path(config))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                E2eError::Playwright(format!(
                    "Failed to start {}: {}",
                    config.node_binary.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Playwright("Failed to get bridge stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Playwright("Failed to get bridge stdout".to_string()))?;

        let mut page = Self {
            child,
            writer: BufWriter::new(stdin),
            reader: BufReader::new(stdout).lines(),
            next_id: 1,
            closed: false,
        };

        // The bridge announces a launched browser with id 0.
        let launch = Duration::from_millis(config.launch_timeout_ms);
        let ready = tokio::time::timeout(launch, page.read_reply(0))
            .await
            .map_err(|_| E2eError::Timeout(format!("{} launch", config.browser.as_str())))??;

        if !ready.ok {
            return Err(E2eError::Playwright(format!(
                "Browser launch failed: {}",
                ready.error.unwrap_or_else(|| "unknown error".to_string())
            )));
        }

        info!("Launched {} page (pid: {:?})", config.browser.as_str(), page.child.id());
        Ok(page)
    }

    async fn read_reply(&mut self, id: u64) -> E2eResult<BridgeReply> {
        loop {
            let line = self
                .reader
                .next_line()
                .await?
                .ok_or_else(|| E2eError::Playwright("Bridge process exited".to_string()))?;

            debug!("PW <<< {}", line);

            let reply: BridgeReply = match serde_json::from_str(&line) {
                Ok(reply) => reply,
                Err(_) => {
                    // Anything the page logs to stdout is not a reply.
                    continue;
                }
            };

            if reply.id == id {
                return Ok(reply);
            }
            debug!("Discarding stale bridge reply {}", reply.id);
        }
    }

    async fn request(&mut self, command: BridgeCommand<'_>, timeout: Duration) -> E2eResult<()> {
        if self.closed {
            return Err(E2eError::Playwright("Page already closed".to_string()));
        }

        let id = self.next_id;
        self.next_id += 1;

        let line = serde_json::to_string(&BridgeRequest {
            id,
            command: &command,
        })?;
        debug!("PW >>> {}", line);

        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        let reply = tokio::time::timeout(timeout + REPLY_GRACE, self.read_reply(id))
            .await
            .map_err(|_| E2eError::Timeout(command.describe()))??;

        if reply.ok {
            return Ok(());
        }

        let reason = reply.error.unwrap_or_else(|| "unknown error".to_string());
        if reply.timeout {
            Err(E2eError::Timeout(format!("{} ({})", command.describe(), reason)))
        } else {
            Err(E2eError::StepFailed {
                step: command.describe(),
                reason,
            })
        }
    }
}

fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}

#[async_trait]
impl Page for PlaywrightPage {
    async fn goto(&mut self, url: &str, timeout: Duration) -> E2eResult<()> {
        let timeout_ms = millis(timeout);
        self.request(BridgeCommand::Goto { url, timeout_ms }, timeout).await
    }

    async fn wait_for_url(&mut self, pattern: &str, timeout: Duration) -> E2eResult<()> {
        let timeout_ms = millis(timeout);
        self.request(BridgeCommand::WaitForUrl { pattern, timeout_ms }, timeout)
            .await
    }

    async fn click(&mut self, target: &Locator, timeout: Duration) -> E2eResult<()> {
        let command = BridgeCommand::Click {
            locator: target,
            double: false,
            timeout_ms: millis(timeout),
        };
        self.request(command, timeout).await
    }

    async fn double_click(&mut self, target: &Locator, timeout: Duration) -> E2eResult<()> {
        let command = BridgeCommand::Click {
            locator: target,
            double: true,
            timeout_ms: millis(timeout),
        };
        self.request(command, timeout).await
    }

    async fn fill(&mut self, target: &Locator, value: &str, timeout: Duration) -> E2eResult<()> {
        let command = BridgeCommand::Fill {
            locator: target,
            value,
            timeout_ms: millis(timeout),
        };
        self.request(command, timeout).await
    }

    async fn check(&mut self, target: &Locator, timeout: Duration) -> E2eResult<()> {
        let command = BridgeCommand::Check {
            locator: target,
            timeout_ms: millis(timeout),
        };
        self.request(command, timeout).await
    }

    async fn wait_for(
        &mut self,
        target: &Locator,
        state: WaitState,
        timeout: Duration,
    ) -> E2eResult<()> {
        let command = BridgeCommand::WaitFor {
            locator: target,
            state,
            timeout_ms: millis(timeout),
        };
        self.request(command, timeout).await
    }

    async fn screenshot(&mut self, path: &Path, full_page: bool) -> E2eResult<()> {
        let command = BridgeCommand::Screenshot {
            path: path.to_string_lossy().into_owned(),
            full_page,
        };
        self.request(command, SCREENSHOT_TIMEOUT).await
    }

    async fn close(&mut self) -> E2eResult<()> {
        if self.closed {
            return Ok(());
        }

        if let Err(e) = self.request(BridgeCommand::Close, CLOSE_TIMEOUT).await {
            warn!("Bridge did not acknowledge close: {}", e);
        }
        self.closed = true;

        match tokio::time::timeout(CLOSE_TIMEOUT, self.child.wait()).await {
            Ok(Ok(_)) => Ok(()),
            _ => {
                self.child.kill().await?;
                Ok(())
            }
        }
    }
}

/// Build the Node bridge script for a browser configuration
pub fn build_script(config: &PlaywrightConfig) -> String {
    format!(
        r#"
const {{ chromium, firefox, webkit }} = require('playwright');
const readline = require('readline');

const engines = {{ chromium, firefox, webkit }};

function text(m) {{
  return m.mode === 'pattern' ? new RegExp(m.value, 'i') : m.value;
}}

function locate(page, l) {{
  switch (l.kind) {{
    case 'role':
      return page.getByRole(l.role, {{ name: text(l.name), exact: l.name.mode === 'exact' }});
    case 'text':
      return page.getByText(text(l.text), {{ exact: l.text.mode === 'exact' }});
    case 'css':
      return l.has_text
        ? page.locator(l.selector).filter({{ hasText: l.has_text }})
        : page.locator(l.selector);
    case 'first':
      return locate(page, l.of).first();
    default:
      throw new Error('unknown locator kind: ' + l.kind);
  }}
}}

function reply(msg) {{
  process.stdout.write(JSON.stringify(msg) + '\n');
}}

(async () => {{
  const browser = await engines['{browser}'].launch({{ headless: {headless} }});
  const context = await browser.newContext({{
    viewport: {{ width: {width}, height: {height} }}
  }});
  const page = await context.newPage();
  reply({{ id: 0, ok: true }});

  const input = readline.createInterface({{ input: process.stdin }});
  for await (const line of input) {{
    if (!line.trim()) continue;
    const cmd = JSON.parse(line);
    try {{
      switch (cmd.op) {{
        case 'goto':
          await page.goto(cmd.url, {{ timeout: cmd.timeout_ms }});
          break;
        case 'wait_for_url':
          await page.waitForURL(new RegExp(cmd.pattern, 'i'), {{ timeout: cmd.timeout_ms }});
          break;
        case 'click':
          if (cmd.double) {{
            await locate(page, cmd.locator).dblclick({{ timeout: cmd.timeout_ms }});
          }} else {{
            await locate(page, cmd.locator).click({{ timeout: cmd.timeout_ms }});
          }}
          break;
        case 'fill':
          await locate(page, cmd.locator).fill(cmd.value, {{ timeout: cmd.timeout_ms }});
          break;
        case 'check':
          await locate(page, cmd.locator).check({{ timeout: cmd.timeout_ms, force: true }});
          break;
        case 'wait_for':
          await locate(page, cmd.locator).waitFor({{ state: cmd.state, timeout: cmd.timeout_ms }});
          break;
        case 'screenshot':
          await page.screenshot({{ path: cmd.path, fullPage: cmd.full_page }});
          break;
        case 'close':
          break;
        default:
          throw new Error('unknown op: ' + cmd.op);
      }}
      reply({{ id: cmd.id, ok: true }});
    }} catch (error) {{
      reply({{ id: cmd.id, ok: false, error: error.message, timeout: error.name === 'TimeoutError' }});
    }}
    if (cmd.op === 'close') break;
  }}
  await browser.close();
}})().catch((error) => {{
  reply({{ id: 0, ok: false, error: error.message, timeout: false }});
  process.exit(1);
}});
"#,
        browser = config.browser.as_str(),
        headless = config.headless,
        width = config.viewport_width,
        height = config.viewport_height,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::TextMatch;

    #[test]
    fn test_browser_from_str() {
        assert_eq!("Firefox".parse::<Browser>().unwrap(), Browser::Firefox);
        assert_eq!("chrome".parse::<Browser>().unwrap(), Browser::Chromium);
        assert!("lynx".parse::<Browser>().is_err());
    }

    #[test]
    fn test_request_line_is_flat() {
        let locator = Locator::css_with_text("button", "Next");
        let command = BridgeCommand::Click {
            locator: &locator,
            double: true,
            timeout_ms: 5000,
        };
        let json = serde_json::to_value(BridgeRequest {
            id: 7,
            command: &command,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": 7,
                "op": "click",
                "locator": { "kind": "css", "selector": "button", "has_text": "Next" },
                "double": true,
                "timeout_ms": 5000
            })
        );
        assert_eq!(command.describe(), "dblclick:css=button[has-text='Next']");
    }

    #[test]
    fn test_wait_for_serializes_state() {
        let locator = Locator::role("heading", TextMatch::contains("Your application is being"));
        let command = BridgeCommand::WaitFor {
            locator: &locator,
            state: WaitState::Visible,
            timeout_ms: 100,
        };
        let json = serde_json::to_value(&command).unwrap();
        assert_eq!(json["op"], "wait_for");
        assert_eq!(json["state"], "visible");
    }

    #[test]
    fn test_reply_defaults() {
        let reply: BridgeReply = serde_json::from_str(r#"{"id":3,"ok":true}"#).unwrap();
        assert_eq!(reply.id, 3);
        assert!(reply.ok);
        assert!(!reply.timeout);
        assert!(reply.error.is_none());
    }

    #[test]
    fn test_build_script() {
        let config = PlaywrightConfig {
            browser: Browser::Webkit,
            headless: false,
            viewport_width: 1920,
            viewport_height: 1080,
            ..Default::default()
        };
        let script = build_script(&config);
        assert!(script.contains("engines['webkit'].launch({ headless: false })"));
        assert!(script.contains("viewport: { width: 1920, height: 1080 }"));
        assert!(script.contains("case 'wait_for_url':"));
    }
}
