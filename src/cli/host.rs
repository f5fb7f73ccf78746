use anyhow::Result;
use async_trait::async_trait;
use console::{Term, style};
use std::sync::Arc;
use tracing::info;

use clipscript::core::config::EngineConfig;
use clipscript::scripts::capabilities::{
    ClipboardWriter, Dialog, HostCapabilities, LogDialog, ReqwestHttpProxy,
};

/// Shows `alert` messages on the terminal and waits for Enter.
pub(crate) struct TerminalDialog;

#[async_trait]
impl Dialog for TerminalDialog {
    async fn alert(&self, message: &str) -> Result<()> {
        let message = message.to_string();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let term = Term::stderr();
            term.write_line(&format!(
                "\n{} {}",
                style("Script alert:").bold().yellow(),
                message
            ))?;
            if term.is_term() {
                term.write_str(&format!("{} ", style("Press Enter to continue").dim()))?;
                term.read_line()?;
            }
            Ok(())
        })
        .await?
    }
}

/// Stand-in for the system clipboard: the text is logged and echoed.
pub(crate) struct EchoClipboard;

#[async_trait]
impl ClipboardWriter for EchoClipboard {
    async fn write_text(&self, text: &str) -> Result<()> {
        info!("Script copied {} chars to the clipboard", text.chars().count());
        eprintln!("{} {}", style("clipboard <-").cyan(), text);
        Ok(())
    }
}

/// Host bindings for the CLI. Non-interactive hosts never block on input.
pub(crate) fn build_host(config: &EngineConfig, interactive: bool) -> Result<HostCapabilities> {
    let host = if interactive {
        HostCapabilities::new(Arc::new(TerminalDialog))
    } else {
        HostCapabilities::new(Arc::new(LogDialog))
    };
    Ok(host
        .with_http(Arc::new(ReqwestHttpProxy::new(&config.http)?))
        .with_clipboard(Arc::new(EchoClipboard)))
}
