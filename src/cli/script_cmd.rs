use anyhow::{Context, Result, bail};
use console::style;
use std::path::Path;

use clipscript::core::config::EngineConfig;
use clipscript::core::item::{ClipboardItem, ContentType};
use clipscript::core::script::UserScript;
use clipscript::core::terminal::{GuideSection, print_error, print_success, print_warn};
use clipscript::scripts::events::{EventBus, ScriptEvent};
use clipscript::scripts::{Sandbox, imports, matcher};

use super::host::build_host;
use super::{MatchArgs, RunArgs};

async fn read_script(file: &Path) -> Result<String> {
    tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read script {:?}", file))
}

/// The script editor's "test" action: one script, one throwaway item.
pub(crate) async fn run_script(file: &Path, args: &RunArgs, config: &EngineConfig) -> Result<()> {
    let source = read_script(file).await?;
    let name = file
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "script".to_string());
    let script = UserScript::new("cli", name, source);

    let mut item = ClipboardItem::from_text(args.content.clone(), ContentType::from(args.content_type.as_str()));
    item.source = args.source.clone();

    let events = EventBus::new(config.events.channel_capacity);
    let mut rx = events.subscribe();
    let sandbox = Sandbox::new(build_host(config, true)?, config.execution.clone(), events);
    let result = sandbox.execute(&script, &item).await;

    while let Ok(event) = rx.try_recv() {
        if let ScriptEvent::StreamChunk { chunk, .. } = event {
            print!("{}", chunk);
        }
    }

    println!("{}", serde_json::to_string_pretty(&result)?);
    match &result.error {
        None => {
            print_success(&format!("Script [{}] finished", script.name));
            Ok(())
        }
        Some(e) => bail!("Script [{}] failed: {}", script.name, e),
    }
}

pub(crate) fn run_match(args: &MatchArgs) {
    let script = UserScript::new("cli", "match", "")
        .with_keywords(args.keywords.iter().cloned())
        .with_content_types(args.content_types.iter().map(String::as_str));
    let item = ClipboardItem::from_text(args.content.clone(), ContentType::from(args.content_type.as_str()));

    for keyword in &args.keywords {
        let hit = matcher::keyword_matches(keyword, &item.content);
        println!(
            "  {} {}",
            if hit { style("match").green() } else { style("miss ").dim() },
            keyword
        );
    }

    if matcher::matches(&script, &item) {
        print_success("Script would trigger for this content.");
    } else {
        print_warn("Script would not trigger for this content.");
    }
}

pub(crate) async fn run_imports(file: &Path) -> Result<()> {
    let resolved = imports::resolve(&read_script(file).await?);

    let mut section = GuideSection::new("Capabilities");
    if resolved.capabilities.is_empty() {
        section = section.text("(none)");
    }
    for name in &resolved.capabilities {
        let known = clipscript::scripts::Capability::from_name(name).is_some();
        section = section.status(name, if known { "granted" } else { "unknown, ignored" });
    }
    section.print();

    println!("\n{}", style("Sanitized source:").bold());
    println!("{}", resolved.sanitized);
    if resolved.sanitized.trim().is_empty() {
        print_error("Script body is empty after removing imports.");
    }
    Ok(())
}
