use anyhow::{Result, anyhow};
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use clipscript::core::config::EngineConfig;
use clipscript::core::store::{ItemStore, SqliteStore};
use clipscript::core::terminal::{GuideSection, print_error, print_info, print_success};
use clipscript::scripts::{
    BatchStatus, ExecutionCoordinator, ExecutionRequest, TriggerDispatcher,
};

use super::ExecArgs;
use super::host::build_host;

fn open_store(db: &Path) -> Result<Arc<SqliteStore>> {
    if !db.exists() {
        return Err(anyhow!("database not found at {:?}", db));
    }
    Ok(Arc::new(SqliteStore::open(db)?))
}

/// Run one batch for a stored item, the way the capture side would.
pub(crate) async fn run_exec(
    db: &Path,
    item_id: &str,
    args: &ExecArgs,
    config: &EngineConfig,
) -> Result<()> {
    let store = open_store(db)?;

    let request = if !args.script_ids.is_empty() {
        ExecutionRequest::new(item_id, args.trigger.clone()).with_script_ids(args.script_ids.clone())
    } else {
        let Some(item) = store.get_item_by_id(item_id).await? else {
            print_error(&format!("Clipboard item {} not found.", item_id));
            return Ok(());
        };
        let dispatcher = TriggerDispatcher::new(store.clone());
        match dispatcher.prepare(&args.trigger, &item).await {
            Some(request) => request,
            None => {
                print_info(&format!("No {} scripts match item {}.", args.trigger, item_id));
                return Ok(());
            }
        }
    };

    let coordinator = ExecutionCoordinator::from_config(
        store.clone(),
        store,
        build_host(config, true)?,
        config,
    );
    let report = coordinator.handle(request).await;

    match &report.status {
        BatchStatus::Aborted(reason) => {
            print_error(&format!("Batch aborted: {}", reason));
            return Ok(());
        }
        BatchStatus::NoScripts => {
            print_info("No scripts matched.");
            return Ok(());
        }
        BatchStatus::Completed => {}
    }

    let mut section = GuideSection::new(&format!("Item {} ({})", report.item_id, report.trigger));
    for outcome in &report.outcomes {
        let summary = match (&outcome.result.error, &outcome.result.return_value) {
            (Some(e), _) => format!("error: {}", e),
            (None, Some(value)) => value.to_string(),
            (None, None) => "(no value)".to_string(),
        };
        section = section.status(&outcome.script_name, &summary);
    }
    section.print();

    let failed = report
        .outcomes
        .iter()
        .filter(|o| !o.result.is_ok())
        .count();
    println!();
    if failed == 0 {
        print_success(&format!("{} script(s) finished.", report.outcomes.len()));
    } else {
        print_error(&format!(
            "{} of {} script(s) failed.",
            failed,
            report.outcomes.len()
        ));
    }
    Ok(())
}

/// Serve `ExecutionRequest` JSON lines from stdin until EOF or Ctrl+C.
/// Events and log lines are written to stdout as JSON lines.
pub(crate) async fn run_listen(
    db: &Path,
    config: &EngineConfig,
    log_tx: Option<broadcast::Sender<String>>,
) -> Result<()> {
    let store = open_store(db)?;
    let coordinator = Arc::new(ExecutionCoordinator::from_config(
        store.clone(),
        store,
        build_host(config, false)?,
        config,
    ));

    let mut events = coordinator.events().subscribe();
    let event_printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_json_line(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Event printer lagged, {} events dropped", n)
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let log_printer = log_tx.map(|tx| {
        let mut logs = tx.subscribe();
        tokio::spawn(async move {
            while let Ok(line) = logs.recv().await {
                print_json_line(&serde_json::json!({ "type": "log", "line": line }));
            }
        })
    });

    let (tx, rx) = mpsc::channel::<ExecutionRequest>(config.events.channel_capacity);
    let listener = coordinator.clone().listen(rx);
    drop(coordinator);

    info!("Reading execution requests from stdin");
    let mut lines = spawn_line_reader(
        std::io::BufReader::new(std::io::stdin()),
        config.events.channel_capacity,
    );
    let reader = async {
        while let Some(line) = lines.recv().await {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<ExecutionRequest>(line) {
                Ok(request) => {
                    if tx.send(request).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Ignoring malformed execution request: {}", e),
            }
        }
        Ok::<(), anyhow::Error>(())
    };

    tokio::select! {
        res = reader => res?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted, finishing running batches"),
    }
    drop(tx);

    listener.await?;
    event_printer.await?;
    if let Some(printer) = log_printer {
        printer.abort();
    }
    Ok(())
}

/// Lines are read on a detached thread. A read parked in the runtime's
/// blocking pool would hold the process open after Ctrl+C until the next line.
fn spawn_line_reader<R>(reader: R, capacity: usize) -> mpsc::Receiver<std::io::Result<String>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    std::thread::spawn(move || {
        for line in reader.lines() {
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn print_json_line<T: serde::Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{}", line),
        Err(e) => warn!("Failed to encode output line: {}", e),
    }
}
