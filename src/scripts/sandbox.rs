use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rhai::{Dynamic, Engine, EvalAltResult, ImmutableString, Position, Scope};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::capabilities::{Capability, HostCapabilities, HttpRequest};
use super::events::{EventBus, ScriptEvent};
use super::imports;
use super::{ScriptError, ScriptResult};
use crate::core::config::ExecutionConfig;
use crate::core::item::{ClipboardItem, ItemSnapshot};
use crate::core::script::UserScript;

type CallResult<T> = Result<T, Box<EvalAltResult>>;

/// Runs script bodies in a fresh, isolated engine per call.
#[derive(Clone)]
pub struct Sandbox {
    host: HostCapabilities,
    limits: ExecutionConfig,
    events: EventBus,
}

/// Per-run state moved onto the worker thread.
struct RunContext {
    item: ClipboardItem,
    source: String,
    bound: Vec<Capability>,
    cancel: Arc<AtomicBool>,
    rt_handle: tokio::runtime::Handle,
}

impl Sandbox {
    pub fn new(host: HostCapabilities, limits: ExecutionConfig, events: EventBus) -> Self {
        Self {
            host,
            limits,
            events,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn timeout(&self) -> Duration {
        self.limits.timeout()
    }

    /// Resolve the script's imports and run it under the configured bound.
    pub async fn execute(&self, script: &UserScript, item: &ClipboardItem) -> ScriptResult {
        let resolved = imports::resolve(&script.script);
        if !resolved.capabilities.is_empty() {
            debug!(
                "Script [{}] imports: {:?}",
                script.name, resolved.capabilities
            );
        }

        let result = self
            .run(item, &resolved.sanitized, &resolved.capabilities, self.timeout())
            .await;

        match &result.error {
            None => info!(
                "Script [{}] finished (returned value: {})",
                script.name,
                result.return_value.is_some()
            ),
            Some(e) => warn!("Script [{}] failed: {}", script.name, e),
        }
        result
    }

    /// Run an already sanitized body. Never fails: every error, including
    /// the timeout, is folded into the returned result.
    pub async fn run(
        &self,
        item: &ClipboardItem,
        source: &str,
        granted: &BTreeSet<String>,
        timeout: Duration,
    ) -> ScriptResult {
        let mut bound = Vec::new();
        for name in granted {
            match Capability::from_name(name) {
                Some(cap) if self.host.implements(cap) => bound.push(cap),
                Some(cap) => debug!("Capability {} requested but not provided by host", cap),
                None => debug!("Ignoring unknown capability import '{}'", name),
            }
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let ctx = RunContext {
            item: item.clone(),
            source: source.to_string(),
            bound,
            cancel: cancel.clone(),
            rt_handle: tokio::runtime::Handle::current(),
        };
        let host = self.host.clone();
        let limits = self.limits.clone();
        let events = self.events.clone();

        let worker = tokio::task::spawn_blocking(move || evaluate(ctx, &host, &limits, &events));

        let outcome = match tokio::time::timeout(timeout, worker).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_err)) => Err(ScriptError::Worker(join_err.to_string())),
            Err(_) => {
                // The progress hook sees this on the next operation and
                // terminates the evaluation.
                cancel.store(true, Ordering::SeqCst);
                Err(ScriptError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        };

        match outcome {
            Ok(value) => ScriptResult::success(value),
            Err(e) => e.into(),
        }
    }
}

fn evaluate(
    ctx: RunContext,
    host: &HostCapabilities,
    limits: &ExecutionConfig,
    events: &EventBus,
) -> Result<Option<serde_json::Value>, ScriptError> {
    let mut engine = build_engine(&ctx, host, limits, events);

    let view = ctx.item.snapshot();
    engine.set_max_string_size(string_limit(limits.max_string_size, &view));
    let snapshot =
        rhai::serde::to_dynamic(view).map_err(|e| ScriptError::Worker(e.to_string()))?;
    let mut scope = Scope::new();
    scope.push_constant_dynamic("item", snapshot);

    let ast = engine
        .compile(&ctx.source)
        .map_err(|e| ScriptError::Compile(e.to_string()))?;

    let value = engine
        .eval_ast_with_scope::<Dynamic>(&mut scope, &ast)
        .map_err(|e| classify(&e, &ctx.bound))?;

    Ok(to_json(value))
}

fn build_engine(
    ctx: &RunContext,
    host: &HostCapabilities,
    limits: &ExecutionConfig,
    events: &EventBus,
) -> Engine {
    let mut engine = Engine::new();

    engine.set_max_call_levels(limits.max_call_levels);
    engine.set_max_expr_depths(limits.max_expr_depth, limits.max_expr_depth);
    engine.set_max_array_size(limits.max_array_size);
    engine.set_max_map_size(limits.max_map_size);
    engine.set_max_operations(limits.max_operations);
    engine.set_module_resolver(rhai::module_resolvers::DummyModuleResolver::new());
    engine.disable_symbol("eval");

    let cancel = ctx.cancel.clone();
    engine.on_progress(move |_ops| {
        if cancel.load(Ordering::Relaxed) {
            Some("cancelled".into())
        } else {
            None
        }
    });

    let item_id = ctx.item.id.clone();
    engine.on_print(move |text| info!("Script print [{}]: {}", item_id, text));
    let item_id = ctx.item.id.clone();
    engine.on_debug(move |text, _source, pos: Position| {
        debug!("Script debug [{}] {:?}: {}", item_id, pos, text)
    });

    register_alert(&mut engine, host, &ctx.rt_handle);
    register_ambient(&mut engine, events, &ctx.item.id);

    for cap in &ctx.bound {
        match cap {
            Capability::Request => {
                if let Some(http) = host.http.clone() {
                    let rt = ctx.rt_handle.clone();
                    engine.register_fn(
                        Capability::Request.name(),
                        move |method: ImmutableString,
                              url: ImmutableString,
                              headers: ImmutableString,
                              body: ImmutableString|
                              -> CallResult<String> {
                            let request =
                                HttpRequest::from_script_args(&method, &url, &headers, &body)
                                    .map_err(|e| format!("csRequest: {}", e))?;
                            let response = rt
                                .block_on(http.request(request))
                                .map_err(|e| format!("csRequest failed: {}", e))?;
                            Ok(response.to_descriptor())
                        },
                    );
                }
            }
            Capability::CopyText => {
                if let Some(clipboard) = host.clipboard.clone() {
                    let rt = ctx.rt_handle.clone();
                    engine.register_fn(
                        Capability::CopyText.name(),
                        move |text: ImmutableString| -> CallResult<()> {
                            rt.block_on(clipboard.write_text(&text))
                                .map_err(|e| format!("csCopyText failed: {}", e).into())
                        },
                    );
                }
            }
        }
    }

    engine
}

fn register_alert(engine: &mut Engine, host: &HostCapabilities, rt: &tokio::runtime::Handle) {
    let dialog = host.dialog.clone();
    let rt = rt.clone();
    engine.register_fn("alert", move |message: Dynamic| -> CallResult<()> {
        rt.block_on(dialog.alert(&message.to_string()))
            .map_err(|e| format!("alert failed: {}", e).into())
    });
}

fn register_ambient(engine: &mut Engine, events: &EventBus, item_id: &str) {
    let bus = events.clone();
    let id = item_id.to_string();
    engine.register_fn(
        "dispatch_event",
        move |name: ImmutableString, detail: Dynamic| -> CallResult<()> {
            let detail: serde_json::Value =
                rhai::serde::from_dynamic(&detail).unwrap_or(serde_json::Value::Null);
            bus.publish(ScriptEvent::from_progress(&name, &id, &detail)?);
            Ok(())
        },
    );
    let bus = events.clone();
    let id = item_id.to_string();
    engine.register_fn(
        "dispatch_event",
        move |name: ImmutableString| -> CallResult<()> {
            bus.publish(ScriptEvent::from_progress(
                &name,
                &id,
                &serde_json::Value::Null,
            )?);
            Ok(())
        },
    );

    engine.register_fn("json_parse", |text: ImmutableString| -> CallResult<Dynamic> {
        let value: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| format!("json_parse: {}", e))?;
        rhai::serde::to_dynamic(value)
    });
    engine.register_fn("json_stringify", |value: Dynamic| -> CallResult<String> {
        let value: serde_json::Value = rhai::serde::from_dynamic(&value)?;
        Ok(value.to_string())
    });
    engine.register_fn("timestamp_ms", || chrono::Utc::now().timestamp_millis());
    engine.register_fn("base64_encode", |text: ImmutableString| -> String {
        BASE64.encode(text.as_bytes())
    });
    engine.register_fn("base64_decode", |text: ImmutableString| -> CallResult<String> {
        let bytes = BASE64
            .decode(text.trim())
            .map_err(|e| format!("base64_decode: {}", e))?;
        String::from_utf8(bytes).map_err(|_| "base64_decode: payload is not UTF-8 text".into())
    });
}

/// The configured ceiling applies on top of the snapshot's own strings, so
/// every snapshot field stays readable. Zero keeps strings unbounded.
fn string_limit(configured: usize, snapshot: &ItemSnapshot) -> usize {
    if configured == 0 {
        return 0;
    }
    configured.saturating_add(snapshot.text_len())
}

/// Completion value as JSON; `()` means no value.
fn to_json(value: Dynamic) -> Option<serde_json::Value> {
    if value.is_unit() {
        return None;
    }
    match rhai::serde::from_dynamic::<serde_json::Value>(&value) {
        Ok(json) => Some(json),
        Err(_) => Some(serde_json::Value::String(value.to_string())),
    }
}

fn classify(err: &EvalAltResult, bound: &[Capability]) -> ScriptError {
    match err {
        EvalAltResult::ErrorRuntime(value, _) => {
            if value.is_unit() {
                ScriptError::Thrown("exception thrown".to_string())
            } else {
                ScriptError::Thrown(value.to_string())
            }
        }
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _)
        | EvalAltResult::ErrorInModule(_, inner, _) => classify(inner, bound),
        EvalAltResult::ErrorFunctionNotFound(signature, _) => {
            let name = signature
                .split(|c: char| c == '(' || c.is_whitespace())
                .next()
                .unwrap_or_default();
            match Capability::from_name(name) {
                Some(cap) if !bound.contains(&cap) => {
                    ScriptError::CapabilityNotGranted(cap.name().to_string())
                }
                _ => ScriptError::Runtime(err.to_string()),
            }
        }
        EvalAltResult::ErrorParsing(..) => ScriptError::Compile(err.to_string()),
        _ => ScriptError::Runtime(err.to_string()),
    }
}
