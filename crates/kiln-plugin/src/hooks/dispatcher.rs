//! Hook dispatcher: runs the taps of one hook sequentially.
//!
//! - Transform: each handler receives the previous handler's output.
//! - Accumulate: each handler's output is appended to the running list.
//! - Notify: handlers run in order, outputs are discarded.
//!
//! Every handler is awaited to completion before the next one starts. The
//! first failure stops the chain and is returned unchanged; no partial
//! result escapes a failed dispatch.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use kiln_core::AppResult;

use super::definitions::{HookKind, HookTap};

/// Append-only list of taps for one hook.
#[derive(Debug, Clone, Default)]
pub struct TapList {
    /// Taps in bind order.
    taps: Arc<RwLock<Vec<HookTap>>>,
}

impl TapList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a tap.
    pub async fn push(&self, tap: HookTap) {
        self.taps.write().await.push(tap);
    }

    /// Snapshot of the current taps, in bind order.
    pub async fn snapshot(&self) -> Vec<HookTap> {
        self.taps.read().await.clone()
    }

    /// Names of the contributing plugins, in bind order.
    pub async fn contributors(&self) -> Vec<String> {
        self.taps
            .read()
            .await
            .iter()
            .map(|tap| tap.contributor.clone())
            .collect()
    }

    /// Number of taps.
    pub async fn len(&self) -> usize {
        self.taps.read().await.len()
    }

    /// Whether nothing is bound.
    pub async fn is_empty(&self) -> bool {
        self.taps.read().await.is_empty()
    }
}

/// Runs a Transform chain seeded with `initial`.
pub async fn transform(hook: &str, taps: &TapList, initial: Value, args: &Value) -> AppResult<Value> {
    let taps = taps.snapshot().await;
    trace_dispatch(hook, HookKind::Transform, taps.len());

    let mut value = initial;
    for tap in &taps {
        debug!(hook = %hook, plugin = %tap.contributor, "Running transform handler");
        value = tap.handler.call(value, args.clone()).await?;
    }

    Ok(value)
}

/// Runs an Accumulate chain, appending each output to `initial`.
pub async fn accumulate(
    hook: &str,
    taps: &TapList,
    initial: Vec<Value>,
    args: &Value,
) -> AppResult<Vec<Value>> {
    let taps = taps.snapshot().await;
    trace_dispatch(hook, HookKind::Accumulate, taps.len());

    let mut items = initial;
    for tap in &taps {
        debug!(hook = %hook, plugin = %tap.contributor, "Running accumulate handler");
        let item = tap.handler.call(Value::Null, args.clone()).await?;
        items.push(item);
    }

    Ok(items)
}

/// Runs a Notify chain, handing every handler the same `subject`.
pub async fn notify(hook: &str, taps: &TapList, subject: &Value, args: &Value) -> AppResult<()> {
    let taps = taps.snapshot().await;
    trace_dispatch(hook, HookKind::Notify, taps.len());

    for tap in &taps {
        debug!(hook = %hook, plugin = %tap.contributor, "Running notify handler");
        tap.handler.call(subject.clone(), args.clone()).await?;
    }

    Ok(())
}

fn trace_dispatch(hook: &str, kind: HookKind, handler_count: usize) {
    debug!(hook = %hook, kind = %kind, handler_count, "Dispatching hook");
}
