//! Best-effort polling of in-page conditions. A timeout is an outcome, not an
//! error: the driver logs it and carries on with whatever has rendered.

use std::time::Duration;

use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, warn};

use super::engine::{EngineError, EngineSession};

/// Awaits MathJax start-up, then typesets the content root.
pub const TYPESET_MATH: &str = r#"(async () => {
  const mj = window.MathJax;
  if (!mj || typeof mj.typesetPromise !== 'function') { return false; }
  if (mj.startup && mj.startup.promise) { await mj.startup.promise; }
  const root = document.querySelector('.markdown-body');
  await mj.typesetPromise(root ? [root] : undefined);
  return true;
})()"#;

/// Full document height in CSS pixels.
pub const MEASURE_HEIGHT: &str = "Math.ceil(Math.max(document.documentElement.scrollHeight, document.body ? document.body.scrollHeight : 0))";

/// Compares the resource-timing entry count with the one seen on the previous
/// poll, so it only passes once a whole poll interval went by without a new
/// request and every request seen so far has finished.
const NETWORK_IDLE: &str = r#"(() => {
  const entries = performance.getEntriesByType('resource');
  const previous = window.__md2pdfResourceCount;
  window.__md2pdfResourceCount = entries.length;
  return previous === entries.length && entries.every(entry => entry.responseEnd > 0);
})()"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCondition {
    /// `document.readyState` reached `complete`.
    DocumentComplete,
    /// No new subresource requests started since the previous poll.
    NetworkIdle,
    /// Every image finished, whether it loaded or errored.
    ImagesSettled,
    /// Every diagram container holds its rendered `svg`.
    DiagramsRendered,
    /// The math typesetter exposed its promise API.
    MathReady,
}

impl WaitCondition {
    pub fn as_str(self) -> &'static str {
        match self {
            WaitCondition::DocumentComplete => "document_complete",
            WaitCondition::NetworkIdle => "network_idle",
            WaitCondition::ImagesSettled => "images_settled",
            WaitCondition::DiagramsRendered => "diagrams_rendered",
            WaitCondition::MathReady => "math_ready",
        }
    }

    pub fn script(self) -> &'static str {
        match self {
            WaitCondition::DocumentComplete => "document.readyState === 'complete'",
            WaitCondition::NetworkIdle => NETWORK_IDLE,
            WaitCondition::ImagesSettled => {
                "Array.from(document.images).every(img => img.complete)"
            }
            WaitCondition::DiagramsRendered => {
                "Array.from(document.querySelectorAll('.mermaid')).every(el => el.querySelector('svg') !== null)"
            }
            WaitCondition::MathReady => {
                "!!(window.MathJax && typeof window.MathJax.typesetPromise === 'function')"
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Satisfied,
    TimedOut,
}

impl WaitOutcome {
    pub fn is_satisfied(self) -> bool {
        matches!(self, WaitOutcome::Satisfied)
    }
}

/// Per-condition limits applied while the page settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitBudget {
    pub readiness: Duration,
    pub images: Duration,
    pub diagrams: Duration,
    pub math: Duration,
    pub poll: Duration,
    /// Pause after typesetting so late layout shifts land before measuring.
    pub settle: Duration,
}

impl Default for WaitBudget {
    fn default() -> Self {
        Self {
            readiness: Duration::from_secs(30),
            images: Duration::from_secs(30),
            diagrams: Duration::from_secs(60),
            math: Duration::from_secs(10),
            poll: Duration::from_millis(100),
            settle: Duration::from_millis(200),
        }
    }
}

impl WaitBudget {
    pub fn limit_for(&self, condition: WaitCondition) -> Duration {
        match condition {
            WaitCondition::DocumentComplete | WaitCondition::NetworkIdle => self.readiness,
            WaitCondition::ImagesSettled => self.images,
            WaitCondition::DiagramsRendered => self.diagrams,
            WaitCondition::MathReady => self.math,
        }
    }
}

/// Poll `condition` until it evaluates truthy or `limit` elapses.
///
/// Teardown errors propagate so a cancelled job stops immediately; any other
/// evaluation error (for example a context swapped out mid-navigation) is
/// treated as "not yet" and polled again.
pub async fn wait(
    session: &dyn EngineSession,
    condition: WaitCondition,
    limit: Duration,
    poll: Duration,
) -> Result<WaitOutcome, EngineError> {
    let deadline = Instant::now() + limit;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        match timeout(remaining, session.evaluate(condition.script())).await {
            Ok(Ok(value)) if is_truthy(&value) => {
                debug!(
                    target = "md2pdf::render::wait",
                    condition = condition.as_str(),
                    "condition satisfied"
                );
                return Ok(WaitOutcome::Satisfied);
            }
            Ok(Ok(_)) => {}
            Ok(Err(err)) if err.is_teardown() => return Err(err),
            Ok(Err(err)) => {
                debug!(
                    target = "md2pdf::render::wait",
                    condition = condition.as_str(),
                    error = %err,
                    "condition probe failed"
                );
            }
            Err(_) => break,
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        sleep(poll.min(remaining)).await;
    }

    warn!(
        target = "md2pdf::render::wait",
        condition = condition.as_str(),
        limit_ms = limit.as_millis() as u64,
        "condition timed out, continuing"
    );
    Ok(WaitOutcome::TimedOut)
}

fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(flag) => *flag,
        serde_json::Value::Null => false,
        serde_json::Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        serde_json::Value::String(text) => !text.is_empty(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use serde_json::{Value, json};
    use url::Url;

    use super::*;
    use crate::application::render::engine::{EngineHandle, PrintOptions};

    struct NoopHandle;

    #[async_trait]
    impl EngineHandle for NoopHandle {
        async fn terminate(&self) {}
    }

    /// Reports `false` until the probe has been called `ready_after` times.
    struct CountingSession {
        calls: AtomicUsize,
        ready_after: usize,
        error: Option<&'static str>,
    }

    #[async_trait]
    impl EngineSession for CountingSession {
        fn handle(&self) -> Arc<dyn EngineHandle> {
            Arc::new(NoopHandle)
        }

        async fn open(&self, _url: &Url) -> Result<(), EngineError> {
            Ok(())
        }

        async fn evaluate(&self, _script: &str) -> Result<Value, EngineError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(message) = self.error {
                return Err(EngineError::from_protocol(message));
            }
            Ok(json!(call >= self.ready_after))
        }

        async fn print_pdf(&self, _options: &PrintOptions) -> Result<Vec<u8>, EngineError> {
            Ok(Vec::new())
        }
    }

    fn session(ready_after: usize, error: Option<&'static str>) -> CountingSession {
        CountingSession {
            calls: AtomicUsize::new(0),
            ready_after,
            error,
        }
    }

    #[tokio::test]
    async fn satisfied_after_polling() {
        let session = session(3, None);
        let outcome = wait(
            &session,
            WaitCondition::ImagesSettled,
            Duration::from_secs(2),
            Duration::from_millis(1),
        )
        .await
        .expect("wait");
        assert_eq!(outcome, WaitOutcome::Satisfied);
        assert_eq!(session.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn times_out_without_error() {
        let session = session(usize::MAX, None);
        let outcome = wait(
            &session,
            WaitCondition::DiagramsRendered,
            Duration::from_millis(30),
            Duration::from_millis(5),
        )
        .await
        .expect("wait");
        assert_eq!(outcome, WaitOutcome::TimedOut);
    }

    #[tokio::test]
    async fn teardown_stops_waiting() {
        let session = session(1, Some("Target closed"));
        let err = wait(
            &session,
            WaitCondition::DocumentComplete,
            Duration::from_secs(2),
            Duration::from_millis(1),
        )
        .await
        .expect_err("teardown propagates");
        assert!(err.is_teardown());
    }

    #[tokio::test]
    async fn transient_probe_errors_keep_polling() {
        let session = session(1, Some("Cannot find context with specified id"));
        let outcome = wait(
            &session,
            WaitCondition::MathReady,
            Duration::from_millis(30),
            Duration::from_millis(5),
        )
        .await
        .expect("wait");
        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert!(session.calls.load(Ordering::SeqCst) > 1);
    }

    #[test]
    fn budget_matches_conditions() {
        let budget = WaitBudget::default();
        assert_eq!(budget.limit_for(WaitCondition::DiagramsRendered), Duration::from_secs(60));
        assert_eq!(budget.limit_for(WaitCondition::MathReady), Duration::from_secs(10));
        assert_eq!(budget.limit_for(WaitCondition::NetworkIdle), Duration::from_secs(30));
    }
}
