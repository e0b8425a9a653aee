//! Publish/subscribe table routing decoded events to handlers.
//!
//! Handlers are keyed by event type or by [`WILDCARD`]. For each event the
//! exact-type handlers run first, in insertion order, then the wildcard
//! handlers, in insertion order. A handler returning `Err` or panicking is
//! logged and skipped; the rest still run and nothing reaches the caller.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use nsboot_core::envelope::{ServerEvent, WILDCARD};
use nsboot_core::errors::RealtimeError;
use parking_lot::Mutex;
use tracing::{debug, error, warn};

/// Boxed error a handler may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of a single handler call.
pub type HandlerResult = Result<(), BoxError>;

/// A subscriber callback. Identity is the `Arc` allocation.
pub type Handler = Arc<dyn Fn(&ServerEvent) -> HandlerResult + Send + Sync>;

/// Wrap a closure as a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&ServerEvent) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(f)
}

fn same_handler(a: &Handler, b: &Handler) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// The subscription table itself.
#[derive(Default)]
pub struct DispatchRegistry {
    handlers: HashMap<String, Vec<Handler>>,
}

impl DispatchRegistry {
    /// Append `handler` to the list for `event_type`.
    pub fn subscribe(&mut self, event_type: impl Into<String>, handler: Handler) {
        self.handlers
            .entry(event_type.into())
            .or_default()
            .push(handler);
    }

    /// Remove the first registration of `handler` under `event_type`.
    ///
    /// Returns whether anything was removed.
    pub fn unsubscribe(&mut self, event_type: &str, handler: &Handler) -> bool {
        let Some(list) = self.handlers.get_mut(event_type) else {
            return false;
        };
        let Some(index) = list.iter().position(|h| same_handler(h, handler)) else {
            return false;
        };
        let _ = list.remove(index);
        if list.is_empty() {
            let _ = self.handlers.remove(event_type);
        }
        true
    }

    /// Number of handlers registered under `event_type`.
    pub fn handler_count(&self, event_type: &str) -> usize {
        self.handlers.get(event_type).map_or(0, Vec::len)
    }

    /// Handlers to run for `event_type`: exact-type list then wildcard list.
    fn recipients(&self, event_type: &str) -> Vec<Handler> {
        let exact = self.handlers.get(event_type).into_iter().flatten();
        let wildcard = if event_type == WILDCARD {
            None
        } else {
            self.handlers.get(WILDCARD)
        };
        exact.chain(wildcard.into_iter().flatten()).cloned().collect()
    }
}

/// Counts from one dispatch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers that returned `Ok`.
    pub delivered: usize,
    /// Handlers that returned `Err` or panicked.
    pub failed: usize,
}

/// Shared handle to a [`DispatchRegistry`].
///
/// Dispatch snapshots the recipients under the lock and invokes them after
/// releasing it, so handlers may subscribe or unsubscribe re-entrantly; such
/// changes take effect from the next dispatch.
#[derive(Clone, Default)]
pub struct Dispatcher {
    registry: Arc<Mutex<DispatchRegistry>>,
}

impl Dispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// See [`DispatchRegistry::subscribe`].
    pub fn subscribe(&self, event_type: impl Into<String>, handler: Handler) {
        self.registry.lock().subscribe(event_type, handler);
    }

    /// See [`DispatchRegistry::unsubscribe`].
    pub fn unsubscribe(&self, event_type: &str, handler: &Handler) -> bool {
        self.registry.lock().unsubscribe(event_type, handler)
    }

    /// See [`DispatchRegistry::handler_count`].
    pub fn handler_count(&self, event_type: &str) -> usize {
        self.registry.lock().handler_count(event_type)
    }

    /// Deliver `event` to its exact-type subscribers, then to wildcard ones.
    pub fn dispatch(&self, event: &ServerEvent) -> DispatchReport {
        let event_type = event.event_type();
        let recipients = self.registry.lock().recipients(event_type);
        let mut report = DispatchReport::default();
        for handler in &recipients {
            match invoke(handler, event) {
                Ok(()) => report.delivered += 1,
                Err(_) => report.failed += 1,
            }
        }
        debug!(
            event_type,
            delivered = report.delivered,
            failed = report.failed,
            "dispatched event"
        );
        report
    }
}

/// Run one handler, containing both error returns and panics.
fn invoke(handler: &Handler, event: &ServerEvent) -> Result<(), RealtimeError> {
    let failure = |message: String| RealtimeError::Subscriber {
        event_type: event.event_type().to_owned(),
        message,
    };
    match catch_unwind(AssertUnwindSafe(|| handler(event))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            let err = failure(e.to_string());
            warn!(error = %err, "subscriber failed");
            Err(err)
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_owned());
            let err = failure(format!("panicked: {message}"));
            error!(error = %err, "subscriber panicked");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;
    use nsboot_core::logging::capture_logs;
    use serde_json::json;
    use tracing::Level;

    fn other(event_type: &str) -> ServerEvent {
        ServerEvent::Other {
            event_type: event_type.into(),
            data: json!({}),
        }
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> Handler {
        let log = Arc::clone(log);
        handler(move |_| {
            log.lock().push(name.to_owned());
            Ok(())
        })
    }

    fn counter() -> (Handler, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let h = handler(move |_| {
            let _ = c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (h, count)
    }

    #[test]
    fn handlers_run_in_insertion_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let d = Dispatcher::new();
        d.subscribe("foo", recorder(&log, "a"));
        d.subscribe("foo", recorder(&log, "b"));
        d.subscribe("foo", recorder(&log, "c"));
        let report = d.dispatch(&other("foo"));
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
        assert_eq!(report.delivered, 3);
    }

    #[test]
    fn failing_handler_does_not_stop_the_rest() {
        let (b, b_count) = counter();
        let d = Dispatcher::new();
        d.subscribe("foo", handler(|_| Err("boom".into())));
        d.subscribe("foo", b);
        let report = d.dispatch(&other("foo"));
        assert_eq!(b_count.load(Ordering::SeqCst), 1);
        assert_eq!(report, DispatchReport { delivered: 1, failed: 1 });
    }

    #[test]
    fn panicking_handler_is_contained() {
        let (b, b_count) = counter();
        let (w, w_count) = counter();
        let d = Dispatcher::new();
        d.subscribe("foo", handler(|_| panic!("subscriber bug")));
        d.subscribe("foo", b);
        d.subscribe(WILDCARD, w);
        let report = d.dispatch(&other("foo"));
        assert_eq!(b_count.load(Ordering::SeqCst), 1);
        assert_eq!(w_count.load(Ordering::SeqCst), 1);
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn handler_error_becomes_subscriber_failure() {
        let (logs, _guard) = capture_logs();
        let h = handler(|_| Err("boom".into()));
        let err = invoke(&h, &other("foo")).unwrap_err();
        assert_matches!(
            &err,
            RealtimeError::Subscriber { event_type, message }
                if event_type == "foo" && message == "boom"
        );

        let warned = logs.events();
        let event = warned.iter().find(|e| e.level == Level::WARN).unwrap();
        assert_eq!(event.message, "subscriber failed");
        assert_eq!(event.field("error"), Some("subscriber for `foo` failed: boom"));
    }

    #[test]
    fn panic_becomes_subscriber_failure() {
        let (logs, _guard) = capture_logs();
        let h = handler(|_| panic!("subscriber bug"));
        let err = invoke(&h, &other("foo")).unwrap_err();
        assert_eq!(err.to_string(), "subscriber for `foo` failed: panicked: subscriber bug");
        assert_eq!(logs.count_matching(Level::ERROR, "subscriber panicked"), 1);
    }

    #[test]
    fn wildcard_and_exact_each_run_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let d = Dispatcher::new();
        d.subscribe(WILDCARD, recorder(&log, "wild"));
        d.subscribe("foo", recorder(&log, "foo"));
        d.subscribe("bar", recorder(&log, "bar"));
        let _ = d.dispatch(&other("foo"));
        assert_eq!(*log.lock(), vec!["foo", "wild"]);
    }

    #[test]
    fn wildcard_sees_type_and_data() {
        let seen = Arc::new(Mutex::new(None));
        let s = Arc::clone(&seen);
        let d = Dispatcher::new();
        d.subscribe(
            WILDCARD,
            handler(move |event| {
                *s.lock() = Some((event.event_type().to_owned(), event.data()));
                Ok(())
            }),
        );
        let _ = d.dispatch(&ServerEvent::Other {
            event_type: "images".into(),
            data: json!({"count": 4}),
        });
        assert_eq!(
            seen.lock().clone(),
            Some(("images".to_owned(), json!({"count": 4})))
        );
    }

    #[test]
    fn wildcard_failure_isolated_from_other_wildcards() {
        let (w, w_count) = counter();
        let d = Dispatcher::new();
        d.subscribe(WILDCARD, handler(|_| Err("nope".into())));
        d.subscribe(WILDCARD, w);
        let _ = d.dispatch(&ServerEvent::Connected);
        assert_eq!(w_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_removes_first_instance_only() {
        let (h, count) = counter();
        let d = Dispatcher::new();
        d.subscribe("foo", Arc::clone(&h));
        d.subscribe("foo", Arc::clone(&h));
        assert!(d.unsubscribe("foo", &h));
        assert_eq!(d.handler_count("foo"), 1);
        let _ = d.dispatch(&other("foo"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_unknown_is_noop() {
        let (h, _) = counter();
        let (other_h, _) = counter();
        let d = Dispatcher::new();
        assert!(!d.unsubscribe("foo", &h));
        d.subscribe("foo", other_h);
        assert!(!d.unsubscribe("foo", &h));
        assert_eq!(d.handler_count("foo"), 1);
    }

    #[test]
    fn identity_is_per_allocation() {
        let d = Dispatcher::new();
        let a = handler(|_| Ok(()));
        let b = handler(|_| Ok(()));
        d.subscribe("foo", Arc::clone(&a));
        assert!(!d.unsubscribe("foo", &b));
        assert!(d.unsubscribe("foo", &a));
        assert_eq!(d.handler_count("foo"), 0);
    }

    #[test]
    fn dispatch_without_subscribers_is_empty() {
        let d = Dispatcher::new();
        assert_eq!(d.dispatch(&other("nobody")), DispatchReport::default());
    }

    #[test]
    fn handler_may_subscribe_during_dispatch() {
        let d = Dispatcher::new();
        let (late, late_count) = counter();
        let inner = d.clone();
        d.subscribe(
            "foo",
            handler(move |_| {
                inner.subscribe("foo", Arc::clone(&late));
                Ok(())
            }),
        );
        let _ = d.dispatch(&other("foo"));
        assert_eq!(late_count.load(Ordering::SeqCst), 0);
        let _ = d.dispatch(&other("foo"));
        assert_eq!(late_count.load(Ordering::SeqCst), 1);
    }
}
