#![forbid(unsafe_code)]

//! Integration tests: spans and warnings emitted through `tracing`.

use std::fmt;
use std::sync::{Arc, Mutex};

use dcf_core::event::NativeEvent;
use dcf_core::identity::ViewId;
use dcf_core::node::ComponentNode;
use dcf_harness::OpKind;
use dcf_harness::fixtures::{CallLog, keyed_list, runtime};
use tracing::field::{Field, Visit};
use tracing::span;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

#[derive(Clone, Default)]
struct Capture {
    spans: Arc<Mutex<Vec<String>>>,
    warnings: Arc<Mutex<Vec<String>>>,
}

struct Message<'a>(&'a mut String);

impl Visit for Message<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            *self.0 = format!("{value:?}");
        }
    }
}

impl Capture {
    fn spans(&self) -> Vec<String> {
        self.spans.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn warnings(&self) -> Vec<String> {
        self.warnings.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

impl<S: Subscriber> Layer<S> for Capture {
    fn on_new_span(&self, attrs: &span::Attributes<'_>, _id: &span::Id, _ctx: Context<'_, S>) {
        if let Ok(mut spans) = self.spans.lock() {
            spans.push(attrs.metadata().name().to_owned());
        }
    }

    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            let mut message = String::new();
            event.record(&mut Message(&mut message));
            if let Ok(mut warnings) = self.warnings.lock() {
                warnings.push(message);
            }
        }
    }
}

#[test]
fn flush_and_dispatch_run_in_named_spans() {
    let capture = Capture::default();
    let subscriber = tracing_subscriber::registry().with(capture.clone());

    tracing::subscriber::with_default(subscriber, || {
        let log = CallLog::new();
        let mut rt = runtime();
        rt.render(&ComponentNode::element("Button").on("onPress", log.recorder("p")))
            .unwrap();
        assert!(rt.dispatch_event(&NativeEvent::new(ViewId::new(1), "press")).is_handled());
    });

    let spans = capture.spans();
    assert!(spans.iter().any(|s| s == "reconcile"), "spans: {spans:?}");
    assert!(spans.iter().any(|s| s == "dispatch_event"), "spans: {spans:?}");
}

#[test]
fn rejected_operations_are_logged_as_warnings() {
    let capture = Capture::default();
    let subscriber = tracing_subscriber::registry().with(capture.clone());

    tracing::subscriber::with_default(subscriber, || {
        let mut rt = runtime();
        rt.bridge_mut().fail(OpKind::CreateView, Some(ViewId::new(2)), 1);
        assert!(rt.render(&keyed_list(&["a"])).is_err());
    });

    let warnings = capture.warnings();
    assert!(warnings.iter().any(|w| w == "native operation failed"), "warnings: {warnings:?}");
}

#[test]
fn failures_while_waiting_for_a_view_are_logged() {
    let capture = Capture::default();
    let subscriber = tracing_subscriber::registry().with(capture.clone());

    tracing::subscriber::with_default(subscriber, || {
        let mut rt = runtime();
        rt.bridge_mut().fail_always(OpKind::CreateView, Some(ViewId::new(1)));
        assert!(rt.render(&ComponentNode::element("Screen")).is_err());
        let node = rt.reconciler().root().unwrap();
        assert_eq!(rt.wait_for_view(node, |_| {}), None);
    });

    let warnings = capture.warnings();
    assert!(
        warnings.iter().any(|w| w == "flush failed while waiting for view"),
        "warnings: {warnings:?}"
    );
}
