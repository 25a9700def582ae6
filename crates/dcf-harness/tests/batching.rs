#![forbid(unsafe_code)]

//! Integration tests: update batching, failure reporting and retries.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use dcf_core::identity::{NodeId, ViewId};
use dcf_core::node::ComponentNode;
use dcf_harness::assert_ops;
use dcf_harness::fixtures::{config, keyed_list, runtime, runtime_with};
use dcf_render::ops::{BatchedUpdate, OpKind};
use dcf_runtime::{
    BridgeError, JsonBridge, JsonTransport, Runtime, State, UpdateScheduler,
};

fn v(raw: u32) -> ViewId {
    ViewId::new(raw)
}

fn counter(name: &str, state: &State<i64>) -> ComponentNode {
    let state = state.clone();
    ComponentNode::stateful(name, move |_| {
        ComponentNode::element("Text").prop("content", state.get())
    })
    .key(name)
}

// ============================================================================
// Batching
// ============================================================================

#[test]
fn many_updates_one_bridge_call() {
    let (a, b) = (State::new(0), State::new(0));
    let mut rt = runtime();
    rt.render(&ComponentNode::element("View").children([counter("A", &a), counter("B", &b)]))
        .unwrap();
    let _subs = (
        rt.watch(&a, rt.find("A").unwrap()),
        rt.watch(&b, rt.find("B").unwrap()),
    );

    a.set(1);
    b.set(2);
    a.set(3);
    assert_eq!(rt.scheduler().pending(), 2);

    let tick = rt.tick();
    assert_eq!(tick.flush.bridge_calls, 1);
    assert_eq!(tick.flush.walked, 2);
    assert_eq!(rt.bridge().batch_count(), 2);
    assert_ops!(rt.bridge().last_batch().unwrap(), { UpdateView: 2 });
    let content = |view: ViewId| rt.bridge().tree().view(view).unwrap().props["content"].clone();
    assert_eq!(content(v(2)), 3);
    assert_eq!(content(v(3)), 2);
}

#[test]
fn idle_tick_makes_no_bridge_call() {
    let mut rt = runtime();
    rt.render(&keyed_list(&["a"])).unwrap();
    let tick = rt.tick();
    assert!(tick.events.is_empty());
    assert_eq!(tick.flush.bridge_calls, 0);
    assert_eq!(rt.bridge().batch_count(), 1);
}

#[test]
fn dirty_component_covers_dirty_descendants() {
    let (outer, inner) = (State::new(0), State::new(0));
    let inner_node = counter("Inner", &inner);
    let outer_state = outer.clone();
    let root = ComponentNode::stateful("Outer", move |_| {
        ComponentNode::element("View")
            .prop("n", outer_state.get())
            .child(inner_node.clone())
    });
    let mut rt = runtime();
    rt.render(&root).unwrap();
    let _subs = (
        rt.watch(&outer, rt.find("Outer").unwrap()),
        rt.watch(&inner, rt.find("Inner").unwrap()),
    );

    inner.set(5);
    outer.set(1);
    let tick = rt.tick();
    assert_eq!(tick.flush.walked, 1);
    assert_ops!(rt.bridge().last_batch().unwrap(), { UpdateView: 2 });
}

#[test]
fn updates_for_unmounted_nodes_are_dropped() {
    let s = State::new(0);
    let mut rt = runtime();
    rt.render(&ComponentNode::element("View").child(counter("Gone", &s)))
        .unwrap();
    let gone = rt.find("Gone").unwrap();
    rt.schedule_update(gone);

    let outcome = rt.render(&ComponentNode::element("View")).unwrap();
    assert_eq!(outcome.dropped, 1);
    assert!(!rt.reconciler().is_live(gone));
    assert!(rt.bridge().tree().verify().is_ok());
}

#[test]
fn updates_scheduled_while_flushing_wait_for_next_tick() {
    let scheduler: Rc<RefCell<Option<(UpdateScheduler, NodeId)>>> = Rc::new(RefCell::new(None));
    let renders = Rc::new(Cell::new(0u32));
    let (slot, count) = (Rc::clone(&scheduler), Rc::clone(&renders));
    let root = ComponentNode::stateful("Restless", move |_| {
        count.set(count.get() + 1);
        if let Some((s, id)) = slot.borrow().as_ref() {
            s.schedule_update(*id);
        }
        ComponentNode::element("Text").prop("content", i64::from(count.get()))
    });

    let mut rt = runtime();
    rt.render(&root).unwrap();
    let id = rt.find("Restless").unwrap();
    *scheduler.borrow_mut() = Some((rt.scheduler(), id));
    rt.schedule_update(id);

    for expected in 2..5 {
        let tick = rt.tick();
        assert_eq!(renders.get(), expected);
        assert_eq!(tick.flush.bridge_calls, 1);
        assert_eq!(rt.scheduler().pending(), 1);
    }
}

// ============================================================================
// Failures and retries
// ============================================================================

#[test]
fn failed_create_is_retried_under_the_same_view_id() {
    let mut rt = runtime();
    rt.bridge_mut().fail(OpKind::CreateView, Some(v(2)), 1);

    let err = rt.render(&keyed_list(&["a", "b"])).unwrap_err();
    let kinds: Vec<OpKind> = err.failures().iter().map(|f| f.operation).collect();
    assert_eq!(kinds, [OpKind::CreateView, OpKind::SetChildren]);
    assert_eq!(err.failures()[0].view, v(2));
    let a = rt.reconciler().node_for_view(v(2)).unwrap();
    assert!(!rt.reconciler().is_created(a));

    let tick = rt.tick();
    assert!(tick.flush.is_clean());
    assert_ops!(rt.bridge().last_batch().unwrap(), { CreateView: 1, SetChildren: 1 });
    assert!(rt.reconciler().is_created(a));
    assert_eq!(rt.reconciler().view_of(a), Some(v(2)));
    assert_eq!(rt.bridge().tree().children(v(1)), [v(2), v(3)]);
    assert!(rt.bridge().tree().verify().is_ok());
}

#[test]
fn retries_stop_at_the_configured_limit() {
    let mut rt = runtime_with(config().with_max_retry_attempts(2));
    rt.bridge_mut().fail_always(OpKind::CreateView, Some(v(2)));

    assert!(rt.render(&keyed_list(&["a", "b"])).is_err());
    assert_eq!(rt.scheduler().pending(), 2);

    let first = rt.tick();
    assert!(!first.flush.is_clean());
    assert_eq!(first.flush.retried, 2);

    let second = rt.tick();
    assert!(!second.flush.is_clean());
    assert_eq!(second.flush.retried, 0);

    // The parent's child list is repaired to what exists natively.
    let repair = rt.tick();
    assert!(repair.flush.is_clean());
    assert_eq!(rt.bridge().tree().children(v(1)), [v(3)]);
    assert_eq!(rt.tick().flush.bridge_calls, 0);

    rt.bridge_mut().heal();
    rt.render(&keyed_list(&["a", "b"])).unwrap();
    assert_eq!(rt.bridge().tree().children(v(1)), [v(2), v(3)]);
}

#[test]
fn disabled_retries_leave_failures_to_the_next_update() {
    let mut rt = runtime_with(config().with_retry_failed_nodes(false));
    rt.bridge_mut().fail(OpKind::UpdateView, None, 1);
    rt.render(&keyed_list(&["a"])).unwrap();

    assert!(rt.render(&keyed_list(&["a"]).prop("x", 1)).is_err());
    assert!(rt.scheduler().is_idle());

    // The next update resends the full prop set.
    rt.render(&keyed_list(&["a"]).prop("x", 1).prop("y", 2)).unwrap();
    let props = &rt.bridge().tree().view(v(1)).unwrap().props;
    assert_eq!(props.get("x"), Some(&serde_json::json!(1)));
    assert_eq!(props.get("y"), Some(&serde_json::json!(2)));
}

#[test]
fn transport_failure_recovers_on_the_next_tick() {
    let mut rt = runtime();
    rt.bridge_mut().fail_transport(1);

    let err = rt.render(&keyed_list(&["a", "b"])).unwrap_err();
    assert_eq!(err.failures().len(), rt.bridge().last_batch().unwrap().len());
    assert!(rt.bridge().tree().is_empty());

    assert!(rt.tick().flush.is_clean());
    assert_eq!(rt.bridge().tree().children(ViewId::ROOT), [v(1)]);
    assert_eq!(rt.bridge().tree().children(v(1)), [v(2), v(3)]);
}

// ============================================================================
// JSON transport
// ============================================================================

#[derive(Debug, Default)]
struct Wire {
    payloads: Vec<String>,
}

impl JsonTransport for Wire {
    fn commit(&mut self, operations_json: &str) -> Result<(), BridgeError> {
        self.payloads.push(operations_json.to_owned());
        Ok(())
    }
}

#[test]
fn json_bridge_ships_one_payload_per_flush() {
    let mut rt = Runtime::new(JsonBridge::new(Wire::default()));
    rt.render(&keyed_list(&["a", "b"])).unwrap();
    rt.render(&keyed_list(&["b", "a"])).unwrap();

    let payloads = &rt.bridge().transport().payloads;
    assert_eq!(payloads.len(), 2);
    let first = BatchedUpdate::from_json(&payloads[0]).unwrap();
    assert_eq!(first.count(OpKind::CreateView), 3);
    let second = BatchedUpdate::from_json(&payloads[1]).unwrap();
    assert_ops!(&second, { SetChildren: 1 });
    assert!(payloads[1].contains(r#""operation":"setChildren""#));
}
