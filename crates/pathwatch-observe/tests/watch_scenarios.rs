#![forbid(unsafe_code)]

//! End-to-end scenarios across key observation, dirty checking and key-path
//! watches.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use pathwatch_core::{Array, Object, Value, run_microtasks};
use pathwatch_observe::{
    ArrayMutations, Callback, SchedulerConfig, WatchCallback, assign, check_aborts_total,
    interceptor_count, is_check_pending, observe, observed_object_count, refresh,
    set_scheduler_config, unwatch, watch, watched_object_count,
};
use tracing::Subscriber;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};

type Log = Rc<RefCell<Vec<(Value, Value)>>>;

fn recorder() -> (WatchCallback, Log) {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    let callback = WatchCallback::new(move |new, old| {
        sink.borrow_mut().push((new.clone(), old.clone()));
    });
    (callback, log)
}

// ── Computed fields ─────────────────────────────────────────────────────

#[test]
fn computed_leaf_fires_after_forced_check() {
    let n = Rc::new(Cell::new(10.0));
    let read = Rc::clone(&n);
    let child = Object::new().with_getter("computed", move |_| Value::from(read.get()));
    let root = Value::from(Object::new().with("child", child));
    let (cb, log) = recorder();

    watch(&root, "child.computed", &cb);
    run_microtasks();
    assert!(log.borrow().is_empty());

    n.set(11.0);
    refresh();
    run_microtasks();
    assert_eq!(*log.borrow(), vec![(Value::from(11), Value::from(10))]);
}

#[test]
fn computed_reading_stored_sibling_needs_no_refresh() {
    let child = Object::new()
        .with("base", 1)
        .with_getter("double", |this| Value::from(this.get("base").to_number() * 2.0));
    let child_value = Value::from(child);
    let root = Value::from(Object::new().with("child", child_value.clone()));
    let (cb, log) = recorder();
    watch(&root, "child.double", &cb);
    run_microtasks();

    // A mediated write arms the check on its own.
    assign(&child_value, "base", 5);
    assert!(is_check_pending());
    run_microtasks();
    assert_eq!(*log.borrow(), vec![(Value::from(10), Value::from(2))]);
}

// ── Rewiring ────────────────────────────────────────────────────────────

#[test]
fn nested_replacement_rewires_chain() {
    let child = Value::from(Object::new());
    let root = Value::from(Object::new().with("child", child.clone()));
    let (cb, log) = recorder();
    watch(&root, "child.grandChild.created", &cb);

    let grand_child = Value::from(Object::new().with("created", 20));
    assign(&child, "grandChild", grand_child.clone());
    assert_eq!(*log.borrow(), vec![(Value::from(20), Value::Undefined)]);

    assign(&grand_child, "created", 30);
    assert_eq!(log.borrow().len(), 2);
    assert_eq!(log.borrow()[1], (Value::from(30), Value::from(20)));
}

#[test]
fn replacing_root_child_with_primitive_unbinds_deeper_levels() {
    let inner = Value::from(Object::new().with("x", 1));
    let root = Value::from(Object::new().with("a", inner.clone()));
    let (cb, log) = recorder();
    watch(&root, "a.x", &cb);

    assign(&root, "a", 7);
    assert_eq!(*log.borrow(), vec![(Value::Undefined, Value::from(1))]);
    assign(&inner, "x", 2);
    assert_eq!(log.borrow().len(), 1);
}

// ── Arrays ──────────────────────────────────────────────────────────────

#[test]
fn push_onto_watched_list_fires_once() {
    let list = Array::new();
    let root = Value::from(Object::new().with("list", list.clone()));
    let (cb, log) = recorder();
    watch(&root, "list", &cb);

    list.push(1);
    assert_eq!(log.borrow().len(), 1);
    let (new, old) = log.borrow()[0].clone();
    assert_eq!(new.get("0"), Value::from(1));
    assert_eq!(new.get("length"), Value::from(1));
    assert_eq!(old.get("length"), Value::from(0));
}

#[test]
fn watching_an_index_path() {
    let list = Array::from_values(["a", "b"]);
    let root = Value::from(Object::new().with("list", list.clone()));
    let (cb, log) = recorder();
    watch(&root, "list.1", &cb);

    list.unshift([Value::from("z")]);
    assert_eq!(*log.borrow(), vec![(Value::from("a"), Value::from("b"))]);
}

// ── Comparison rules ────────────────────────────────────────────────────

#[test]
fn core_fires_by_reference_while_paths_compare_structurally() {
    let root = Value::from(Object::new().with("cfg", Object::new().with("v", 1)));
    let key_hits = Rc::new(Cell::new(0));
    let hits = Rc::clone(&key_hits);
    observe(&root, "cfg", &Callback::new(move |_| hits.set(hits.get() + 1)));
    let (cb, log) = recorder();
    watch(&root, "cfg", &cb);

    assign(&root, "cfg", Object::new().with("v", 1));
    assert_eq!(key_hits.get(), 1);
    assert!(log.borrow().is_empty());
}

// ── Lifecycle ───────────────────────────────────────────────────────────

#[test]
fn watch_then_unwatch_restores_empty_registries() {
    let root = Value::from(
        Object::new().with("a", Object::new().with("b", Object::new().with("c", 1))),
    );
    let (cb, _) = recorder();
    watch(&root, "a.b.c", &cb);
    assert!(observed_object_count() >= 3);

    unwatch(&root, "a.b.c", &cb);
    assert_eq!(observed_object_count(), 0);
    assert_eq!(watched_object_count(), 0);
    assert_eq!(interceptor_count(), 0);
}

#[test]
fn unwatch_from_inside_a_callback_is_safe() {
    let root = Value::from(Object::new().with("a", 1));
    let hits = Rc::new(Cell::new(0));
    let slot: Rc<RefCell<Option<WatchCallback>>> = Rc::new(RefCell::new(None));

    let target = root.clone();
    let own = Rc::clone(&slot);
    let counter = Rc::clone(&hits);
    let cb = WatchCallback::new(move |_, _| {
        counter.set(counter.get() + 1);
        if let Some(me) = own.borrow().as_ref() {
            unwatch(&target, "a", me);
        }
    });
    *slot.borrow_mut() = Some(cb.clone());
    watch(&root, "a", &cb);

    assign(&root, "a", 2);
    assign(&root, "a", 3);
    assert_eq!(hits.get(), 1);
    assert_eq!(watched_object_count(), 0);
}

#[test]
fn dropped_roots_are_swept_without_computed_keys() {
    let unrelated = Value::from(Object::new().with("n", 0));
    let (cb, _log) = recorder();
    {
        let roots: Vec<Value> = (0..100)
            .map(|i| Value::from(Object::new().with("a", Object::new().with("b", i))))
            .collect();
        for root in &roots {
            watch(root, "a.b", &cb);
        }
        run_microtasks();
        assert_eq!(watched_object_count(), 100);
        assert_eq!(observed_object_count(), 200);
    }
    assert_eq!(watched_object_count(), 100);

    assign(&unrelated, "n", 1);
    run_microtasks();
    assert_eq!(watched_object_count(), 0);
    assert_eq!(observed_object_count(), 0);
    assert_eq!(interceptor_count(), 0);
}

#[test]
fn a_new_watch_sweeps_earlier_dead_roots() {
    let (cb, _log) = recorder();
    let dead = Value::from(Object::new().with("a", Object::new().with("b", 1)));
    watch(&dead, "a.b", &cb);
    run_microtasks();
    drop(dead);

    let live = Value::from(Object::new().with("a", Object::new().with("b", 2)));
    watch(&live, "a.b", &cb);
    run_microtasks();
    assert_eq!(watched_object_count(), 1);
    assert_eq!(observed_object_count(), 2);
}

// ── Cycle guard ─────────────────────────────────────────────────────────

#[derive(Default)]
struct ErrorCapture {
    messages: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for ErrorCapture
where
    S: Subscriber + for<'lookup> tracing_subscriber::registry::LookupSpan<'lookup>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() != tracing::Level::ERROR {
            return;
        }
        struct Msg(Option<String>);
        impl tracing::field::Visit for Msg {
            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                if field.name() == "message" {
                    self.0 = Some(format!("{value:?}"));
                }
            }
        }
        let mut msg = Msg(None);
        event.record(&mut msg);
        if let Some(message) = msg.0 {
            self.messages.lock().expect("capture lock").push(message);
        }
    }
}

/// A computed key whose observer changes the getter's input and asks for
/// another check every time it fires.
fn feedback_loop() -> (Value, Rc<Cell<f64>>, Rc<Cell<u32>>) {
    let counter = Rc::new(Cell::new(0.0));
    let read = Rc::clone(&counter);
    let object = Value::from(Object::new().with_getter("c", move |_| Value::from(read.get())));
    let hits = Rc::new(Cell::new(0u32));
    let seen = Rc::clone(&hits);
    let bump = Rc::clone(&counter);
    observe(
        &object,
        "c",
        &Callback::new(move |_| {
            seen.set(seen.get() + 1);
            bump.set(bump.get() + 1.0);
            refresh();
        }),
    );
    run_microtasks();
    (object, counter, hits)
}

fn capture_errors() -> (Arc<Mutex<Vec<String>>>, tracing::subscriber::DefaultGuard) {
    let messages = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::registry().with(ErrorCapture {
        messages: Arc::clone(&messages),
    });
    (messages, tracing::subscriber::set_default(subscriber))
}

#[test]
fn feedback_loop_is_stopped_and_logged() {
    let (messages, _guard) = capture_errors();
    let (_object, counter, hits) = feedback_loop();
    assert_eq!(hits.get(), 0);

    counter.set(1.0);
    refresh();
    assert_eq!(run_microtasks(), 1);
    // One pass plus ten re-runs, then the bound trips.
    assert_eq!(hits.get(), 11);
    assert_eq!(check_aborts_total(), 1);
    assert!(!is_check_pending());

    let messages = messages.lock().expect("capture lock");
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("did not settle"));
}

#[test]
fn scheduler_recovers_after_the_bound_trips() {
    let (_messages, _guard) = capture_errors();
    let (_object, counter, hits) = feedback_loop();
    counter.set(1.0);
    refresh();
    run_microtasks();
    let after_first = hits.get();

    counter.set(100.0);
    refresh();
    assert!(is_check_pending());
    run_microtasks();
    assert_eq!(hits.get(), after_first * 2);
    assert_eq!(check_aborts_total(), 2);
}

#[test]
fn cycle_bound_is_configurable() {
    set_scheduler_config(SchedulerConfig::default().with_max_check_cycles(2));
    let (messages, _guard) = capture_errors();
    let (_object, counter, hits) = feedback_loop();

    counter.set(1.0);
    refresh();
    assert_eq!(run_microtasks(), 1);
    assert_eq!(hits.get(), 3);
    assert_eq!(check_aborts_total(), 1);
    assert_eq!(messages.lock().expect("capture lock").len(), 1);
}
