//! Headless adapter running on the QuickJS engine

use jembed_core::{
    BindingSet, BindingValue, BridgeError, EngineConfig, EngineInstance, HeadlessApp, ObjectRef,
    Script, StartFailure,
};
use jembed_script::{QuickJsEngine, QuickJsInstance};
use parking_lot::{Mutex, MutexGuard};

// One runtime per process: tests in this binary take turns.
static SERIAL: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock()
}

fn app() -> HeadlessApp<QuickJsEngine> {
    let config = EngineConfig {
        echo_result: false,
        ..EngineConfig::default()
    };
    HeadlessApp::new(&QuickJsEngine, &config).unwrap()
}

#[test]
fn test_hello_world() {
    let _guard = serial();
    let mut app = app();

    let inputs = BindingSet::new().with("greetee", "world");
    let result = app
        .start(r#"format("Hello, %s!", greetee);"#, &inputs, &mut BindingSet::new())
        .unwrap();

    assert_eq!(result, BindingValue::from("Hello, world!"));
}

#[test]
fn test_output_binding_written_back() {
    let _guard = serial();
    let mut app = app();

    let inputs = BindingSet::new().with("val", -1.5);
    let mut outputs = BindingSet::new().expect("result");
    app.start("result = abs(val)", &inputs, &mut outputs).unwrap();
    assert_eq!(outputs.get("result"), Some(&BindingValue::Float(1.5)));

    // `var` at top level publishes the same way
    let mut outputs = BindingSet::new().expect("result");
    app.start("var result = Math.abs(val);", &inputs, &mut outputs)
        .unwrap();
    assert_eq!(outputs.get("result"), Some(&BindingValue::Float(1.5)));
}

#[test]
fn test_unassigned_output_becomes_null() {
    let _guard = serial();
    let mut app = app();

    let mut outputs = BindingSet::new().with("never_set", 3);
    app.start("1", &BindingSet::new(), &mut outputs).unwrap();
    assert_eq!(outputs.get("never_set"), Some(&BindingValue::Null));
}

#[test]
fn test_second_runtime_is_refused() {
    let _guard = serial();
    let _first = app();

    let second = HeadlessApp::new(&QuickJsEngine, &EngineConfig::default());
    assert!(matches!(
        second.err(),
        Some(BridgeError::RuntimeStart(StartFailure::AlreadyActive))
    ));
}

#[test]
fn test_runtime_released_after_shutdown() {
    let _guard = serial();
    let mut first = app();
    first.shutdown().unwrap();

    let mut second = app();
    let value = second
        .start("6 * 7", &BindingSet::new(), &mut BindingSet::new())
        .unwrap();
    assert_eq!(value, BindingValue::Int(42));

    let err = first
        .start("1", &BindingSet::new(), &mut BindingSet::new())
        .unwrap_err();
    assert!(matches!(err, BridgeError::RuntimeNotActive));
}

#[test]
fn test_script_errors_carry_engine_message() {
    let _guard = serial();
    let mut app = app();

    let err = app
        .start(
            Script::named("thrower.js", "throw new Error('boom')"),
            &BindingSet::new(),
            &mut BindingSet::new(),
        )
        .unwrap_err();
    match err {
        BridgeError::ScriptEvaluation { message } => {
            assert!(message.starts_with("thrower.js:"), "{message}");
            assert!(message.contains("boom"), "{message}");
        }
        other => panic!("unexpected error: {other}"),
    }

    let err = app
        .start("var = ;", &BindingSet::new(), &mut BindingSet::new())
        .unwrap_err();
    assert!(matches!(err, BridgeError::ScriptEvaluation { .. }));
}

#[test]
fn test_failed_script_keeps_outputs() {
    let _guard = serial();
    let mut app = app();

    let mut outputs = BindingSet::new().with("result", 0.0);
    let err = app
        .start("result = 5; throw 'late'", &BindingSet::new(), &mut outputs)
        .unwrap_err();
    assert!(matches!(err, BridgeError::ScriptEvaluation { .. }));
    assert_eq!(outputs.get("result"), Some(&BindingValue::Float(0.0)));
}

#[test]
fn test_marshal_errors_name_the_binding() {
    let _guard = serial();
    let mut app = app();

    let huge = BindingSet::new().with("huge", i64::MAX);
    let err = app.start("huge", &huge, &mut BindingSet::new()).unwrap_err();
    assert!(matches!(err, BridgeError::BindingMarshal { ref name, .. } if name == "huge"));

    let mut outputs = BindingSet::new().with("count", 0);
    let err = app
        .start("var count = 'many';", &BindingSet::new(), &mut outputs)
        .unwrap_err();
    assert!(matches!(err, BridgeError::BindingMarshal { ref name, .. } if name == "count"));
    assert_eq!(outputs.get("count"), Some(&BindingValue::Int(0)));

    let stale = BindingSet::new().with("obj", ObjectRef(999));
    let err = app.start("obj", &stale, &mut BindingSet::new()).unwrap_err();
    assert!(matches!(err, BridgeError::BindingMarshal { .. }));
}

#[test]
fn test_objects_cross_as_references() {
    let _guard = serial();
    let mut app = app();

    let counter = app
        .start(
            "({ count: 41, inc() { return ++this.count; } })",
            &BindingSet::new(),
            &mut BindingSet::new(),
        )
        .unwrap();
    let handle = counter.as_object().expect("object reference");

    let inputs = BindingSet::new().with("counter", handle);
    let next = app.start("counter.inc()", &inputs, &mut BindingSet::new()).unwrap();
    assert_eq!(next, BindingValue::Int(42));

    let mut outputs = BindingSet::new().with("same", false);
    app.start("var same = counter.count === 42;", &inputs, &mut outputs)
        .unwrap();
    assert_eq!(outputs.get("same"), Some(&BindingValue::Bool(true)));
}

#[test]
fn test_print_is_available() {
    let _guard = serial();
    let mut app = app();
    let value = app
        .start("print('from script', 1, true); 'done'", &BindingSet::new(), &mut BindingSet::new())
        .unwrap();
    assert_eq!(value, BindingValue::from("done"));
}

mod visibility {
    use super::*;
    use proptest::prelude::*;

    // Instances are used directly here: no process-wide slot is involved.
    fn round_trip(value: BindingValue) -> BindingValue {
        let mut js = QuickJsInstance::new().unwrap();
        let template = match value {
            BindingValue::Int(_) => BindingValue::Int(0),
            BindingValue::Float(_) => BindingValue::Float(0.0),
            _ => BindingValue::Null,
        };
        let inputs = BindingSet::new().with("k", value);
        let mut outputs = BindingSet::new().with("seen", template);
        js.evaluate(&Script::inline("var seen = k;"), &inputs, &mut outputs)
            .unwrap();
        outputs.get("seen").cloned().unwrap()
    }

    proptest! {
        #[test]
        fn strings_are_visible(s in "\\PC*") {
            prop_assert_eq!(round_trip(BindingValue::from(s.clone())), BindingValue::Text(s));
        }

        #[test]
        fn floats_are_visible(x in -1.0e12f64..1.0e12) {
            prop_assert_eq!(round_trip(BindingValue::Float(x)), BindingValue::Float(x));
        }

        #[test]
        fn integers_are_visible(i in -(1i64 << 53)..=(1i64 << 53)) {
            prop_assert_eq!(round_trip(BindingValue::Int(i)), BindingValue::Int(i));
        }
    }
}
