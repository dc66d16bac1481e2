//! QuickJS engine
//!
//! Embedded JavaScript runtime via `rquickjs`. Input bindings become global
//! variables; outputs are read back from global properties, so scripts
//! publish results with top-level `var name = ...` or bare assignment.
//!
//! Engine values without a host representation (objects, functions) cross
//! the boundary as [`ObjectRef`]s into a hidden registry object, so a later
//! script in the same instance gets the very same object back.

use jembed_core::{
    BindingSet, BindingValue, BridgeError, Engine, EngineConfig, EngineInstance, NumericMatrix,
    NumericVector, ObjectRef, OutputShape, Result, Script, StartFailure, WindowId, WindowRequests,
    WindowSpec,
};
use rquickjs::convert::Coerced;
use rquickjs::function::{Opt, Rest};
use rquickjs::{Array, CatchResultExt, Context, Ctx, Function, Object, Runtime, Value};

const PRELUDE: &str = include_str!("prelude.js");
const REGISTRY: &str = "__jembed_objects";

/// Largest integer magnitude a JS number holds exactly (2^53).
const MAX_SAFE_INTEGER: u64 = 1 << 53;

/// Script engine names this engine answers to
const ENGINE_NAMES: &[&str] = &["javascript", "js", "quickjs", "ecmascript"];

/// Factory for QuickJS runtime instances
#[derive(Debug, Default, Clone, Copy)]
pub struct QuickJsEngine;

impl QuickJsEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Engine for QuickJsEngine {
    type Instance = QuickJsInstance;

    fn name(&self) -> &'static str {
        "quickjs"
    }

    fn start_instance(&self, config: &EngineConfig) -> Result<QuickJsInstance> {
        let requested = config.script_engine.to_ascii_lowercase();
        if !ENGINE_NAMES.contains(&requested.as_str()) {
            return Err(StartFailure::EngineUnavailable(format!(
                "no script engine named '{}'",
                config.script_engine
            ))
            .into());
        }
        QuickJsInstance::new()
    }
}

struct State {
    runtime: Runtime,
    context: Context,
}

/// Running QuickJS runtime with one full context
pub struct QuickJsInstance {
    state: Option<State>,
    next_object: u64,
}

fn unavailable(err: rquickjs::Error) -> BridgeError {
    StartFailure::EngineUnavailable(err.to_string()).into()
}

impl QuickJsInstance {
    pub fn new() -> Result<Self> {
        let runtime = Runtime::new().map_err(unavailable)?;
        let context = Context::full(&runtime).map_err(unavailable)?;

        context.with(|ctx| -> rquickjs::Result<()> {
            let print_fn = Function::new(ctx.clone(), |parts: Rest<Coerced<String>>| {
                let line = parts
                    .0
                    .into_iter()
                    .map(|part| part.0)
                    .collect::<Vec<_>>()
                    .join(" ");
                tracing::debug!(target: "jembed::script", "{line}");
                println!("{line}");
            })?;
            ctx.globals().set("print", print_fn)?;
            ctx.eval::<(), _>(PRELUDE)?;
            Ok(())
        })
        .map_err(unavailable)?;

        Ok(Self {
            state: Some(State { runtime, context }),
            next_object: 0,
        })
    }

    fn state(&self) -> Result<&State> {
        self.state.as_ref().ok_or(BridgeError::RuntimeNotActive)
    }
}

impl EngineInstance for QuickJsInstance {
    fn evaluate(
        &mut self,
        script: &Script,
        inputs: &BindingSet,
        outputs: &mut BindingSet,
    ) -> Result<BindingValue> {
        let next_object = &mut self.next_object;
        let state = self.state.as_ref().ok_or(BridgeError::RuntimeNotActive)?;

        state.context.with(|ctx| {
            let globals = ctx.globals();
            let registry: Object = globals
                .get(REGISTRY)
                .map_err(|e| BridgeError::evaluation(format!("object registry missing: {e}")))?;
            let mut marshal = Marshal {
                ctx: &ctx,
                registry,
                next_object,
            };

            for (name, value) in inputs.iter() {
                let js = marshal.to_js(name, value)?;
                globals
                    .set(name, js)
                    .map_err(|e| BridgeError::marshal(name, e.to_string()))?;
            }

            let result: Value = ctx
                .eval::<Value, _>(script.source())
                .catch(&ctx)
                .map_err(|e| BridgeError::evaluation(format!("{}: {e}", script.name())))?;

            // Read everything first so a failed read leaves `outputs` intact
            let mut staged = Vec::with_capacity(outputs.len());
            for (name, slot) in outputs.iter() {
                let js: Value = globals
                    .get(name)
                    .map_err(|e| BridgeError::marshal(name, e.to_string()))?;
                staged.push(marshal.from_js(name, js, slot.shape())?);
            }
            for ((_, slot), value) in outputs.iter_mut().zip(staged) {
                *slot = value;
            }

            marshal.from_js("<result>", result, OutputShape::Any)
        })
    }

    fn activate_gui_integration(&mut self, windows: WindowRequests) -> Result<()> {
        let state = self.state()?;
        state
            .context
            .with(|ctx| install_gui(&ctx, windows))
            .map_err(|e| BridgeError::evaluation(format!("gui integration failed: {e}")))?;
        tracing::debug!("quickjs gui integration active");
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        let state = self.state.take().ok_or(BridgeError::RuntimeNotActive)?;
        state.runtime.run_gc();
        Ok(())
    }

    fn release(&mut self, handle: ObjectRef) -> Result<bool> {
        let state = self.state()?;
        state
            .context
            .with(|ctx| -> rquickjs::Result<bool> {
                let registry: Object = ctx.globals().get(REGISTRY)?;
                let key = handle.0.to_string();
                if !registry.contains_key(key.as_str())? {
                    return Ok(false);
                }
                registry.remove(key.as_str())?;
                Ok(true)
            })
            .map_err(|e| BridgeError::evaluation(format!("object registry: {e}")))
    }
}

fn window_spec(title: String, width: Option<u32>, height: Option<u32>) -> WindowSpec {
    let defaults = WindowSpec::default();
    WindowSpec::new(title).with_size(
        width.unwrap_or(defaults.width),
        height.unwrap_or(defaults.height),
    )
}

/// Expose the `gui` global that turns script calls into window requests.
fn install_gui<'js>(ctx: &Ctx<'js>, windows: WindowRequests) -> rquickjs::Result<()> {
    let gui = Object::new(ctx.clone())?;

    let requests = windows.clone();
    gui.set(
        "createWindow",
        Function::new(
            ctx.clone(),
            move |title: Coerced<String>, width: Opt<u32>, height: Opt<u32>| -> f64 {
                requests.open(window_spec(title.0, width.0, height.0)).0 as f64
            },
        )?,
    )?;

    let requests = windows.clone();
    gui.set(
        "showWindow",
        Function::new(
            ctx.clone(),
            move |title: Coerced<String>, width: Opt<u32>, height: Opt<u32>| -> f64 {
                let spec = window_spec(title.0, width.0, height.0).visible(true);
                requests.open(spec).0 as f64
            },
        )?,
    )?;

    let requests = windows.clone();
    gui.set(
        "setVisible",
        Function::new(ctx.clone(), move |id: f64, visible: bool| {
            requests.set_visible(WindowId(id as u64), visible);
        })?,
    )?;

    let requests = windows.clone();
    gui.set(
        "closeWindow",
        Function::new(ctx.clone(), move |id: f64| {
            requests.close(WindowId(id as u64));
        })?,
    )?;

    gui.set(
        "quit",
        Function::new(ctx.clone(), move || {
            windows.quit();
        })?,
    )?;

    ctx.globals().set("gui", gui)
}

/// Converts binding values for one evaluation
struct Marshal<'a, 'js> {
    ctx: &'a Ctx<'js>,
    registry: Object<'js>,
    next_object: &'a mut u64,
}

impl<'a, 'js> Marshal<'a, 'js> {
    fn to_js(&mut self, name: &str, value: &BindingValue) -> Result<Value<'js>> {
        let ctx = self.ctx.clone();
        let js_err = |e: rquickjs::Error| BridgeError::marshal(name, e.to_string());

        Ok(match value {
            BindingValue::Null => Value::new_null(ctx),
            BindingValue::Bool(b) => Value::new_bool(ctx, *b),
            BindingValue::Int(i) => {
                if let Ok(small) = i32::try_from(*i) {
                    Value::new_int(ctx, small)
                } else if i.unsigned_abs() <= MAX_SAFE_INTEGER {
                    Value::new_float(ctx, *i as f64)
                } else {
                    return Err(BridgeError::marshal(
                        name,
                        format!("integer {i} exceeds the engine's exact integer range"),
                    ));
                }
            }
            BindingValue::Float(x) => Value::new_float(ctx, *x),
            BindingValue::Text(s) => rquickjs::String::from_str(ctx, s)
                .map_err(js_err)?
                .into_value(),
            BindingValue::Object(handle) => {
                let object: Value = self
                    .registry
                    .get(handle.0.to_string())
                    .map_err(js_err)?;
                if object.is_undefined() {
                    return Err(BridgeError::marshal(
                        name,
                        format!("unknown object reference #{}", handle.0),
                    ));
                }
                object
            }
            BindingValue::Vector(v) => number_array(&ctx, &v.to_f64_vec())
                .map_err(js_err)?
                .into_value(),
            BindingValue::Matrix(m) => {
                let rows = Array::new(ctx.clone()).map_err(js_err)?;
                for (i, row) in m.to_f64_rows().iter().enumerate() {
                    rows.set(i, number_array(&ctx, row).map_err(js_err)?)
                        .map_err(js_err)?;
                }
                rows.into_value()
            }
        })
    }

    fn from_js(&mut self, name: &str, value: Value<'js>, shape: OutputShape) -> Result<BindingValue> {
        if value.is_undefined() || value.is_null() {
            return Ok(BindingValue::Null);
        }

        let wrong = |value: &Value<'js>| mismatch(name, shape, value);

        match shape {
            OutputShape::Any => self.infer(name, value),
            OutputShape::Bool => value.as_bool().map(BindingValue::Bool).ok_or_else(|| wrong(&value)),
            OutputShape::Int => match value.as_number() {
                Some(x) if x.fract() == 0.0 && x.abs() <= MAX_SAFE_INTEGER as f64 => {
                    Ok(BindingValue::Int(x as i64))
                }
                _ => Err(wrong(&value)),
            },
            OutputShape::Float => value
                .as_number()
                .map(BindingValue::Float)
                .ok_or_else(|| wrong(&value)),
            OutputShape::Text => match value.as_string() {
                Some(s) => Ok(BindingValue::Text(
                    s.to_string().map_err(|e| BridgeError::marshal(name, e.to_string()))?,
                )),
                None => Err(wrong(&value)),
            },
            OutputShape::Object => Ok(BindingValue::Object(self.register(name, value)?)),
            OutputShape::Vector(element) => {
                let numbers = value
                    .as_array()
                    .and_then(numbers_of)
                    .ok_or_else(|| wrong(&value))?;
                NumericVector::from_f64s(element, &numbers)
                    .map(BindingValue::Vector)
                    .map_err(|e| BridgeError::marshal(name, e.to_string()))
            }
            OutputShape::Matrix(element) => {
                let rows = value
                    .as_array()
                    .and_then(rows_of)
                    .ok_or_else(|| wrong(&value))?;
                NumericMatrix::from_f64_rows(element, &rows)
                    .map(BindingValue::Matrix)
                    .map_err(|e| BridgeError::marshal(name, e.to_string()))
            }
        }
    }

    fn infer(&mut self, name: &str, value: Value<'js>) -> Result<BindingValue> {
        if let Some(b) = value.as_bool() {
            return Ok(BindingValue::Bool(b));
        }
        if let Some(i) = value.as_int() {
            return Ok(BindingValue::Int(i64::from(i)));
        }
        if let Some(x) = value.as_float() {
            return Ok(BindingValue::Float(x));
        }
        if let Some(s) = value.as_string() {
            let text = s
                .to_string()
                .map_err(|e| BridgeError::marshal(name, e.to_string()))?;
            return Ok(BindingValue::Text(text));
        }
        if let Some(array) = value.as_array() {
            if let Some(numbers) = numbers_of(array) {
                return Ok(BindingValue::Vector(NumericVector::Double(numbers)));
            }
            if let Some(rows) = rows_of(array) {
                return Ok(BindingValue::Matrix(NumericMatrix::Double(rows)));
            }
        }
        Ok(BindingValue::Object(self.register(name, value)?))
    }

    fn register(&mut self, name: &str, value: Value<'js>) -> Result<ObjectRef> {
        if !(value.is_object() || value.is_function() || value.is_array() || value.is_symbol()) {
            return Err(mismatch(name, OutputShape::Object, &value));
        }
        *self.next_object += 1;
        let id = *self.next_object;
        self.registry
            .set(id.to_string(), value)
            .map_err(|e| BridgeError::marshal(name, e.to_string()))?;
        tracing::trace!(name, id, "registered engine object");
        Ok(ObjectRef(id))
    }
}

fn mismatch(name: &str, expected: OutputShape, found: &Value<'_>) -> BridgeError {
    BridgeError::marshal(name, format!("expected {expected}, found {}", describe(found)))
}

fn describe(value: &Value<'_>) -> &'static str {
    if value.is_bool() {
        "bool"
    } else if value.is_number() {
        "number"
    } else if value.is_string() {
        "string"
    } else if value.is_array() {
        "array"
    } else if value.is_function() {
        "function"
    } else if value.is_object() {
        "object"
    } else {
        "unsupported value"
    }
}

/// Number as an int when it is one, so scripts see `1` rather than `1.0`.
/// `-0.0` stays a float to keep its sign.
fn number<'js>(ctx: &Ctx<'js>, x: f64) -> Value<'js> {
    let negative_zero = x == 0.0 && x.is_sign_negative();
    match i32::try_from(x as i64) {
        Ok(i) if x.fract() == 0.0 && x.is_finite() && !negative_zero => {
            Value::new_int(ctx.clone(), i)
        }
        _ => Value::new_float(ctx.clone(), x),
    }
}

fn number_array<'js>(ctx: &Ctx<'js>, values: &[f64]) -> rquickjs::Result<Array<'js>> {
    let array = Array::new(ctx.clone())?;
    for (i, &x) in values.iter().enumerate() {
        array.set(i, number(ctx, x))?;
    }
    Ok(array)
}

fn numbers_of(array: &Array<'_>) -> Option<Vec<f64>> {
    (0..array.len())
        .map(|i| array.get::<Value>(i).ok().and_then(|v| v.as_number()))
        .collect()
}

fn rows_of(array: &Array<'_>) -> Option<Vec<Vec<f64>>> {
    (0..array.len())
        .map(|i| {
            let row: Value = array.get(i).ok()?;
            numbers_of(row.as_array()?)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use jembed_core::ElementType;

    fn eval(instance: &mut QuickJsInstance, source: &str) -> BindingValue {
        instance
            .evaluate(&Script::inline(source), &BindingSet::new(), &mut BindingSet::new())
            .unwrap()
    }

    #[test]
    fn test_prelude_format() {
        let mut js = QuickJsInstance::new().unwrap();
        assert_eq!(
            eval(&mut js, r#"format("%s has %d items (%.2f%%)", "cart", 3.9, 12.345)"#),
            BindingValue::from("cart has 3 items (12.35%)")
        );
        assert_eq!(eval(&mut js, r#"format("%f", 1.5)"#), BindingValue::from("1.500000"));
        assert_eq!(eval(&mut js, "abs(-2.5)"), BindingValue::Float(2.5));
    }

    #[test]
    fn test_result_inference() {
        let mut js = QuickJsInstance::new().unwrap();
        assert_eq!(eval(&mut js, "1 + 1"), BindingValue::Int(2));
        assert_eq!(eval(&mut js, "0.5 * 3"), BindingValue::Float(1.5));
        assert_eq!(eval(&mut js, "true"), BindingValue::Bool(true));
        assert_eq!(eval(&mut js, "undefined"), BindingValue::Null);
        assert_eq!(eval(&mut js, "[1, 2.5]"), BindingValue::from(vec![1.0, 2.5]));
        assert_eq!(
            eval(&mut js, "[[1], [2, 3]]"),
            BindingValue::from(vec![vec![1.0], vec![2.0, 3.0]])
        );
        assert!(matches!(eval(&mut js, "({ a: 1 })"), BindingValue::Object(_)));
        assert!(matches!(eval(&mut js, "[]"), BindingValue::Vector(v) if v.is_empty()));
    }

    #[test]
    fn test_registry_is_hidden() {
        let mut js = QuickJsInstance::new().unwrap();
        assert_eq!(
            eval(&mut js, "Object.keys(globalThis).includes('__jembed_objects')"),
            BindingValue::Bool(false)
        );
    }

    #[test]
    fn test_number_keeps_integers() {
        let rt = Runtime::new().unwrap();
        let context = Context::full(&rt).unwrap();
        context.with(|ctx| {
            assert!(number(&ctx, 3.0).is_int());
            assert!(number(&ctx, 3.5).is_float());
            assert!(number(&ctx, 1e12).is_float());
            assert!(number(&ctx, f64::NAN).is_float());
            assert!(number(&ctx, 0.0).is_int());
            assert!(number(&ctx, -0.0).is_float());
        });
    }

    #[test]
    fn test_negative_zero_keeps_its_sign() {
        let mut js = QuickJsInstance::new().unwrap();
        let inputs = BindingSet::new().with("v", vec![-0.0, 0.0]);
        let mut outputs = BindingSet::new().with("w", NumericVector::empty(ElementType::Double));
        js.evaluate(&Script::inline("var w = v.slice();"), &inputs, &mut outputs)
            .unwrap();
        match outputs.get("w") {
            Some(BindingValue::Vector(NumericVector::Double(w))) => {
                assert!(w[0] == 0.0 && w[0].is_sign_negative());
                assert!(!w[1].is_sign_negative());
            }
            other => panic!("unexpected read-back: {other:?}"),
        }
    }

    #[test]
    fn test_release_forgets_the_object() {
        let mut js = QuickJsInstance::new().unwrap();
        let handle = eval(&mut js, "({ n: 7 })").as_object().unwrap();
        let inputs = BindingSet::new().with("o", handle);
        let n = js
            .evaluate(&Script::inline("o.n"), &inputs, &mut BindingSet::new())
            .unwrap();
        assert_eq!(n, BindingValue::Int(7));

        assert!(js.release(handle).unwrap());
        assert!(!js.release(handle).unwrap());
        let err = js
            .evaluate(&Script::inline("o.n"), &inputs, &mut BindingSet::new())
            .unwrap_err();
        assert!(matches!(err, BridgeError::BindingMarshal { .. }));
    }

    #[test]
    fn test_unknown_script_engine() {
        let config = EngineConfig {
            script_engine: "python".into(),
            ..EngineConfig::default()
        };
        let err = QuickJsEngine.start_instance(&config).err().unwrap();
        assert!(matches!(
            err,
            BridgeError::RuntimeStart(StartFailure::EngineUnavailable(_))
        ));
    }

    #[test]
    fn test_evaluate_after_shutdown() {
        let mut js = QuickJsInstance::new().unwrap();
        js.shutdown().unwrap();
        let err = js
            .evaluate(&Script::inline("1"), &BindingSet::new(), &mut BindingSet::new())
            .unwrap_err();
        assert!(matches!(err, BridgeError::RuntimeNotActive));
        assert!(matches!(js.shutdown(), Err(BridgeError::RuntimeNotActive)));
    }

    #[test]
    fn test_element_type_is_kept() {
        let mut js = QuickJsInstance::new().unwrap();
        let inputs = BindingSet::new().with("v", vec![1u32, 2, 3]);
        let mut outputs = BindingSet::new().with("w", NumericVector::empty(ElementType::UInt));
        js.evaluate(&Script::inline("var w = v.map(x => x * 2);"), &inputs, &mut outputs)
            .unwrap();
        assert_eq!(outputs.get("w"), Some(&BindingValue::from(vec![2u32, 4, 6])));
    }
}
