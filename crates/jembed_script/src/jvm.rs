//! JVM engine
//!
//! Boots a JVM through the JNI invocation API and evaluates scripts with a
//! `javax.script.ScriptEngine` (Nashorn, Rhino or GraalJS, whichever answers
//! to [`EngineConfig::script_engine`]). Bindings go through
//! `ScriptEngine.put` / `ScriptEngine.get`.
//!
//! A process can create a JVM only once: after shutdown, starting another
//! instance fails with `StartFailure::Restart`. A failed creation does not
//! use up the slot.
//!
//! Scripts open AWT windows directly. Once GUI integration is active the
//! instance reports the showing AWT windows to the event loop.

use jembed_core::{
    BindingSet, BindingValue, BridgeError, Engine, EngineConfig, EngineInstance, NumericMatrix,
    NumericVector, ObjectRef, Result, Script, StartFailure, WindowRequests,
};
use jni::errors::Error as JniError;
use jni::objects::{
    GlobalRef, JDoubleArray, JFloatArray, JIntArray, JLongArray, JObject, JObjectArray, JString,
    JThrowable, JValue, JValueOwned,
};
use jni::{InitArgsBuilder, JNIEnv, JNIVersion, JavaVM};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

static JVM: CreationSlot = CreationSlot::new();

/// Records whether this process already created its JVM
struct CreationSlot {
    created: AtomicBool,
}

impl CreationSlot {
    const fn new() -> Self {
        Self {
            created: AtomicBool::new(false),
        }
    }

    fn check(&self) -> Result<()> {
        if self.created.load(Ordering::SeqCst) {
            return Err(StartFailure::Restart(
                "a JVM was already created in this process".to_string(),
            )
            .into());
        }
        Ok(())
    }

    fn mark(&self) {
        self.created.store(true, Ordering::SeqCst);
    }
}

/// Factory for the process JVM
#[derive(Debug, Default, Clone, Copy)]
pub struct JvmEngine;

impl Engine for JvmEngine {
    type Instance = JvmInstance;

    fn name(&self) -> &'static str {
        "jvm"
    }

    fn start_instance(&self, config: &EngineConfig) -> Result<JvmInstance> {
        JVM.check()?;

        let options = config.jvm_args();
        let mut builder = InitArgsBuilder::new().version(JNIVersion::V8);
        for option in &options {
            builder = builder.option(option.as_str());
        }
        let args = builder
            .build()
            .map_err(|e| StartFailure::EngineUnavailable(e.to_string()))?;

        let vm = JavaVM::new(args).map_err(|e| StartFailure::EngineUnavailable(e.to_string()))?;
        JVM.mark();
        tracing::info!(?options, "jvm created");

        JvmInstance::new(vm, &config.script_engine)
    }
}

/// Internal failure inside a JNI local frame
#[derive(Debug)]
enum Failure {
    Jni(JniError),
    Bridge(BridgeError),
}

impl From<JniError> for Failure {
    fn from(err: JniError) -> Self {
        Failure::Jni(err)
    }
}

impl From<BridgeError> for Failure {
    fn from(err: BridgeError) -> Self {
        Failure::Bridge(err)
    }
}

impl From<StartFailure> for Failure {
    fn from(err: StartFailure) -> Self {
        Failure::Bridge(err.into())
    }
}

impl From<Failure> for BridgeError {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::Bridge(err) => err,
            Failure::Jni(err) => BridgeError::evaluation(format!("jni: {err}")),
        }
    }
}

/// Global references handed to the host as [`ObjectRef`]s
struct ObjectTable<T = GlobalRef> {
    refs: HashMap<u64, T>,
    next: u64,
}

impl<T> Default for ObjectTable<T> {
    fn default() -> Self {
        Self {
            refs: HashMap::new(),
            next: 0,
        }
    }
}

impl<T> ObjectTable<T> {
    fn insert(&mut self, object: T) -> ObjectRef {
        self.next += 1;
        self.refs.insert(self.next, object);
        ObjectRef(self.next)
    }

    fn get(&self, handle: ObjectRef) -> Option<&T> {
        self.refs.get(&handle.0)
    }

    fn remove(&mut self, handle: ObjectRef) -> Option<T> {
        self.refs.remove(&handle.0)
    }

    fn clear(&mut self) {
        self.refs.clear();
    }
}

/// The process JVM plus one script engine
pub struct JvmInstance {
    vm: Option<JavaVM>,
    engine: Option<GlobalRef>,
    objects: ObjectTable,
    gui_active: bool,
}

impl JvmInstance {
    fn new(vm: JavaVM, engine_name: &str) -> Result<Self> {
        let engine = {
            let mut env = vm
                .attach_current_thread()
                .map_err(|e| StartFailure::EngineUnavailable(e.to_string()))?;
            env.with_local_frame(8, |env| -> std::result::Result<GlobalRef, Failure> {
                let manager = env.new_object("javax/script/ScriptEngineManager", "()V", &[])?;
                let name = env.new_string(engine_name)?;
                let engine = env
                    .call_method(
                        &manager,
                        "getEngineByName",
                        "(Ljava/lang/String;)Ljavax/script/ScriptEngine;",
                        &[JValue::from(&name)],
                    )?
                    .l()?;
                if engine.is_null() {
                    return Err(StartFailure::EngineUnavailable(format!(
                        "no script engine named '{engine_name}'"
                    ))
                    .into());
                }
                Ok(env.new_global_ref(&engine)?)
            })?
        };

        Ok(Self {
            vm: Some(vm),
            engine: Some(engine),
            objects: ObjectTable::default(),
            gui_active: false,
        })
    }
}

impl EngineInstance for JvmInstance {
    fn evaluate(
        &mut self,
        script: &Script,
        inputs: &BindingSet,
        outputs: &mut BindingSet,
    ) -> Result<BindingValue> {
        let (vm, engine) = match (&self.vm, &self.engine) {
            (Some(vm), Some(engine)) => (vm, engine),
            _ => return Err(BridgeError::RuntimeNotActive),
        };
        let objects = &mut self.objects;
        let mut env = vm.attach_current_thread().map_err(|e| BridgeError::evaluation(e.to_string()))?;
        let capacity = 16 + 4 * (inputs.len() + outputs.len()) as i32;

        let (result, staged) = env.with_local_frame(
            capacity,
            |env| -> std::result::Result<(BindingValue, Vec<BindingValue>), Failure> {
                for (name, value) in inputs.iter() {
                    let key = env.new_string(name)?;
                    let object = to_java(env, objects, name, value)?;
                    checked(
                        env,
                        engine.as_obj(),
                        "put",
                        "(Ljava/lang/String;Ljava/lang/Object;)V",
                        &[JValue::from(&key), JValue::from(&object)],
                    )?;
                }

                let source = env.new_string(script.source())?;
                let result = checked(
                    env,
                    engine.as_obj(),
                    "eval",
                    "(Ljava/lang/String;)Ljava/lang/Object;",
                    &[JValue::from(&source)],
                )
                .map_err(|failure| match failure {
                    Failure::Bridge(BridgeError::ScriptEvaluation { message }) => {
                        Failure::Bridge(BridgeError::evaluation(format!("{}: {message}", script.name())))
                    }
                    other => other,
                })?
                .l()?;
                let result = from_java(env, objects, "<result>", result)?;

                let mut staged = Vec::with_capacity(outputs.len());
                for (name, slot) in outputs.iter() {
                    let key = env.new_string(name)?;
                    let value = checked(
                        env,
                        engine.as_obj(),
                        "get",
                        "(Ljava/lang/String;)Ljava/lang/Object;",
                        &[JValue::from(&key)],
                    )?
                    .l()?;
                    staged.push(from_java(env, objects, name, value)?.conform(name, slot.shape())?);
                }
                Ok((result, staged))
            },
        )?;

        for ((_, slot), value) in outputs.iter_mut().zip(staged) {
            *slot = value;
        }
        Ok(result)
    }

    fn activate_gui_integration(&mut self, _windows: WindowRequests) -> Result<()> {
        let vm = self.vm.as_ref().ok_or(BridgeError::RuntimeNotActive)?;
        let mut env = vm.attach_current_thread().map_err(|e| BridgeError::evaluation(e.to_string()))?;
        // Scripts open AWT windows themselves; initialising the toolkit is enough
        env.with_local_frame(4, |env| -> std::result::Result<(), Failure> {
            let toolkit = env.call_static_method(
                "java/awt/Toolkit",
                "getDefaultToolkit",
                "()Ljava/awt/Toolkit;",
                &[],
            );
            match toolkit {
                Ok(_) => Ok(()),
                Err(JniError::JavaException) => Err(describe_exception(env).into()),
                Err(err) => Err(err.into()),
            }
        })?;
        self.gui_active = true;
        tracing::debug!("awt toolkit initialised");
        Ok(())
    }

    fn engine_windows(&mut self) -> Result<usize> {
        if !self.gui_active {
            return Ok(0);
        }
        let vm = self.vm.as_ref().ok_or(BridgeError::RuntimeNotActive)?;
        let mut env = vm.attach_current_thread().map_err(|e| BridgeError::evaluation(e.to_string()))?;
        let showing = env.with_local_frame(8, |env| -> std::result::Result<usize, Failure> {
            let windows = match env.call_static_method(
                "java/awt/Window",
                "getWindows",
                "()[Ljava/awt/Window;",
                &[],
            ) {
                Ok(windows) => JObjectArray::from(windows.l()?),
                Err(JniError::JavaException) => return Err(describe_exception(env).into()),
                Err(err) => return Err(err.into()),
            };
            let mut showing = 0;
            for i in 0..env.get_array_length(&windows)? {
                let window = env.get_object_array_element(&windows, i)?;
                if checked(env, &window, "isShowing", "()Z", &[])?.z()? {
                    showing += 1;
                }
                env.delete_local_ref(window)?;
            }
            Ok(showing)
        })?;
        Ok(showing)
    }

    fn release(&mut self, handle: ObjectRef) -> Result<bool> {
        if self.vm.is_none() {
            return Err(BridgeError::RuntimeNotActive);
        }
        Ok(self.objects.remove(handle).is_some())
    }

    fn shutdown(&mut self) -> Result<()> {
        let vm = self.vm.take().ok_or(BridgeError::RuntimeNotActive)?;
        // Global refs must be released while the VM is still alive
        self.objects.clear();
        self.engine = None;
        self.gui_active = false;

        // SAFETY: every GlobalRef created from this VM was dropped above and
        // `vm` is not used after this call.
        unsafe { vm.destroy() }.map_err(|e| BridgeError::Shutdown(e.to_string()))?;
        tracing::info!("jvm destroyed");
        Ok(())
    }
}

/// Call an instance method, turning a pending Java exception into a
/// `ScriptEvaluation` error carrying the exception text.
fn checked<'local>(
    env: &mut JNIEnv<'local>,
    object: &JObject<'_>,
    name: &str,
    sig: &str,
    args: &[JValue<'_, '_>],
) -> std::result::Result<JValueOwned<'local>, Failure> {
    match env.call_method(object, name, sig, args) {
        Ok(value) => Ok(value),
        Err(JniError::JavaException) => Err(describe_exception(env).into()),
        Err(err) => Err(err.into()),
    }
}

fn describe_exception(env: &mut JNIEnv<'_>) -> BridgeError {
    let throwable: JThrowable = match env.exception_occurred() {
        Ok(throwable) => throwable,
        Err(err) => return BridgeError::evaluation(format!("java exception: {err}")),
    };
    let _ = env.exception_clear();

    let message = env
        .call_method(&throwable, "toString", "()Ljava/lang/String;", &[])
        .and_then(|text| text.l())
        .and_then(|text| {
            let text = JString::from(text);
            env.get_string(&text).map(String::from)
        });
    match message {
        Ok(message) => BridgeError::evaluation(message),
        Err(err) => BridgeError::evaluation(format!("java exception (no message: {err})")),
    }
}

fn boxed<'local>(
    env: &mut JNIEnv<'local>,
    class: &str,
    sig: &str,
    value: JValue<'_, '_>,
) -> std::result::Result<JObject<'local>, Failure> {
    Ok(env.new_object(class, sig, &[value])?)
}

fn to_java<'local>(
    env: &mut JNIEnv<'local>,
    objects: &ObjectTable,
    name: &str,
    value: &BindingValue,
) -> std::result::Result<JObject<'local>, Failure> {
    match value {
        BindingValue::Null => Ok(JObject::null()),
        BindingValue::Bool(b) => boxed(env, "java/lang/Boolean", "(Z)V", JValue::Bool(u8::from(*b))),
        BindingValue::Int(i) => match i32::try_from(*i) {
            Ok(small) => boxed(env, "java/lang/Integer", "(I)V", JValue::Int(small)),
            Err(_) => boxed(env, "java/lang/Long", "(J)V", JValue::Long(*i)),
        },
        BindingValue::Float(x) => boxed(env, "java/lang/Double", "(D)V", JValue::Double(*x)),
        BindingValue::Text(s) => Ok(env.new_string(s)?.into()),
        BindingValue::Object(handle) => {
            let global = objects.get(*handle).ok_or_else(|| {
                BridgeError::marshal(name, format!("unknown object reference #{}", handle.0))
            })?;
            Ok(env.new_local_ref(global.as_obj())?)
        }
        BindingValue::Vector(v) => primitive_array(env, v),
        BindingValue::Matrix(m) => {
            let (rows, class) = match m {
                NumericMatrix::Double(rows) => (rows.len(), "[D"),
                NumericMatrix::Float(rows) => (rows.len(), "[F"),
                NumericMatrix::Int(rows) => (rows.len(), "[I"),
                NumericMatrix::UInt(rows) => (rows.len(), "[J"),
            };
            let outer = env.new_object_array(rows as i32, class, JObject::null())?;
            for (i, row) in m.to_f64_rows().into_iter().enumerate() {
                let row = NumericVector::from_f64s(m.element_type(), &row)
                    .map_err(|e| BridgeError::marshal(name, e.to_string()))?;
                let row = primitive_array(env, &row)?;
                env.set_object_array_element(&outer, i as i32, &row)?;
            }
            Ok(outer.into())
        }
    }
}

/// `double[]`, `float[]`, `int[]`; unsigned values widen to `long[]`.
fn primitive_array<'local>(
    env: &mut JNIEnv<'local>,
    vector: &NumericVector,
) -> std::result::Result<JObject<'local>, Failure> {
    let len = vector.len() as i32;
    Ok(match vector {
        NumericVector::Double(values) => {
            let array = env.new_double_array(len)?;
            env.set_double_array_region(&array, 0, values)?;
            array.into()
        }
        NumericVector::Float(values) => {
            let array = env.new_float_array(len)?;
            env.set_float_array_region(&array, 0, values)?;
            array.into()
        }
        NumericVector::Int(values) => {
            let array = env.new_int_array(len)?;
            env.set_int_array_region(&array, 0, values)?;
            array.into()
        }
        NumericVector::UInt(values) => {
            let widened: Vec<i64> = values.iter().map(|&x| i64::from(x)).collect();
            let array = env.new_long_array(len)?;
            env.set_long_array_region(&array, 0, &widened)?;
            array.into()
        }
    })
}

/// Read a primitive array back as a vector, `None` when it is not one.
fn read_primitive_array(
    env: &mut JNIEnv<'_>,
    object: &JObject<'_>,
) -> std::result::Result<Option<NumericVector>, Failure> {
    if env.is_instance_of(object, "[D")? {
        let array = JDoubleArray::from(env.new_local_ref(object)?);
        let mut buf = vec![0.0; env.get_array_length(&array)? as usize];
        env.get_double_array_region(&array, 0, &mut buf)?;
        return Ok(Some(NumericVector::Double(buf)));
    }
    if env.is_instance_of(object, "[F")? {
        let array = JFloatArray::from(env.new_local_ref(object)?);
        let mut buf = vec![0.0f32; env.get_array_length(&array)? as usize];
        env.get_float_array_region(&array, 0, &mut buf)?;
        return Ok(Some(NumericVector::Float(buf)));
    }
    if env.is_instance_of(object, "[I")? {
        let array = JIntArray::from(env.new_local_ref(object)?);
        let mut buf = vec![0i32; env.get_array_length(&array)? as usize];
        env.get_int_array_region(&array, 0, &mut buf)?;
        return Ok(Some(NumericVector::Int(buf)));
    }
    if env.is_instance_of(object, "[J")? {
        let array = JLongArray::from(env.new_local_ref(object)?);
        let mut buf = vec![0i64; env.get_array_length(&array)? as usize];
        env.get_long_array_region(&array, 0, &mut buf)?;
        let values: Vec<f64> = buf.iter().map(|&x| x as f64).collect();
        return Ok(Some(NumericVector::Double(values)));
    }
    Ok(None)
}

fn from_java(
    env: &mut JNIEnv<'_>,
    objects: &mut ObjectTable,
    name: &str,
    object: JObject<'_>,
) -> std::result::Result<BindingValue, Failure> {
    if object.is_null() {
        return Ok(BindingValue::Null);
    }
    if env.is_instance_of(&object, "java/lang/Boolean")? {
        let b = checked(env, &object, "booleanValue", "()Z", &[])?.z()?;
        return Ok(BindingValue::Bool(b));
    }
    if env.is_instance_of(&object, "java/lang/String")? {
        let text = JString::from(object);
        let text: String = env.get_string(&text)?.into();
        return Ok(BindingValue::Text(text));
    }
    if env.is_instance_of(&object, "java/lang/Number")? {
        let integral = ["java/lang/Integer", "java/lang/Long", "java/lang/Short", "java/lang/Byte"];
        for class in integral {
            if env.is_instance_of(&object, class)? {
                let i = checked(env, &object, "longValue", "()J", &[])?.j()?;
                return Ok(BindingValue::Int(i));
            }
        }
        let x = checked(env, &object, "doubleValue", "()D", &[])?.d()?;
        return Ok(BindingValue::Float(x));
    }
    if let Some(vector) = read_primitive_array(env, &object)? {
        return Ok(BindingValue::Vector(vector));
    }
    for class in ["[[D", "[[F", "[[I", "[[J"] {
        if env.is_instance_of(&object, class)? {
            return read_matrix(env, name, object);
        }
    }

    let global = env.new_global_ref(&object)?;
    Ok(BindingValue::Object(objects.insert(global)))
}

fn read_matrix(
    env: &mut JNIEnv<'_>,
    name: &str,
    object: JObject<'_>,
) -> std::result::Result<BindingValue, Failure> {
    let outer = JObjectArray::from(object);
    let rows = env.get_array_length(&outer)?;
    let mut element = None;
    let mut values = Vec::with_capacity(rows as usize);
    for i in 0..rows {
        let row = env.get_object_array_element(&outer, i)?;
        let row = read_primitive_array(env, &row)?
            .ok_or_else(|| BridgeError::marshal(name, format!("row {i} is not a primitive array")))?;
        element.get_or_insert(row.element_type());
        values.push(row.to_f64_vec());
    }
    let element = element.unwrap_or(jembed_core::ElementType::Double);
    NumericMatrix::from_f64_rows(element, &values)
        .map(BindingValue::Matrix)
        .map_err(|e| BridgeError::marshal(name, e.to_string()).into())
}
