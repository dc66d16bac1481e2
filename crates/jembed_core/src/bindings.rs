//! Named values passed into and read back out of a script
//!
//! A [`BindingSet`] maps variable names to [`BindingValue`]s. Inputs are
//! exposed to the script as globals; outputs are read back by name after
//! evaluation, using the value already stored under that name as the shape
//! the engine result must fit (see [`OutputShape`]).

use crate::containers::{ElementType, NumericMatrix, NumericVector};
use crate::error::{BridgeError, Result};
use indexmap::IndexMap;
use std::fmt;

/// Opaque reference to an object living inside the active runtime instance
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef(pub u64);

/// A value that can cross the host/runtime boundary
#[derive(Debug, Clone, PartialEq, Default)]
pub enum BindingValue {
    /// Absent value; as an output slot it means "any shape".
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Object(ObjectRef),
    Vector(NumericVector),
    Matrix(NumericMatrix),
}

impl BindingValue {
    pub fn kind(&self) -> &'static str {
        match self {
            BindingValue::Null => "null",
            BindingValue::Bool(_) => "bool",
            BindingValue::Int(_) => "int",
            BindingValue::Float(_) => "float",
            BindingValue::Text(_) => "text",
            BindingValue::Object(_) => "object",
            BindingValue::Vector(_) => "vector",
            BindingValue::Matrix(_) => "matrix",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, BindingValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            BindingValue::Int(i) => Some(i as f64),
            BindingValue::Float(x) => Some(x),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            BindingValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<ObjectRef> {
        match *self {
            BindingValue::Object(r) => Some(r),
            _ => None,
        }
    }

    /// The shape an engine value must fit to overwrite this slot.
    pub fn shape(&self) -> OutputShape {
        match self {
            BindingValue::Null => OutputShape::Any,
            BindingValue::Bool(_) => OutputShape::Bool,
            BindingValue::Int(_) => OutputShape::Int,
            BindingValue::Float(_) => OutputShape::Float,
            BindingValue::Text(_) => OutputShape::Text,
            BindingValue::Object(_) => OutputShape::Object,
            BindingValue::Vector(v) => OutputShape::Vector(v.element_type()),
            BindingValue::Matrix(m) => OutputShape::Matrix(m.element_type()),
        }
    }

    /// Fit an engine value into `shape`, converting numbers only when exact.
    ///
    /// `Null` fits every shape. `name` is the binding reported on mismatch.
    pub fn conform(self, name: &str, shape: OutputShape) -> Result<BindingValue> {
        use BindingValue::*;

        let narrow_err = |e: crate::containers::ElementError| BridgeError::marshal(name, e.to_string());
        match (shape, self) {
            (_, Null) => Ok(Null),
            (OutputShape::Any, value) => Ok(value),
            (OutputShape::Bool, value @ Bool(_))
            | (OutputShape::Int, value @ Int(_))
            | (OutputShape::Text, value @ Text(_))
            | (OutputShape::Object, value @ Object(_)) => Ok(value),
            (OutputShape::Int, Float(x)) if x.fract() == 0.0 && x.abs() < i64::MAX as f64 => {
                Ok(Int(x as i64))
            }
            (OutputShape::Float, Int(i)) => Ok(Float(i as f64)),
            (OutputShape::Float, Float(x)) => Ok(Float(x)),
            (OutputShape::Vector(element), Vector(v)) if v.element_type() == element => Ok(Vector(v)),
            (OutputShape::Vector(element), Vector(v)) => NumericVector::from_f64s(element, &v.to_f64_vec())
                .map(Vector)
                .map_err(narrow_err),
            (OutputShape::Matrix(element), Matrix(m)) if m.element_type() == element => Ok(Matrix(m)),
            (OutputShape::Matrix(element), Matrix(m)) => NumericMatrix::from_f64_rows(element, &m.to_f64_rows())
                .map(Matrix)
                .map_err(narrow_err),
            (shape, value) => Err(BridgeError::marshal(
                name,
                format!("expected {shape}, found {}", value.kind()),
            )),
        }
    }
}

/// Expected shape of an output binding
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OutputShape {
    Any,
    Bool,
    Int,
    Float,
    Text,
    Object,
    Vector(ElementType),
    Matrix(ElementType),
}

impl OutputShape {
    /// Element type for arrays read into this slot; untyped slots get doubles.
    pub fn element_type(self) -> ElementType {
        match self {
            OutputShape::Vector(e) | OutputShape::Matrix(e) => e,
            _ => ElementType::Double,
        }
    }
}

impl fmt::Display for OutputShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputShape::Any => f.write_str("any value"),
            OutputShape::Bool => f.write_str("bool"),
            OutputShape::Int => f.write_str("integer"),
            OutputShape::Float => f.write_str("number"),
            OutputShape::Text => f.write_str("text"),
            OutputShape::Object => f.write_str("object"),
            OutputShape::Vector(e) => write!(f, "vector of {e}"),
            OutputShape::Matrix(e) => write!(f, "matrix of {e}"),
        }
    }
}

impl fmt::Display for BindingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingValue::Null => f.write_str("null"),
            BindingValue::Bool(b) => write!(f, "{b}"),
            BindingValue::Int(i) => write!(f, "{i}"),
            BindingValue::Float(x) => write!(f, "{x}"),
            BindingValue::Text(s) => f.write_str(s),
            BindingValue::Object(r) => write!(f, "<object #{}>", r.0),
            BindingValue::Vector(v) => write!(f, "{v}"),
            BindingValue::Matrix(m) => write!(f, "{m}"),
        }
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident as $target:ty),* $(,)?) => {
        $(
            impl From<$ty> for BindingValue {
                fn from(value: $ty) -> Self {
                    BindingValue::$variant(<$target>::from(value))
                }
            }
        )*
    };
}

impl_from_scalar! {
    bool => Bool as bool,
    i32 => Int as i64,
    i64 => Int as i64,
    u32 => Int as i64,
    f32 => Float as f64,
    f64 => Float as f64,
    String => Text as String,
    &str => Text as String,
}

impl From<ObjectRef> for BindingValue {
    fn from(value: ObjectRef) -> Self {
        BindingValue::Object(value)
    }
}

impl From<NumericVector> for BindingValue {
    fn from(value: NumericVector) -> Self {
        BindingValue::Vector(value)
    }
}

impl From<NumericMatrix> for BindingValue {
    fn from(value: NumericMatrix) -> Self {
        BindingValue::Matrix(value)
    }
}

impl<T: crate::containers::Element> From<Vec<T>> for BindingValue {
    fn from(values: Vec<T>) -> Self {
        BindingValue::Vector(values.into())
    }
}

impl<T: crate::containers::Element> From<Vec<Vec<T>>> for BindingValue {
    fn from(rows: Vec<Vec<T>>) -> Self {
        BindingValue::Matrix(rows.into())
    }
}

impl<T: Into<BindingValue>> From<Option<T>> for BindingValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(BindingValue::Null, Into::into)
    }
}

/// Ordered mapping from binding name to value
///
/// Owned by the caller. Engines only read input sets and overwrite existing
/// entries of output sets.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BindingSet {
    entries: IndexMap<String, BindingValue>,
}

impl BindingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`BindingSet::insert`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<BindingValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Builder form of [`BindingSet::declare`].
    pub fn expect(mut self, name: impl Into<String>) -> Self {
        self.declare(name);
        self
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<BindingValue>,
    ) -> Option<BindingValue> {
        self.entries.insert(name.into(), value.into())
    }

    /// Declare an output slot that accepts any shape.
    pub fn declare(&mut self, name: impl Into<String>) {
        self.entries.entry(name.into()).or_default();
    }

    pub fn get(&self, name: &str) -> Option<&BindingValue> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BindingValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut BindingValue)> {
        self.entries.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<BindingValue>> FromIterator<(K, V)> for BindingSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a BindingSet {
    type Item = (&'a String, &'a BindingValue);
    type IntoIter = indexmap::map::Iter<'a, String, BindingValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
