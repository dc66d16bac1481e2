//! Numeric containers copied across the host/runtime boundary
//!
//! Flat vectors and row-major matrices of `f64`, `f32`, `i32` and `u32`.
//! Engines move numbers as `f64`, so every container can be widened to `f64`
//! and narrowed back through [`Element::from_f64`], which refuses values the
//! element type cannot hold.

use std::fmt;
use thiserror::Error;

/// Element type of a numeric container
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ElementType {
    Double,
    Float,
    Int,
    UInt,
}

impl ElementType {
    pub fn name(self) -> &'static str {
        match self {
            ElementType::Double => "double",
            ElementType::Float => "float",
            ElementType::Int => "int",
            ElementType::UInt => "unsigned int",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A number that does not fit the container's element type.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("{value} is not representable as {element}")]
pub struct ElementError {
    pub value: f64,
    pub element: ElementType,
}

/// Scalar types that can live in a [`NumericVector`] or [`NumericMatrix`].
pub trait Element: Copy + Into<f64> + PartialEq + fmt::Debug {
    const TYPE: ElementType;

    /// Narrow an engine number, `None` if it is not exactly representable.
    fn from_f64(value: f64) -> Option<Self>;

    fn into_vector(values: Vec<Self>) -> NumericVector;
    fn into_matrix(rows: Vec<Vec<Self>>) -> NumericMatrix;
}

impl Element for f64 {
    const TYPE: ElementType = ElementType::Double;

    fn from_f64(value: f64) -> Option<Self> {
        Some(value)
    }

    fn into_vector(values: Vec<Self>) -> NumericVector {
        NumericVector::Double(values)
    }

    fn into_matrix(rows: Vec<Vec<Self>>) -> NumericMatrix {
        NumericMatrix::Double(rows)
    }
}

impl Element for f32 {
    const TYPE: ElementType = ElementType::Float;

    fn from_f64(value: f64) -> Option<Self> {
        let narrowed = value as f32;
        if value.is_nan() || f64::from(narrowed) == value {
            Some(narrowed)
        } else {
            None
        }
    }

    fn into_vector(values: Vec<Self>) -> NumericVector {
        NumericVector::Float(values)
    }

    fn into_matrix(rows: Vec<Vec<Self>>) -> NumericMatrix {
        NumericMatrix::Float(rows)
    }
}

impl Element for i32 {
    const TYPE: ElementType = ElementType::Int;

    fn from_f64(value: f64) -> Option<Self> {
        let in_range = value >= f64::from(i32::MIN) && value <= f64::from(i32::MAX);
        (value.fract() == 0.0 && in_range).then(|| value as i32)
    }

    fn into_vector(values: Vec<Self>) -> NumericVector {
        NumericVector::Int(values)
    }

    fn into_matrix(rows: Vec<Vec<Self>>) -> NumericMatrix {
        NumericMatrix::Int(rows)
    }
}

impl Element for u32 {
    const TYPE: ElementType = ElementType::UInt;

    fn from_f64(value: f64) -> Option<Self> {
        let in_range = value >= 0.0 && value <= f64::from(u32::MAX);
        (value.fract() == 0.0 && in_range).then(|| value as u32)
    }

    fn into_vector(values: Vec<Self>) -> NumericVector {
        NumericVector::UInt(values)
    }

    fn into_matrix(rows: Vec<Vec<Self>>) -> NumericMatrix {
        NumericMatrix::UInt(rows)
    }
}

fn narrow_all<T: Element>(values: &[f64]) -> Result<Vec<T>, ElementError> {
    values
        .iter()
        .map(|&value| {
            T::from_f64(value).ok_or(ElementError {
                value,
                element: T::TYPE,
            })
        })
        .collect()
}

/// Dispatch over every variant of a container enum with the same body.
macro_rules! each_variant {
    ($enum:ident, $value:expr, $inner:ident => $body:expr) => {
        match $value {
            $enum::Double($inner) => $body,
            $enum::Float($inner) => $body,
            $enum::Int($inner) => $body,
            $enum::UInt($inner) => $body,
        }
    };
}

/// Flat sequence of numbers with a fixed element type
#[derive(Debug, Clone, PartialEq)]
pub enum NumericVector {
    Double(Vec<f64>),
    Float(Vec<f32>),
    Int(Vec<i32>),
    UInt(Vec<u32>),
}

impl NumericVector {
    pub fn empty(element: ElementType) -> Self {
        match element {
            ElementType::Double => NumericVector::Double(Vec::new()),
            ElementType::Float => NumericVector::Float(Vec::new()),
            ElementType::Int => NumericVector::Int(Vec::new()),
            ElementType::UInt => NumericVector::UInt(Vec::new()),
        }
    }

    /// Build a vector of `element` from engine numbers.
    pub fn from_f64s(element: ElementType, values: &[f64]) -> Result<Self, ElementError> {
        Ok(match element {
            ElementType::Double => NumericVector::Double(values.to_vec()),
            ElementType::Float => NumericVector::Float(narrow_all(values)?),
            ElementType::Int => NumericVector::Int(narrow_all(values)?),
            ElementType::UInt => NumericVector::UInt(narrow_all(values)?),
        })
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            NumericVector::Double(_) => ElementType::Double,
            NumericVector::Float(_) => ElementType::Float,
            NumericVector::Int(_) => ElementType::Int,
            NumericVector::UInt(_) => ElementType::UInt,
        }
    }

    pub fn len(&self) -> usize {
        each_variant!(NumericVector, self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        each_variant!(NumericVector, self, v => v.get(index).map(|&x| f64::from(x)))
    }

    pub fn to_f64_vec(&self) -> Vec<f64> {
        each_variant!(NumericVector, self, v => v.iter().map(|&x| f64::from(x)).collect())
    }
}

impl<T: Element> From<Vec<T>> for NumericVector {
    fn from(values: Vec<T>) -> Self {
        T::into_vector(values)
    }
}

/// Row-major sequence of rows; rows may differ in length
#[derive(Debug, Clone, PartialEq)]
pub enum NumericMatrix {
    Double(Vec<Vec<f64>>),
    Float(Vec<Vec<f32>>),
    Int(Vec<Vec<i32>>),
    UInt(Vec<Vec<u32>>),
}

impl NumericMatrix {
    pub fn empty(element: ElementType) -> Self {
        match element {
            ElementType::Double => NumericMatrix::Double(Vec::new()),
            ElementType::Float => NumericMatrix::Float(Vec::new()),
            ElementType::Int => NumericMatrix::Int(Vec::new()),
            ElementType::UInt => NumericMatrix::UInt(Vec::new()),
        }
    }

    pub fn from_f64_rows(element: ElementType, rows: &[Vec<f64>]) -> Result<Self, ElementError> {
        fn narrow_rows<T: Element>(rows: &[Vec<f64>]) -> Result<Vec<Vec<T>>, ElementError> {
            rows.iter().map(|row| narrow_all(row)).collect()
        }

        Ok(match element {
            ElementType::Double => NumericMatrix::Double(rows.to_vec()),
            ElementType::Float => NumericMatrix::Float(narrow_rows(rows)?),
            ElementType::Int => NumericMatrix::Int(narrow_rows(rows)?),
            ElementType::UInt => NumericMatrix::UInt(narrow_rows(rows)?),
        })
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            NumericMatrix::Double(_) => ElementType::Double,
            NumericMatrix::Float(_) => ElementType::Float,
            NumericMatrix::Int(_) => ElementType::Int,
            NumericMatrix::UInt(_) => ElementType::UInt,
        }
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        each_variant!(NumericMatrix, self, m => m.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn row_len(&self, row: usize) -> Option<usize> {
        each_variant!(NumericMatrix, self, m => m.get(row).map(Vec::len))
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        each_variant!(NumericMatrix, self, m => m.get(row).and_then(|r| r.get(col)).map(|&x| f64::from(x)))
    }

    pub fn to_f64_rows(&self) -> Vec<Vec<f64>> {
        each_variant!(NumericMatrix, self, m => m
            .iter()
            .map(|row| row.iter().map(|&x| f64::from(x)).collect())
            .collect())
    }
}

impl<T: Element> From<Vec<Vec<T>>> for NumericMatrix {
    fn from(rows: Vec<Vec<T>>) -> Self {
        T::into_matrix(rows)
    }
}

fn write_row(f: &mut fmt::Formatter<'_>, row: &[f64]) -> fmt::Result {
    f.write_str("[")?;
    for (i, x) in row.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{x}")?;
    }
    f.write_str("]")
}

impl fmt::Display for NumericVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_row(f, &self.to_f64_vec())
    }
}

impl fmt::Display for NumericMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, row) in self.to_f64_rows().iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write_row(f, row)?;
        }
        f.write_str("]")
    }
}
