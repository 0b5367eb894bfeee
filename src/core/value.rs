//! Typed values carried by the protocol and their tag bytes.
//!
//! The tag byte of a payload is derived from the [`Value`] variant, never from
//! inspecting the data. The mapping is defined once in [`TypeTag`] and used both
//! when tagging outgoing values and when dispatching incoming ones.

use std::fmt;

use crate::error::ProtocolError;

/// Closed enumeration of the tag bytes understood on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeTag {
    Bytes = 80,
    String = 81,
    Int = 82,
    Bool = 83,
    Double = 84,
    IntArray = 85,
    BoolArray = 86,
    DoubleArray = 87,
}

impl TypeTag {
    /// Wire representation of this tag
    #[inline]
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Human-readable name, used in logs and error messages
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Bytes => "bytes",
            TypeTag::String => "string",
            TypeTag::Int => "int32",
            TypeTag::Bool => "bool",
            TypeTag::Double => "float64",
            TypeTag::IntArray => "int32[]",
            TypeTag::BoolArray => "bool[]",
            TypeTag::DoubleArray => "float64[]",
        }
    }
}

impl TryFrom<u8> for TypeTag {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            80 => Ok(TypeTag::Bytes),
            81 => Ok(TypeTag::String),
            82 => Ok(TypeTag::Int),
            83 => Ok(TypeTag::Bool),
            84 => Ok(TypeTag::Double),
            85 => Ok(TypeTag::IntArray),
            86 => Ok(TypeTag::BoolArray),
            87 => Ok(TypeTag::DoubleArray),
            other => Err(ProtocolError::UnknownTag(other)),
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value that can be sent through an [`Endpoint`](crate::Endpoint).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bytes(Vec<u8>),
    String(String),
    Int(i32),
    Bool(bool),
    Double(f64),
    IntArray(Vec<i32>),
    BoolArray(Vec<bool>),
    DoubleArray(Vec<f64>),
}

impl Value {
    /// Tag byte for this variant
    pub fn tag(&self) -> TypeTag {
        match self {
            Value::Bytes(_) => TypeTag::Bytes,
            Value::String(_) => TypeTag::String,
            Value::Int(_) => TypeTag::Int,
            Value::Bool(_) => TypeTag::Bool,
            Value::Double(_) => TypeTag::Double,
            Value::IntArray(_) => TypeTag::IntArray,
            Value::BoolArray(_) => TypeTag::BoolArray,
            Value::DoubleArray(_) => TypeTag::DoubleArray,
        }
    }

    /// Borrow the text of a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<Vec<i32>> for Value {
    fn from(v: Vec<i32>) -> Self {
        Value::IntArray(v)
    }
}

impl From<Vec<bool>> for Value {
    fn from(v: Vec<bool>) -> Self {
        Value::BoolArray(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::DoubleArray(v)
    }
}
