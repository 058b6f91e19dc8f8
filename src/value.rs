//! 动态值与参数访问
//! Dynamic values and argument access
//!
//! RPC arguments, timer arguments, message payloads and await-RPC replies are
//! carried as [`Value`]s. Reading them goes through typed accessors that return
//! an [`ArgError`] on a shape mismatch, so a malformed call is reported instead
//! of tearing down the module.
//!
//! RPC参数、定时器参数、消息负载和等待RPC的回复都以 [`Value`] 传递。
//! 读取时通过类型化访问器进行，格式不匹配时返回 [`ArgError`]，
//! 从而报告错误的调用，而不是使模块崩溃。

use bytes::Bytes;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by typed argument access.
/// 类型化参数访问引发的错误。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgError {
    #[error("argument {index} is missing (only {len} given)")]
    Missing { index: usize, len: usize },
    #[error("argument {index}: expected {expected}, found {found}")]
    TypeMismatch {
        index: usize,
        expected: &'static str,
        found: &'static str,
    },
}

/// A dynamically typed value.
/// 动态类型的值。
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Bytes(Bytes),
    List(Vec<Value>),
    /// An opaque, shared Rust value (decoded protocol messages, handles, ...).
    /// 不透明的共享Rust值（解码后的协议消息、句柄等）。
    Any(Arc<dyn Any + Send + Sync>),
}

impl Value {
    /// Wraps an arbitrary value as [`Value::Any`].
    /// 将任意值包装为 [`Value::Any`]。
    pub fn any<T: Any + Send + Sync>(value: T) -> Self {
        Value::Any(Arc::new(value))
    }

    /// The name of the variant, used in error messages.
    /// 变体名称，用于错误信息。
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Any(_) => "any",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Reads an integer, accepting unsigned values that fit.
    /// 读取整数，接受可容纳的无符号值。
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Reads an unsigned integer, accepting non-negative signed values.
    /// 读取无符号整数，接受非负的有符号值。
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            Value::UInt(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Borrows the inner value of [`Value::Any`] if it has type `T`.
    /// 如果 [`Value::Any`] 的内部值类型为 `T`，则借用它。
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Any(v) => v.downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(v) => write!(f, "Bool({v})"),
            Value::Int(v) => write!(f, "Int({v})"),
            Value::UInt(v) => write!(f, "UInt({v})"),
            Value::Float(v) => write!(f, "Float({v})"),
            Value::Str(v) => write!(f, "Str({v:?})"),
            Value::Bytes(v) => write!(f, "Bytes({v:?})"),
            Value::List(v) => f.debug_tuple("List").field(v).finish(),
            Value::Any(_) => write!(f, "Any(..)"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::UInt(a), Value::UInt(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            // Opaque values compare by identity.
            (Value::Any(a), Value::Any(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident as $cast:ty),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v as $cast)
                }
            }
        )*
    };
}

impl_from! {
    i8 => Int as i64,
    i16 => Int as i64,
    i32 => Int as i64,
    i64 => Int as i64,
    u8 => UInt as u64,
    u16 => UInt as u64,
    u32 => UInt as u64,
    u64 => UInt as u64,
    usize => UInt as u64,
    f32 => Float as f64,
    f64 => Float as f64,
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Nil, Into::into)
    }
}

/// An ordered argument list with typed accessors.
/// 带有类型化访问器的有序参数列表。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args(Vec<Value>);

impl Args {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, value: impl Into<Value>) {
        self.0.push(value.into());
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<Value> {
        self.0
    }

    /// Returns the raw value at `index`.
    /// 返回 `index` 处的原始值。
    pub fn get(&self, index: usize) -> Result<&Value, ArgError> {
        self.0.get(index).ok_or(ArgError::Missing {
            index,
            len: self.0.len(),
        })
    }

    fn read<'a, T>(
        &'a self,
        index: usize,
        expected: &'static str,
        f: impl FnOnce(&'a Value) -> Option<T>,
    ) -> Result<T, ArgError> {
        let value = self.get(index)?;
        f(value).ok_or(ArgError::TypeMismatch {
            index,
            expected,
            found: value.type_name(),
        })
    }

    pub fn read_bool(&self, index: usize) -> Result<bool, ArgError> {
        self.read(index, "bool", Value::as_bool)
    }

    pub fn read_i64(&self, index: usize) -> Result<i64, ArgError> {
        self.read(index, "int", Value::as_i64)
    }

    pub fn read_i32(&self, index: usize) -> Result<i32, ArgError> {
        self.read(index, "int32", |v| v.as_i64().and_then(|n| i32::try_from(n).ok()))
    }

    pub fn read_u64(&self, index: usize) -> Result<u64, ArgError> {
        self.read(index, "uint", Value::as_u64)
    }

    pub fn read_f64(&self, index: usize) -> Result<f64, ArgError> {
        self.read(index, "float", Value::as_f64)
    }

    pub fn read_str(&self, index: usize) -> Result<&str, ArgError> {
        self.read(index, "string", Value::as_str)
    }

    pub fn read_bytes(&self, index: usize) -> Result<&Bytes, ArgError> {
        self.read(index, "bytes", Value::as_bytes)
    }

    /// Borrows an opaque argument of type `T`.
    /// 借用类型为 `T` 的不透明参数。
    pub fn read_any<T: Any>(&self, index: usize) -> Result<&T, ArgError> {
        self.read(index, std::any::type_name::<T>(), Value::downcast_ref::<T>)
    }
}

impl From<Vec<Value>> for Args {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

impl FromIterator<Value> for Args {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Args {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Builds an [`Args`] list from anything convertible into [`Value`].
///
/// ```
/// use kestrel_runtime::{args, Value};
/// let args = args![42, "orders", true];
/// assert_eq!(args.read_i64(0).unwrap(), 42);
/// assert_eq!(args.get(1).unwrap(), &Value::from("orders"));
/// ```
#[macro_export]
macro_rules! args {
    () => { $crate::value::Args::new() };
    ($($value:expr),+ $(,)?) => {
        $crate::value::Args::from(vec![$($crate::value::Value::from($value)),+])
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_reads() {
        let args = args![42, "hello", true, 1.5f64, Bytes::from_static(b"ab")];
        assert_eq!(args.len(), 5);
        assert_eq!(args.read_i64(0), Ok(42));
        assert_eq!(args.read_u64(0), Ok(42));
        assert_eq!(args.read_str(1), Ok("hello"));
        assert_eq!(args.read_bool(2), Ok(true));
        assert_eq!(args.read_f64(3), Ok(1.5));
        assert_eq!(args.read_bytes(4).map(|b| b.as_ref()), Ok(&b"ab"[..]));
    }

    #[test]
    fn test_type_mismatch_is_reported() {
        let args = args!["not a number"];
        assert_eq!(
            args.read_i64(0),
            Err(ArgError::TypeMismatch {
                index: 0,
                expected: "int",
                found: "string"
            })
        );
    }

    #[test]
    fn test_missing_argument_is_reported() {
        let args = args![1];
        assert_eq!(args.read_str(3), Err(ArgError::Missing { index: 3, len: 1 }));
    }

    #[test]
    fn test_integer_widening() {
        let args = args![u64::MAX, -1i64];
        assert!(args.read_i64(0).is_err());
        assert_eq!(args.read_u64(0), Ok(u64::MAX));
        assert!(args.read_u64(1).is_err());
        assert!(args![i64::MAX].read_i32(0).is_err());
    }

    #[test]
    fn test_opaque_values() {
        #[derive(Debug, PartialEq)]
        struct Login {
            user: u32,
        }

        let args = args![Value::any(Login { user: 7 })];
        assert_eq!(args.read_any::<Login>(0), Ok(&Login { user: 7 }));
        assert!(args.read_any::<String>(0).is_err());
    }
}
