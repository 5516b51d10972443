//! Native Type System
//!
//! C-level types that interface descriptors declare for parameters and
//! return values, and the dynamic [`Value`] used by the untyped call path.

use std::fmt;

use serde::Serialize;

/// C types supported for parameters and return values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NativeType {
    /// Void (no value, return position only)
    Void,
    /// C `_Bool`, one byte
    Bool,
    /// 8-bit signed integer
    I8,
    /// 16-bit signed integer
    I16,
    /// 32-bit signed integer
    I32,
    /// 64-bit signed integer
    I64,
    /// 8-bit unsigned integer
    U8,
    /// 16-bit unsigned integer
    U16,
    /// 32-bit unsigned integer
    U32,
    /// 64-bit unsigned integer
    U64,
    /// 32-bit floating point
    F32,
    /// 64-bit floating point
    F64,
    /// Opaque pointer (usize, platform-dependent)
    Ptr,
    /// Null-terminated C string (const char*)
    CStr,
}

/// How a parameter reaches the native function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassMode {
    /// The value itself is passed
    ByValue,
    /// A pointer to caller-owned storage is passed; the callee may read and write it
    ByRefInOut,
}

impl NativeType {
    /// Whether a value of type `other` may be passed where `self` is declared.
    ///
    /// Pointer-shaped types are interchangeable; everything else must match.
    pub fn accepts(&self, other: NativeType) -> bool {
        *self == other
            || (matches!(self, NativeType::Ptr | NativeType::CStr)
                && matches!(other, NativeType::Ptr | NativeType::CStr))
    }

    /// Parse from a Rust or C type name
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_lowercase().as_str() {
            "void" | "()" => Some(NativeType::Void),
            "bool" | "_bool" => Some(NativeType::Bool),
            "i8" | "int8" | "int8_t" | "char" | "signed char" => Some(NativeType::I8),
            "i16" | "int16" | "int16_t" | "short" | "short int" | "signed short" => {
                Some(NativeType::I16)
            }
            "i32" | "int32" | "int32_t" | "int" | "signed" | "signed int" => {
                Some(NativeType::I32)
            }
            "i64" | "int64" | "int64_t" | "long long" | "long long int" | "ssize_t"
            | "isize" => Some(NativeType::I64),
            "u8" | "uint8" | "uint8_t" | "byte" | "unsigned char" => Some(NativeType::U8),
            "u16" | "uint16" | "uint16_t" | "unsigned short" | "unsigned short int" => {
                Some(NativeType::U16)
            }
            "u32" | "uint32" | "uint32_t" | "unsigned" | "unsigned int" => {
                Some(NativeType::U32)
            }
            "u64" | "uint64" | "uint64_t" | "unsigned long long" | "size_t" | "usize" => {
                Some(NativeType::U64)
            }
            "long" | "long int" => Some(c_long_type(true)),
            "unsigned long" | "unsigned long int" | "ulong" => Some(c_long_type(false)),
            "f32" | "float" => Some(NativeType::F32),
            "f64" | "double" => Some(NativeType::F64),
            "ptr" | "pointer" | "void*" => Some(NativeType::Ptr),
            "cstr" | "string" | "char*" | "const char*" => Some(NativeType::CStr),
            _ => None,
        }
    }
}

/// C `long` follows the platform data model: 32-bit on Windows and 32-bit targets
fn c_long_type(signed: bool) -> NativeType {
    match (std::mem::size_of::<std::os::raw::c_long>(), signed) {
        (8, true) => NativeType::I64,
        (8, false) => NativeType::U64,
        (_, true) => NativeType::I32,
        (_, false) => NativeType::U32,
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeType::Void => write!(f, "void"),
            NativeType::Bool => write!(f, "bool"),
            NativeType::U8 => write!(f, "u8"),
            NativeType::U16 => write!(f, "u16"),
            NativeType::U32 => write!(f, "u32"),
            NativeType::U64 => write!(f, "u64"),
            NativeType::I8 => write!(f, "i8"),
            NativeType::I16 => write!(f, "i16"),
            NativeType::I32 => write!(f, "i32"),
            NativeType::I64 => write!(f, "i64"),
            NativeType::F32 => write!(f, "f32"),
            NativeType::F64 => write!(f, "f64"),
            NativeType::Ptr => write!(f, "ptr"),
            NativeType::CStr => write!(f, "cstr"),
        }
    }
}

impl fmt::Display for PassMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassMode::ByValue => write!(f, "value"),
            PassMode::ByRefInOut => write!(f, "ref"),
        }
    }
}

/// A value passed to or returned from a native call on the dynamic path
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// No value
    Void,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    /// Pointer value (address)
    Ptr(usize),
}

impl Value {
    /// Get the type of this value
    pub fn native_type(&self) -> NativeType {
        match self {
            Value::Void => NativeType::Void,
            Value::Bool(_) => NativeType::Bool,
            Value::I8(_) => NativeType::I8,
            Value::I16(_) => NativeType::I16,
            Value::I32(_) => NativeType::I32,
            Value::I64(_) => NativeType::I64,
            Value::U8(_) => NativeType::U8,
            Value::U16(_) => NativeType::U16,
            Value::U32(_) => NativeType::U32,
            Value::U64(_) => NativeType::U64,
            Value::F32(_) => NativeType::F32,
            Value::F64(_) => NativeType::F64,
            Value::Ptr(_) => NativeType::Ptr,
        }
    }

    /// Check if this is a void value
    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }

    /// Parse text as a value of the given type.
    ///
    /// Pointers accept decimal or `0x`-prefixed hex addresses.
    pub fn parse(text: &str, ty: NativeType) -> Option<Self> {
        let text = text.trim();
        Some(match ty {
            NativeType::Void => return None,
            NativeType::Bool => match text {
                "true" | "1" => Value::Bool(true),
                "false" | "0" => Value::Bool(false),
                _ => return None,
            },
            NativeType::I8 => Value::I8(text.parse().ok()?),
            NativeType::I16 => Value::I16(text.parse().ok()?),
            NativeType::I32 => Value::I32(text.parse().ok()?),
            NativeType::I64 => Value::I64(text.parse().ok()?),
            NativeType::U8 => Value::U8(text.parse().ok()?),
            NativeType::U16 => Value::U16(text.parse().ok()?),
            NativeType::U32 => Value::U32(text.parse().ok()?),
            NativeType::U64 => Value::U64(text.parse().ok()?),
            NativeType::F32 => Value::F32(text.parse().ok()?),
            NativeType::F64 => Value::F64(text.parse().ok()?),
            NativeType::Ptr | NativeType::CStr => {
                let addr = match text.strip_prefix("0x") {
                    Some(hex) => usize::from_str_radix(hex, 16).ok()?,
                    None => text.parse().ok()?,
                };
                Value::Ptr(addr)
            }
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "()"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::I8(v) => write!(f, "{}", v),
            Value::I16(v) => write!(f, "{}", v),
            Value::I32(v) => write!(f, "{}", v),
            Value::I64(v) => write!(f, "{}", v),
            Value::U8(v) => write!(f, "{}", v),
            Value::U16(v) => write!(f, "{}", v),
            Value::U32(v) => write!(f, "{}", v),
            Value::U64(v) => write!(f, "{}", v),
            Value::F32(v) => write!(f, "{}", v),
            Value::F64(v) => write!(f, "{}", v),
            Value::Ptr(v) => write!(f, "{:#x}", v),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
}
