//! Interface Schema Files
//!
//! Describes an interface in TOML without writing Rust:
//!
//! ```toml
//! name = "Library"
//!
//! [[methods]]
//! symbol = "add"
//! signature = "int add(int a, int b)"
//!
//! [[methods]]
//! name = "output_one"
//! symbol = "add_one"
//! signature = "void add_one(out int a)"
//! ```
//!
//! Signatures are C-style. A parameter is passed by reference when written
//! `ref T name`, `out T name` or `T* name` (except `void*` and `char*`, which
//! are plain pointers).

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::descriptor::{InterfaceDescriptor, MethodDescriptor, ParameterDescriptor};
use crate::types::{NativeType, PassMode};

/// Schema parsing errors.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Failed to read schema file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse schema: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid signature '{signature}': {reason}")]
    InvalidSignature { signature: String, reason: String },

    #[error("Unknown type '{ty}' in signature '{signature}'")]
    UnknownType { signature: String, ty: String },

    #[error("Duplicate method '{0}'")]
    DuplicateMethod(String),
}

#[derive(Debug, Deserialize)]
struct SchemaFile {
    name: String,
    #[serde(default)]
    methods: Vec<SchemaMethod>,
}

#[derive(Debug, Deserialize)]
struct SchemaMethod {
    /// Interface method name; defaults to the signature's function name
    name: Option<String>,
    /// Native symbol; omitted means unbound
    symbol: Option<String>,
    signature: String,
}

impl InterfaceDescriptor {
    /// Parse an interface schema from TOML text.
    pub fn from_schema_str(content: &str) -> Result<Self, SchemaError> {
        let file: SchemaFile = toml::from_str(content)?;
        let mut descriptor = InterfaceDescriptor::new(file.name);
        let mut seen = HashSet::new();

        for entry in file.methods {
            let mut method = parse_signature(&entry.signature)?;
            if let Some(name) = entry.name {
                method.name = name;
            }
            method.symbol = entry.symbol;

            if !seen.insert(method.key()) {
                return Err(SchemaError::DuplicateMethod(method.key().to_string()));
            }
            descriptor.push(method);
        }

        Ok(descriptor)
    }

    /// Load an interface schema file.
    pub fn load_schema(path: &Path) -> Result<Self, SchemaError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_schema_str(&content)
    }
}

impl MethodDescriptor {
    /// Parse a C-style signature such as `int add(int a, int b)`.
    ///
    /// The result is unbound; the function name becomes the method name.
    pub fn parse(signature: &str) -> Result<Self, SchemaError> {
        parse_signature(signature)
    }
}

fn invalid(signature: &str, reason: &str) -> SchemaError {
    SchemaError::InvalidSignature {
        signature: signature.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse "return_type function_name(param, param, ...)"
fn parse_signature(signature: &str) -> Result<MethodDescriptor, SchemaError> {
    let text = signature.trim();

    let open = text
        .find('(')
        .ok_or_else(|| invalid(signature, "missing '('"))?;
    let close = text
        .rfind(')')
        .filter(|&close| close > open)
        .ok_or_else(|| invalid(signature, "missing ')'"))?;
    if !text[close + 1..].trim().is_empty() {
        return Err(invalid(signature, "unexpected text after ')'"));
    }

    // Split return type and name; a '*' may hug either side
    let head = text[..open].replace('*', " * ");
    let mut head_tokens: Vec<&str> = head.split_whitespace().collect();
    let name = head_tokens
        .pop()
        .filter(|n| is_identifier(n))
        .ok_or_else(|| invalid(signature, "missing function name"))?;
    if head_tokens.is_empty() {
        return Err(invalid(signature, "missing return type"));
    }
    let returns = parse_type(signature, &head_tokens)?;

    let mut method = MethodDescriptor::new(name).returns(returns);

    let params = text[open + 1..close].trim();
    if params.is_empty() || params == "void" {
        return Ok(method);
    }

    let parts: Vec<&str> = params.split(',').map(str::trim).collect();
    for (index, param) in parts.iter().enumerate() {
        if *param == "..." {
            if index + 1 != parts.len() {
                return Err(invalid(signature, "'...' must be the last parameter"));
            }
            method.variadic = true;
            continue;
        }
        if param.is_empty() {
            return Err(invalid(signature, "empty parameter"));
        }
        method.params.push(parse_param(signature, param, index)?);
    }

    Ok(method)
}

/// Parse one parameter: `[ref|out] <type>[*] [name]`
fn parse_param(signature: &str, param: &str, index: usize) -> Result<ParameterDescriptor, SchemaError> {
    let mut text = param;
    let mut mode = PassMode::ByValue;
    for prefix in ["ref ", "out "] {
        if let Some(rest) = text.strip_prefix(prefix) {
            mode = PassMode::ByRefInOut;
            text = rest.trim_start();
        }
    }

    let spaced = text.replace('*', " * ");
    let tokens: Vec<&str> = spaced.split_whitespace().collect();

    // Prefer reading the whole thing as a type; otherwise the last token names it
    let (type_tokens, name) = match tokens.split_last() {
        Some((last, rest))
            if !rest.is_empty()
                && is_identifier(last)
                && parse_base(&strip_type_noise(&tokens)).is_none() =>
        {
            (rest.to_vec(), last.to_string())
        }
        _ => (tokens.clone(), format!("arg{}", index)),
    };

    let stars = type_tokens.iter().filter(|t| **t == "*").count();
    let base_name = strip_type_noise(&type_tokens);
    let base = parse_base(&base_name).ok_or_else(|| SchemaError::UnknownType {
        signature: signature.to_string(),
        ty: base_name.clone(),
    })?;

    let (ty, mode) = match (stars, mode) {
        (0, mode) => (base, mode),
        (1, PassMode::ByValue) => match base {
            NativeType::Void => (NativeType::Ptr, PassMode::ByValue),
            NativeType::I8 if base_name.contains("char") => (NativeType::CStr, PassMode::ByValue),
            other => (other, PassMode::ByRefInOut),
        },
        // Pointer-to-pointer and `ref T*` both reduce to a pointer slot
        (_, PassMode::ByValue) => (NativeType::Ptr, PassMode::ByValue),
        (_, PassMode::ByRefInOut) => (NativeType::Ptr, PassMode::ByRefInOut),
    };

    Ok(ParameterDescriptor::new(name, ty, mode))
}

/// Parse a return type; any pointer returns as an opaque pointer
fn parse_type(signature: &str, tokens: &[&str]) -> Result<NativeType, SchemaError> {
    let stars = tokens.iter().filter(|t| **t == "*").count();
    let base_name = strip_type_noise(tokens);
    let base = parse_base(&base_name).ok_or_else(|| SchemaError::UnknownType {
        signature: signature.to_string(),
        ty: base_name.clone(),
    })?;
    Ok(match stars {
        0 => base,
        1 if base == NativeType::I8 && base_name.contains("char") => NativeType::CStr,
        _ => NativeType::Ptr,
    })
}

/// Join type tokens, dropping `*` and `const`
fn strip_type_noise(tokens: &[&str]) -> String {
    tokens
        .iter()
        .filter(|t| **t != "*" && **t != "const")
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_base(name: &str) -> Option<NativeType> {
    if name.is_empty() {
        return None;
    }
    NativeType::parse(name)
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
