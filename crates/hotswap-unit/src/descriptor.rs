//! Field and method descriptors
//!
//! Descriptors use a compact notation:
//!
//! ```text
//! V  void        Z  bool       I  i32       J  i64
//! D  f64         S  string     Lpkg.Name;   object reference
//! (IJ)D          method taking (i32, i64) returning f64
//! ```
//!
//! A method's signature key is its name followed by its descriptor
//! (`run()I`). Keys identify methods across versions and are the lookup
//! key of every executor table.

use std::fmt;
use thiserror::Error;

/// Descriptor parse errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    /// Descriptor ended early
    #[error("Truncated descriptor: {0:?}")]
    Truncated(String),

    /// Unknown type tag
    #[error("Unknown type tag {tag:?} in descriptor {descriptor:?}")]
    UnknownTag {
        /// Offending tag
        tag: char,
        /// Whole descriptor
        descriptor: String,
    },

    /// Trailing characters after a complete descriptor
    #[error("Trailing characters in descriptor {0:?}")]
    Trailing(String),

    /// `V` used where a value type is required
    #[error("Void is not a value type in descriptor {0:?}")]
    VoidValue(String),

    /// Signature key without a parameter list
    #[error("Malformed signature key {0:?}")]
    MalformedKey(String),
}

/// Value type of a field, parameter or return
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDesc {
    /// No value (returns only)
    Void,
    /// Boolean
    Bool,
    /// 32-bit integer
    I32,
    /// 64-bit integer
    I64,
    /// 64-bit float
    F64,
    /// String
    Str,
    /// Reference to an instance of the named type
    Object(String),
}

impl TypeDesc {
    /// Parse a single field descriptor (`I`, `Lpkg.Name;`, ...)
    pub fn parse(descriptor: &str) -> Result<Self, DescriptorError> {
        let mut chars = descriptor.char_indices().peekable();
        let ty = Self::parse_one(descriptor, &mut chars)?;
        if chars.next().is_some() {
            return Err(DescriptorError::Trailing(descriptor.to_string()));
        }
        if ty == TypeDesc::Void {
            return Err(DescriptorError::VoidValue(descriptor.to_string()));
        }
        Ok(ty)
    }

    fn parse_one(
        descriptor: &str,
        chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
    ) -> Result<Self, DescriptorError> {
        let (start, tag) = chars
            .next()
            .ok_or_else(|| DescriptorError::Truncated(descriptor.to_string()))?;
        Ok(match tag {
            'V' => TypeDesc::Void,
            'Z' => TypeDesc::Bool,
            'I' => TypeDesc::I32,
            'J' => TypeDesc::I64,
            'D' => TypeDesc::F64,
            'S' => TypeDesc::Str,
            'L' => {
                let name_start = start + 1;
                loop {
                    match chars.next() {
                        Some((end, ';')) => {
                            let name = &descriptor[name_start..end];
                            if name.is_empty() {
                                return Err(DescriptorError::Truncated(descriptor.to_string()));
                            }
                            break TypeDesc::Object(name.to_string());
                        }
                        Some(_) => continue,
                        None => return Err(DescriptorError::Truncated(descriptor.to_string())),
                    }
                }
            }
            other => {
                return Err(DescriptorError::UnknownTag {
                    tag: other,
                    descriptor: descriptor.to_string(),
                })
            }
        })
    }

    /// Check whether values of this type are references
    pub fn is_reference(&self) -> bool {
        matches!(self, TypeDesc::Str | TypeDesc::Object(_))
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDesc::Void => f.write_str("V"),
            TypeDesc::Bool => f.write_str("Z"),
            TypeDesc::I32 => f.write_str("I"),
            TypeDesc::I64 => f.write_str("J"),
            TypeDesc::F64 => f.write_str("D"),
            TypeDesc::Str => f.write_str("S"),
            TypeDesc::Object(name) => write!(f, "L{};", name),
        }
    }
}

/// Parameter and return types of a method
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    /// Parameter types, receiver excluded
    pub params: Vec<TypeDesc>,
    /// Return type
    pub ret: TypeDesc,
}

impl MethodDescriptor {
    /// Parse a method descriptor such as `(IJ)D`
    pub fn parse(descriptor: &str) -> Result<Self, DescriptorError> {
        let body = descriptor
            .strip_prefix('(')
            .ok_or_else(|| DescriptorError::Truncated(descriptor.to_string()))?;
        let close = body
            .find(')')
            .ok_or_else(|| DescriptorError::Truncated(descriptor.to_string()))?;
        let (param_text, ret_text) = (&body[..close], &body[close + 1..]);

        let mut params = Vec::new();
        let mut chars = param_text.char_indices().peekable();
        while chars.peek().is_some() {
            let ty = TypeDesc::parse_one(param_text, &mut chars)?;
            if ty == TypeDesc::Void {
                return Err(DescriptorError::VoidValue(descriptor.to_string()));
            }
            params.push(ty);
        }

        let mut ret_chars = ret_text.char_indices().peekable();
        let ret = TypeDesc::parse_one(ret_text, &mut ret_chars)?;
        if ret_chars.next().is_some() {
            return Err(DescriptorError::Trailing(descriptor.to_string()));
        }

        Ok(Self { params, ret })
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for param in &self.params {
            write!(f, "{}", param)?;
        }
        write!(f, "){}", self.ret)
    }
}

/// Method name plus descriptor; the identity of a method across versions
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    /// Method name
    pub name: String,
    /// Parsed descriptor
    pub descriptor: MethodDescriptor,
}

impl MethodSignature {
    /// Build a signature from a name and descriptor text
    pub fn new(name: impl Into<String>, descriptor: &str) -> Result<Self, DescriptorError> {
        Ok(Self {
            name: name.into(),
            descriptor: MethodDescriptor::parse(descriptor)?,
        })
    }

    /// Parse a signature key such as `run()I`
    pub fn parse_key(key: &str) -> Result<Self, DescriptorError> {
        let open = key
            .find('(')
            .filter(|&i| i > 0)
            .ok_or_else(|| DescriptorError::MalformedKey(key.to_string()))?;
        Self::new(&key[..open], &key[open..])
    }

    /// Signature key (`name(params)ret`)
    pub fn key(&self) -> String {
        format!("{}{}", self.name, self.descriptor)
    }

    /// Number of declared parameters, receiver excluded
    pub fn param_count(&self) -> usize {
        self.descriptor.params.len()
    }

    /// Whether the method returns a value
    pub fn returns_value(&self) -> bool {
        self.descriptor.ret != TypeDesc::Void
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.descriptor)
    }
}
