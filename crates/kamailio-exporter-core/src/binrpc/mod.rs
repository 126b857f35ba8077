//! Kamailio BINRPC protocol (version 1), as spoken by the `ctl` module.
//!
//! A packet is a small header followed by a body of typed records:
//!
//! ```text
//! ┌────────────┬──────────────────────────┬──────────────┬──────────────┬─────────┐
//! │ 0xA1       │ type | LL-1 | CL-1       │ body length  │ cookie       │ records │
//! │ magic|vers │ 4b     2b     2b         │ LL bytes, BE │ CL bytes, BE │ ...     │
//! └────────────┴──────────────────────────┴──────────────┴──────────────┴─────────┘
//! ```
//!
//! Every record starts with a tag byte `S(1) | size(3) | type(4)`. When `S` is
//! clear, `size` is the length of the value; when set, `size` is the length of
//! a big-endian length field that follows the tag. Structs and arrays are
//! delimited by a bare start tag and the same type tagged with `S` set.
//!
//! Requests carry the command name as a string record followed by the
//! parameters. Replies carry zero or more records; faults carry an int code
//! and a string message.

mod codec;

pub use codec::{Packet, PacketKind, read_reply, write_request};

/// High nibble of the first header byte.
pub const MAGIC: u8 = 0xA;

/// Low nibble of the first header byte.
pub const VERSION: u8 = 1;

/// Upper bound for a packet body we are willing to buffer.
pub const MAX_BODY_LEN: usize = 16 * 1024 * 1024;

/// A decoded BINRPC value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Str(String),
    /// Transmitted as an int holding the value multiplied by 1000.
    Double(f64),
    Bytes(Vec<u8>),
    Struct(Vec<StructItem>),
    Array(Vec<Value>),
}

/// Top-level value of a reply. `stats.fetch` and `pkg.stats` answer with structs.
pub type Record = Value;

/// One named member of a struct.
#[derive(Debug, Clone, PartialEq)]
pub struct StructItem {
    pub key: String,
    pub value: Value,
}

impl StructItem {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

impl Value {
    /// Short name of the wire type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::Double(_) => "double",
            Value::Bytes(_) => "bytes",
            Value::Struct(_) => "struct",
            Value::Array(_) => "array",
        }
    }

    /// Returns the integer payload. Only `Int` converts.
    pub fn as_int(&self) -> Result<i64, ValueError> {
        match self {
            Value::Int(i) => Ok(*i),
            other => Err(ValueError::TypeMismatch {
                expected: "int",
                actual: other.type_name(),
            }),
        }
    }

    /// Returns the value as text.
    ///
    /// Strings are returned as-is, bytes are decoded as (lossy) UTF-8 and
    /// numbers are formatted in decimal. Containers do not convert.
    pub fn as_string(&self) -> Result<String, ValueError> {
        match self {
            Value::Str(s) => Ok(s.clone()),
            Value::Bytes(b) => Ok(String::from_utf8_lossy(b).into_owned()),
            Value::Int(i) => Ok(i.to_string()),
            Value::Double(d) => Ok(d.to_string()),
            other => Err(ValueError::TypeMismatch {
                expected: "string",
                actual: other.type_name(),
            }),
        }
    }

    /// Returns the members of a struct.
    pub fn struct_items(&self) -> Result<&[StructItem], ValueError> {
        match self {
            Value::Struct(items) => Ok(items),
            other => Err(ValueError::TypeMismatch {
                expected: "struct",
                actual: other.type_name(),
            }),
        }
    }
}

/// A value did not have the requested wire type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    #[error("expected {expected} value, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
}

/// Errors raised while reading or writing BINRPC packets.
#[derive(Debug, thiserror::Error)]
pub enum BinRpcError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad magic in header byte {0:#04x}")]
    BadMagic(u8),
    #[error("unsupported protocol version {0}")]
    BadVersion(u8),
    #[error("unexpected packet type {0}")]
    UnexpectedPacketType(u8),
    #[error("packet body of {0} bytes exceeds the size limit")]
    TooLarge(usize),
    #[error("record truncated at offset {0}")]
    Truncated(usize),
    #[error("unknown record type {0}")]
    UnknownRecordType(u8),
    #[error("malformed record: {0}")]
    Malformed(&'static str),
    #[error("cookie mismatch: sent {sent:#x}, received {received:#x}")]
    CookieMismatch { sent: u32, received: u32 },
    #[error("fault {code}: {message}")]
    Fault { code: i64, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_int_accepts_only_ints() {
        assert_eq!(Value::Int(42).as_int().unwrap(), 42);
        assert_eq!(
            Value::Str("42".into()).as_int(),
            Err(ValueError::TypeMismatch {
                expected: "int",
                actual: "string"
            })
        );
    }

    #[test]
    fn as_string_formats_scalars() {
        assert_eq!(Value::Str("abc".into()).as_string().unwrap(), "abc");
        assert_eq!(Value::Int(-7).as_string().unwrap(), "-7");
        assert_eq!(Value::Double(1.5).as_string().unwrap(), "1.5");
        assert_eq!(Value::Bytes(b"xy".to_vec()).as_string().unwrap(), "xy");
        assert!(Value::Array(vec![]).as_string().is_err());
        assert!(Value::Struct(vec![]).as_string().is_err());
    }

    #[test]
    fn struct_items_rejects_scalars() {
        let v = Value::Struct(vec![StructItem::new("a", Value::Int(1))]);
        assert_eq!(v.struct_items().unwrap().len(), 1);
        assert!(Value::Int(1).struct_items().is_err());
    }
}
