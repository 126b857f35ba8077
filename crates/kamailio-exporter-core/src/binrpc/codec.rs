//! Packet framing and record encoding.

use std::io::{Read, Write};

use super::{BinRpcError, MAGIC, MAX_BODY_LEN, Record, StructItem, VERSION, Value};

const T_INT: u8 = 0;
const T_STR: u8 = 1;
const T_DOUBLE: u8 = 2;
const T_STRUCT: u8 = 3;
const T_ARRAY: u8 = 4;
const T_AVP: u8 = 5;
const T_BYTES: u8 = 6;

/// Tag flag: long length form for values, end marker for structs and arrays.
const F_LONG: u8 = 0x80;

/// Deepest struct/array nesting accepted in a reply.
pub const MAX_DEPTH: usize = 64;

/// Packet type carried in the high nibble of the second header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Request,
    Reply,
    Fault,
}

impl PacketKind {
    fn code(self) -> u8 {
        match self {
            PacketKind::Request => 0,
            PacketKind::Reply => 1,
            PacketKind::Fault => 3,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(PacketKind::Request),
            1 => Some(PacketKind::Reply),
            3 => Some(PacketKind::Fault),
            _ => None,
        }
    }
}

/// A complete BINRPC packet.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub kind: PacketKind,
    pub cookie: u32,
    pub body: Vec<Value>,
}

impl Packet {
    /// Builds a request for `command` with string parameters.
    pub fn request(command: &str, params: &[&str], cookie: u32) -> Self {
        let mut body = Vec::with_capacity(1 + params.len());
        body.push(Value::Str(command.to_string()));
        body.extend(params.iter().map(|p| Value::Str((*p).to_string())));
        Self {
            kind: PacketKind::Request,
            cookie,
            body,
        }
    }

    /// Serializes header and body.
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        for value in &self.body {
            encode_value(&mut body, value);
        }

        let len_len = int_len(body.len() as u64).max(1);
        let cookie_len = int_len(u64::from(self.cookie)).max(1);

        let mut out = Vec::with_capacity(2 + len_len + cookie_len + body.len());
        out.push((MAGIC << 4) | VERSION);
        out.push((self.kind.code() << 4) | (((len_len - 1) as u8) << 2) | (cookie_len - 1) as u8);
        put_be(&mut out, body.len() as u64, len_len);
        put_be(&mut out, u64::from(self.cookie), cookie_len);
        out.extend_from_slice(&body);
        out
    }

    /// Reads exactly one packet from `r`.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self, BinRpcError> {
        let mut hdr = [0u8; 2];
        r.read_exact(&mut hdr)?;

        if hdr[0] >> 4 != MAGIC {
            return Err(BinRpcError::BadMagic(hdr[0]));
        }
        if hdr[0] & 0x0f != VERSION {
            return Err(BinRpcError::BadVersion(hdr[0] & 0x0f));
        }
        let kind = PacketKind::from_code(hdr[1] >> 4)
            .ok_or(BinRpcError::UnexpectedPacketType(hdr[1] >> 4))?;
        let len_len = usize::from((hdr[1] >> 2) & 0x03) + 1;
        let cookie_len = usize::from(hdr[1] & 0x03) + 1;

        let mut buf = [0u8; 4];
        r.read_exact(&mut buf[..len_len])?;
        let body_len = read_be(&buf[..len_len]) as usize;
        if body_len > MAX_BODY_LEN {
            return Err(BinRpcError::TooLarge(body_len));
        }

        r.read_exact(&mut buf[..cookie_len])?;
        let cookie = read_be(&buf[..cookie_len]) as u32;

        let mut body = vec![0u8; body_len];
        r.read_exact(&mut body)?;

        let mut decoder = Decoder::new(&body);
        let mut values = Vec::new();
        while !decoder.is_empty() {
            values.push(decoder.next_value(0)?);
        }

        Ok(Self {
            kind,
            cookie,
            body: values,
        })
    }

    /// Validates a reply against the request cookie and returns its records.
    ///
    /// A fault packet is turned into [`BinRpcError::Fault`].
    pub fn into_records(self, cookie: u32) -> Result<Vec<Record>, BinRpcError> {
        if self.cookie != cookie {
            return Err(BinRpcError::CookieMismatch {
                sent: cookie,
                received: self.cookie,
            });
        }
        match self.kind {
            PacketKind::Reply => Ok(self.body),
            PacketKind::Fault => {
                let mut body = self.body.into_iter();
                let code = body.next().and_then(|v| v.as_int().ok()).unwrap_or(0);
                let message = body
                    .next()
                    .and_then(|v| v.as_string().ok())
                    .unwrap_or_default();
                Err(BinRpcError::Fault { code, message })
            }
            PacketKind::Request => Err(BinRpcError::UnexpectedPacketType(self.kind.code())),
        }
    }
}

/// Writes a request for `command`, with `param` when given.
pub fn write_request<W: Write>(
    w: &mut W,
    command: &str,
    param: Option<&str>,
    cookie: u32,
) -> Result<(), BinRpcError> {
    let params: Vec<&str> = param.into_iter().collect();
    w.write_all(&Packet::request(command, &params, cookie).encode())?;
    w.flush()?;
    Ok(())
}

/// Reads the reply to the request identified by `cookie`.
pub fn read_reply<R: Read>(r: &mut R, cookie: u32) -> Result<Vec<Record>, BinRpcError> {
    Packet::read_from(r)?.into_records(cookie)
}

// ============================================================
// Encoding
// ============================================================

/// Minimal number of bytes holding `v` (0 for zero).
fn int_len(v: u64) -> usize {
    (64 - v.leading_zeros() as usize).div_ceil(8)
}

fn put_be(out: &mut Vec<u8>, v: u64, len: usize) {
    for i in (0..len).rev() {
        out.push((v >> (8 * i)) as u8);
    }
}

fn read_be(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
}

/// Writes a tag for a value of `len` bytes, switching to the long form above 7.
fn put_mark(out: &mut Vec<u8>, typ: u8, len: usize) {
    if len < 8 {
        out.push(((len as u8) << 4) | typ);
    } else {
        let n = int_len(len as u64);
        out.push(F_LONG | ((n as u8) << 4) | typ);
        put_be(out, len as u64, n);
    }
}

fn put_int(out: &mut Vec<u8>, typ: u8, v: i64) {
    let bits = match i32::try_from(v) {
        Ok(small) => u64::from(small as u32),
        Err(_) => v as u64,
    };
    let n = int_len(bits);
    put_mark(out, typ, n);
    put_be(out, bits, n);
}

fn put_cstr(out: &mut Vec<u8>, typ: u8, s: &str) {
    put_mark(out, typ, s.len() + 1);
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

fn encode_value(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Int(i) => put_int(out, T_INT, *i),
        Value::Double(d) => put_int(out, T_DOUBLE, (d * 1000.0).round() as i64),
        Value::Str(s) => put_cstr(out, T_STR, s),
        Value::Bytes(b) => {
            put_mark(out, T_BYTES, b.len());
            out.extend_from_slice(b);
        }
        Value::Struct(items) => {
            out.push(T_STRUCT);
            for item in items {
                put_cstr(out, T_AVP, &item.key);
                encode_value(out, &item.value);
            }
            out.push(F_LONG | T_STRUCT);
        }
        Value::Array(values) => {
            out.push(T_ARRAY);
            for v in values {
                encode_value(out, v);
            }
            out.push(F_LONG | T_ARRAY);
        }
    }
}

// ============================================================
// Decoding
// ============================================================

struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], BinRpcError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or(BinRpcError::Truncated(self.pos))?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn peek(&self) -> Result<u8, BinRpcError> {
        self.buf
            .get(self.pos)
            .copied()
            .ok_or(BinRpcError::Truncated(self.pos))
    }

    /// Length of the value following a tag.
    fn value_len(&mut self, long: bool, size: u8) -> Result<usize, BinRpcError> {
        if !long {
            return Ok(usize::from(size));
        }
        if size == 0 || size > 4 {
            return Err(BinRpcError::Malformed("invalid length field size"));
        }
        let len = read_be(self.take(usize::from(size))?) as usize;
        if len > self.buf.len() {
            return Err(BinRpcError::Truncated(self.pos));
        }
        Ok(len)
    }

    /// Decodes one value found `depth` containers deep.
    fn next_value(&mut self, depth: usize) -> Result<Value, BinRpcError> {
        let tag = self.take(1)?[0];
        let long = tag & F_LONG != 0;
        let size = (tag >> 4) & 0x07;
        let typ = tag & 0x0f;

        match typ {
            T_INT | T_DOUBLE => {
                let len = self.value_len(long, size)?;
                if len > 8 {
                    return Err(BinRpcError::Malformed("integer wider than 8 bytes"));
                }
                let raw = read_be(self.take(len)?);
                let int = if len <= 4 {
                    i64::from(raw as u32 as i32)
                } else {
                    raw as i64
                };
                if typ == T_INT {
                    Ok(Value::Int(int))
                } else {
                    Ok(Value::Double(int as f64 / 1000.0))
                }
            }
            T_STR => {
                let len = self.value_len(long, size)?;
                Ok(Value::Str(cstr(self.take(len)?)))
            }
            T_BYTES => {
                let len = self.value_len(long, size)?;
                Ok(Value::Bytes(self.take(len)?.to_vec()))
            }
            T_STRUCT => {
                if long {
                    return Err(BinRpcError::Malformed("struct end without start"));
                }
                let depth = enter(depth)?;
                self.struct_body(depth).map(Value::Struct)
            }
            T_ARRAY => {
                if long {
                    return Err(BinRpcError::Malformed("array end without start"));
                }
                let depth = enter(depth)?;
                let mut values = Vec::new();
                while !self.at_end_marker(T_ARRAY)? {
                    values.push(self.next_value(depth)?);
                }
                Ok(Value::Array(values))
            }
            T_AVP => Err(BinRpcError::Malformed("struct member outside of a struct")),
            other => Err(BinRpcError::UnknownRecordType(other)),
        }
    }

    fn struct_body(&mut self, depth: usize) -> Result<Vec<StructItem>, BinRpcError> {
        let mut items = Vec::new();
        while !self.at_end_marker(T_STRUCT)? {
            let tag = self.take(1)?[0];
            if tag & 0x0f != T_AVP {
                return Err(BinRpcError::Malformed("struct member without a name"));
            }
            let len = self.value_len(tag & F_LONG != 0, (tag >> 4) & 0x07)?;
            let key = cstr(self.take(len)?);
            let value = self.next_value(depth)?;
            items.push(StructItem { key, value });
        }
        Ok(items)
    }

    /// Consumes the end marker of a container of type `typ` if it is next.
    fn at_end_marker(&mut self, typ: u8) -> Result<bool, BinRpcError> {
        if self.peek()? == F_LONG | typ {
            self.pos += 1;
            return Ok(true);
        }
        Ok(false)
    }
}

fn enter(depth: usize) -> Result<usize, BinRpcError> {
    if depth >= MAX_DEPTH {
        return Err(BinRpcError::Malformed("nesting too deep"));
    }
    Ok(depth + 1)
}

/// Decodes a NUL terminated string, tolerating a missing terminator.
fn cstr(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(&[0]).unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reply(cookie: u32, body: &[u8]) -> Vec<u8> {
        let mut out = vec![0xA1, 0x10 | (int_len(u64::from(cookie)).max(1) - 1) as u8];
        out.push(body.len() as u8);
        put_be(&mut out, u64::from(cookie), int_len(u64::from(cookie)).max(1));
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn int_len_is_minimal() {
        assert_eq!(int_len(0), 0);
        assert_eq!(int_len(0xff), 1);
        assert_eq!(int_len(0x100), 2);
        assert_eq!(int_len(u64::from(u32::MAX)), 4);
    }

    #[test]
    fn request_with_long_command_name_uses_length_field() {
        let bytes = Packet::request("core.uptime", &[], 0x1234).encode();
        let mut expected = vec![0xA1, 0x01, 14, 0x12, 0x34, 0x91, 12];
        expected.extend_from_slice(b"core.uptime\0");
        assert_eq!(bytes, expected);
    }

    #[test]
    fn request_with_parameter_appends_short_string() {
        let mut buf = Vec::new();
        write_request(&mut buf, "stats.fetch", Some("all"), 7).unwrap();

        let mut expected = vec![0xA1, 0x00, 19, 7, 0x91, 12];
        expected.extend_from_slice(b"stats.fetch\0");
        expected.extend_from_slice(&[0x41, b'a', b'l', b'l', 0]);
        assert_eq!(buf, expected);
    }

    #[test]
    fn ints_use_minimal_big_endian_bytes() {
        let mut out = Vec::new();
        put_int(&mut out, T_INT, 0);
        put_int(&mut out, T_INT, 300);
        put_int(&mut out, T_INT, -1);
        assert_eq!(
            out,
            vec![0x00, 0x20, 0x01, 0x2c, 0x40, 0xff, 0xff, 0xff, 0xff]
        );
    }

    #[test]
    fn decodes_struct_reply() {
        // { "pid": 123, "used": 70000, "name": "main" }
        let body = [
            0x03, //
            0x45, b'p', b'i', b'd', 0, 0x10, 123, //
            0x55, b'u', b's', b'e', b'd', 0, 0x30, 0x01, 0x11, 0x70, //
            0x55, b'n', b'a', b'm', b'e', 0, 0x51, b'm', b'a', b'i', b'n', 0, //
            0x83,
        ];
        let records = read_reply(&mut Cursor::new(reply(0xbeef, &body)), 0xbeef).unwrap();

        assert_eq!(records.len(), 1);
        let items = records[0].struct_items().unwrap();
        assert_eq!(items[0], StructItem::new("pid", Value::Int(123)));
        assert_eq!(items[1], StructItem::new("used", Value::Int(70000)));
        assert_eq!(items[2], StructItem::new("name", Value::Str("main".into())));
    }

    #[test]
    fn four_byte_ints_are_signed() {
        let body = [0x40, 0xff, 0xff, 0xff, 0xfe];
        let records = read_reply(&mut Cursor::new(reply(1, &body)), 1).unwrap();
        assert_eq!(records, vec![Value::Int(-2)]);
    }

    #[test]
    fn doubles_are_scaled_by_one_thousand() {
        let body = [0x22, 0x05, 0xdc];
        let records = read_reply(&mut Cursor::new(reply(1, &body)), 1).unwrap();
        assert_eq!(records, vec![Value::Double(1.5)]);
    }

    #[test]
    fn nested_containers_survive_encode_and_decode() {
        let long_key = "k".repeat(300);
        let packet = Packet {
            kind: PacketKind::Reply,
            cookie: 0xdead_beef,
            body: vec![Value::Struct(vec![
                StructItem::new(long_key.clone(), Value::Str("x".repeat(1000))),
                StructItem::new(
                    "list",
                    Value::Array(vec![Value::Int(1), Value::Bytes(vec![0, 1, 2])]),
                ),
                StructItem::new("inner", Value::Struct(vec![])),
            ])],
        };

        let bytes = packet.encode();
        // Body exceeds 255 bytes: two-byte length field, four-byte cookie.
        assert_eq!(bytes[1], 0x10 | (1 << 2) | 3);

        let decoded = Packet::read_from(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(decoded, packet);
    }

    /// Reply with a three-byte length field and a one-byte cookie of 1.
    fn large_reply(body: &[u8]) -> Vec<u8> {
        let mut out = vec![0xA1, 0x10 | (2 << 2)];
        put_be(&mut out, body.len() as u64, 3);
        out.push(1);
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn deeply_nested_reply_is_rejected() {
        let nested = |depth: usize| {
            let mut body = vec![T_ARRAY; depth];
            body.resize(2 * depth, F_LONG | T_ARRAY);
            large_reply(&body)
        };

        assert!(Packet::read_from(&mut Cursor::new(nested(MAX_DEPTH))).is_ok());

        let err = Packet::read_from(&mut Cursor::new(nested(2_000_000))).unwrap_err();
        assert!(matches!(err, BinRpcError::Malformed("nesting too deep")));
    }

    #[test]
    fn nesting_limit_applies_to_structs() {
        // { "a": { "a": { ... } } }
        let mut body = Vec::new();
        for _ in 0..=MAX_DEPTH {
            body.extend_from_slice(&[T_STRUCT, 0x25, b'a', 0]);
        }
        let err = Packet::read_from(&mut Cursor::new(large_reply(&body))).unwrap_err();
        assert!(matches!(err, BinRpcError::Malformed("nesting too deep")));
    }

    #[test]
    fn fault_reply_becomes_error() {
        let mut body = vec![0x20, 0x01, 0xf4, 0x91, 10];
        body.extend_from_slice(b"not found\0");
        let mut packet = reply(5, &body);
        packet[1] = 0x30;

        match read_reply(&mut Cursor::new(packet), 5) {
            Err(BinRpcError::Fault { code, message }) => {
                assert_eq!(code, 500);
                assert_eq!(message, "not found");
            }
            other => panic!("expected fault, got {:?}", other),
        }
    }

    #[test]
    fn cookie_mismatch_is_rejected() {
        let err = read_reply(&mut Cursor::new(reply(9, &[])), 10).unwrap_err();
        assert!(matches!(
            err,
            BinRpcError::CookieMismatch {
                sent: 10,
                received: 9
            }
        ));
    }

    #[test]
    fn bad_magic_and_version_are_rejected() {
        let err = Packet::read_from(&mut Cursor::new(vec![0xB1, 0x10, 0, 0])).unwrap_err();
        assert!(matches!(err, BinRpcError::BadMagic(0xB1)));

        let err = Packet::read_from(&mut Cursor::new(vec![0xA2, 0x10, 0, 0])).unwrap_err();
        assert!(matches!(err, BinRpcError::BadVersion(2)));
    }

    #[test]
    fn short_stream_is_an_io_error() {
        let mut packet = reply(1, &[0x10, 5]);
        packet.truncate(packet.len() - 1);
        let err = read_reply(&mut Cursor::new(packet), 1).unwrap_err();
        assert!(matches!(err, BinRpcError::Io(_)));
    }

    #[test]
    fn unterminated_struct_is_truncated() {
        let body = [0x03, 0x45, b'p', b'i', b'd', 0, 0x10, 1];
        let err = read_reply(&mut Cursor::new(reply(1, &body)), 1).unwrap_err();
        assert!(matches!(err, BinRpcError::Truncated(_)));
    }

    #[test]
    fn struct_member_needs_a_name() {
        let body = [0x03, 0x10, 1, 0x83];
        let err = read_reply(&mut Cursor::new(reply(1, &body)), 1).unwrap_err();
        assert!(matches!(err, BinRpcError::Malformed(_)));
    }
}
