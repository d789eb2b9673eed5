//! # Bytecode file framing
//!
//! A minimal container format for a serialized [`CompiledUnit`]: an 8-byte
//! magic, a little-endian version, a little-endian payload size, a
//! little-endian CRC32 (IEEE 802.3 polynomial) of the payload, then the
//! payload itself. The CRC32 table is computed once at startup rather than
//! pulled from a crate, matching how small framing readers elsewhere in
//! this pack hand-roll their own checksum rather than take on a dependency
//! for eight bytes of integrity checking.

use crate::bytecode::Chunk;
use crate::value::{CompiledUnit, StringHandle, Value};
use std::io;

pub const MAGIC: [u8; 8] = *b"RmldCSW\x1a";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("not a compiled storyworld file (bad magic)")]
    BadMagic,
    #[error("unsupported bytecode format version {0}")]
    UnsupportedVersion(u32),
    #[error("payload size mismatch: header says {expected}, found {found}")]
    SizeMismatch { expected: u32, found: usize },
    #[error("checksum mismatch: file is corrupt")]
    ChecksumMismatch,
    #[error("truncated bytecode file")]
    Truncated,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Wraps `payload` in the framing header and returns the full file bytes.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + 4 + 4 + 4 + payload.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&crc32(payload).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Validates the header and checksum and returns the payload slice.
pub fn unframe(bytes: &[u8]) -> Result<&[u8], PersistError> {
    if bytes.len() < 20 {
        return Err(PersistError::Truncated);
    }
    if bytes[0..8] != MAGIC {
        return Err(PersistError::BadMagic);
    }
    let version = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
    if version != FORMAT_VERSION {
        return Err(PersistError::UnsupportedVersion(version));
    }
    let size = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
    let checksum = u32::from_le_bytes(bytes[16..20].try_into().unwrap());
    let payload = &bytes[20..];
    if payload.len() != size as usize {
        return Err(PersistError::SizeMismatch {
            expected: size,
            found: payload.len(),
        });
    }
    if crc32(payload) != checksum {
        return Err(PersistError::ChecksumMismatch);
    }
    Ok(payload)
}

// --- Compiled unit encoding ---
//
// A flat, hand-written binary layout: every variable-length section is a
// u32 element count followed by its elements, every string is a u32 byte
// length followed by its UTF-8 bytes. No serde; this mirrors the framing
// header's own manual little-endian style.

struct Writer(Vec<u8>);

impl Writer {
    fn u8(&mut self, v: u8) {
        self.0.push(v);
    }
    fn u32(&mut self, v: u32) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }
    fn i64(&mut self, v: i64) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }
    fn f64(&mut self, v: f64) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }
    fn bytes(&mut self, v: &[u8]) {
        self.u32(v.len() as u32);
        self.0.extend_from_slice(v);
    }
    fn string(&mut self, v: &str) {
        self.bytes(v.as_bytes());
    }
    fn value(&mut self, v: &Value) {
        match v {
            Value::Int(i) => {
                self.u8(0);
                self.i64(*i);
            }
            Value::Float(f) => {
                self.u8(1);
                self.f64(*f);
            }
            Value::Bool(b) => {
                self.u8(2);
                self.u8(*b as u8);
            }
            Value::Str(h) => {
                self.u8(3);
                self.u32(h.0);
            }
            Value::Function(idx) => {
                self.u8(4);
                self.u32(*idx);
            }
        }
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }
    fn u8(&mut self) -> Result<u8, PersistError> {
        let v = *self.bytes.get(self.pos).ok_or(PersistError::Truncated)?;
        self.pos += 1;
        Ok(v)
    }
    fn u32(&mut self) -> Result<u32, PersistError> {
        let end = self.pos + 4;
        let slice = self.bytes.get(self.pos..end).ok_or(PersistError::Truncated)?;
        self.pos = end;
        Ok(u32::from_le_bytes(slice.try_into().unwrap()))
    }
    fn i64(&mut self) -> Result<i64, PersistError> {
        let end = self.pos + 8;
        let slice = self.bytes.get(self.pos..end).ok_or(PersistError::Truncated)?;
        self.pos = end;
        Ok(i64::from_le_bytes(slice.try_into().unwrap()))
    }
    fn f64(&mut self) -> Result<f64, PersistError> {
        let end = self.pos + 8;
        let slice = self.bytes.get(self.pos..end).ok_or(PersistError::Truncated)?;
        self.pos = end;
        Ok(f64::from_le_bytes(slice.try_into().unwrap()))
    }
    fn bytes(&mut self) -> Result<&'a [u8], PersistError> {
        let len = self.u32()? as usize;
        let end = self.pos + len;
        let slice = self.bytes.get(self.pos..end).ok_or(PersistError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }
    fn string(&mut self) -> Result<String, PersistError> {
        let bytes = self.bytes()?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
    fn value(&mut self) -> Result<Value, PersistError> {
        Ok(match self.u8()? {
            0 => Value::Int(self.i64()?),
            1 => Value::Float(self.f64()?),
            2 => Value::Bool(self.u8()? != 0),
            3 => Value::Str(StringHandle(self.u32()?)),
            4 => Value::Function(self.u32()?),
            tag => return Err(PersistError::UnsupportedVersion(tag as u32)),
        })
    }
}

/// Serializes a compiled unit to the flat binary layout, ready to be
/// wrapped with [`frame`].
pub fn serialize_unit(unit: &CompiledUnit) -> Vec<u8> {
    let mut w = Writer(Vec::new());

    w.u32(unit.chunks.len() as u32);
    for (idx, chunk) in unit.chunks.iter().enumerate() {
        w.string(&unit.debug.chunk_names[idx]);
        w.bytes(&chunk.code);
        let lines = &unit.debug.lines[idx];
        w.u32(lines.len() as u32);
        for line in lines {
            w.u32(*line as u32);
        }
    }

    match unit.entry_chunk {
        Some(idx) => {
            w.u8(1);
            w.u32(idx);
        }
        None => w.u8(0),
    }

    w.u32(unit.global_names.len() as u32);
    for name in &unit.global_names {
        w.string(name);
    }
    w.u32(unit.globals.len() as u32);
    for v in &unit.globals {
        w.value(v);
    }

    w.u32(unit.constants.len() as u32);
    for v in &unit.constants {
        w.value(v);
    }

    let strings = unit.interner.strings();
    w.u32(strings.len() as u32);
    for s in strings {
        w.string(s);
    }

    w.0
}

/// Reconstructs a compiled unit from bytes produced by [`serialize_unit`].
pub fn deserialize_unit(bytes: &[u8]) -> Result<CompiledUnit, PersistError> {
    let mut r = Reader::new(bytes);
    let mut unit = CompiledUnit::new();

    let chunk_count = r.u32()?;
    for _ in 0..chunk_count {
        let name = r.string()?;
        let code = r.bytes()?.to_vec();
        let line_count = r.u32()?;
        let mut lines = Vec::with_capacity(line_count as usize);
        for _ in 0..line_count {
            lines.push(r.u32()? as usize);
        }
        let idx = unit.add_chunk(name);
        unit.chunks[idx as usize] = Chunk { code };
        unit.debug.lines[idx as usize] = lines;
    }

    if r.u8()? == 1 {
        unit.entry_chunk = Some(r.u32()?);
    }

    let global_name_count = r.u32()?;
    for _ in 0..global_name_count {
        unit.global_names.push(r.string()?);
    }
    let global_count = r.u32()?;
    for _ in 0..global_count {
        unit.globals.push(r.value()?);
    }

    let constant_count = r.u32()?;
    for _ in 0..constant_count {
        unit.constants.push(r.value()?);
    }

    let string_count = r.u32()?;
    let mut strings = Vec::with_capacity(string_count as usize);
    for _ in 0..string_count {
        strings.push(r.string()?);
    }
    unit.interner = crate::value::Interner::from_strings(strings);

    Ok(unit)
}

const CRC32_POLY: u32 = 0xEDB88320;

fn crc32_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut c = i as u32;
        let mut k = 0;
        while k < 8 {
            c = if c & 1 != 0 { CRC32_POLY ^ (c >> 1) } else { c >> 1 };
            k += 1;
        }
        table[i] = c;
        i += 1;
    }
    table
}

fn crc32(data: &[u8]) -> u32 {
    let table = crc32_table();
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        let idx = ((crc ^ byte as u32) & 0xFF) as usize;
        crc = table[idx] ^ (crc >> 8);
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_payload() {
        let payload = b"some bytecode bytes here";
        let framed = frame(payload);
        let recovered = unframe(&framed).unwrap();
        assert_eq!(recovered, payload);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut framed = frame(b"hello");
        framed[0] = 0;
        assert!(matches!(unframe(&framed), Err(PersistError::BadMagic)));
    }

    #[test]
    fn rejects_corrupted_payload() {
        let mut framed = frame(b"hello world");
        let last = framed.len() - 1;
        framed[last] ^= 0xFF;
        assert!(matches!(unframe(&framed), Err(PersistError::ChecksumMismatch)));
    }

    #[test]
    fn rejects_truncated_file() {
        assert!(matches!(unframe(&[1, 2, 3]), Err(PersistError::Truncated)));
    }

    #[test]
    fn round_trips_a_compiled_unit() {
        let unit = crate::compiler::compile("function main(): void .print(\"hi\") end")
            .expect("trivial storyworld compiles");
        let payload = serialize_unit(&unit);
        let framed = frame(&payload);
        let recovered_payload = unframe(&framed).unwrap();
        let recovered = deserialize_unit(recovered_payload).unwrap();

        assert_eq!(recovered.entry_chunk, unit.entry_chunk);
        assert_eq!(recovered.constants, unit.constants);
        assert_eq!(recovered.global_names, unit.global_names);
        assert_eq!(
            recovered.chunk(unit.entry_chunk.unwrap()).code,
            unit.chunk(unit.entry_chunk.unwrap()).code
        );
        assert_eq!(recovered.interner.strings(), unit.interner.strings());
    }
}
