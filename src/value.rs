//! # Runtime values, string interning, and the compiled unit
//!
//! `Value` is the VM's tagged union. `BNum` is deliberately absent from it:
//! the compiler tracks bounded-number-ness statically and always selects
//! the right opcode, but at runtime a bnum is just a `Value::Float`.
//! [`Interner`] gives every distinct string content exactly one canonical
//! handle for the unit's lifetime. [`CompiledUnit`] is the immutable
//! (except for globals) artifact the VM executes.

use crate::bytecode::Chunk;
use std::collections::HashMap;

/// A handle into the string interner. Two handles are equal iff the
/// underlying content was equal at intern time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StringHandle(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(StringHandle),
    /// A function value: the index of its chunk in the compiled unit.
    Function(u32),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Function(_) => "function",
        }
    }
}

/// Content-addressed string table. The same content always yields the same
/// handle, so string equality at runtime is handle equality.
#[derive(Debug, Default)]
pub struct Interner {
    strings: Vec<String>,
    lookup: HashMap<String, StringHandle>,
}

impl Interner {
    pub fn new() -> Self {
        Interner::default()
    }

    pub fn intern(&mut self, s: &str) -> StringHandle {
        if let Some(handle) = self.lookup.get(s) {
            return *handle;
        }
        let handle = StringHandle(self.strings.len() as u32);
        self.strings.push(s.to_string());
        self.lookup.insert(s.to_string(), handle);
        handle
    }

    pub fn resolve(&self, handle: StringHandle) -> &str {
        &self.strings[handle.0 as usize]
    }

    /// All interned strings in handle order (handle `i` resolves to
    /// `strings()[i]`). Used by the bytecode persistence format, which
    /// rebuilds an interner from a flat string list.
    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    /// Rebuilds an interner from strings already in handle order, as
    /// produced by [`Interner::strings`].
    pub fn from_strings(strings: Vec<String>) -> Self {
        let lookup = strings
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), StringHandle(i as u32)))
            .collect();
        Interner { strings, lookup }
    }
}

/// Debug info parallel to a `CompiledUnit`'s chunks: the function name and,
/// for every emitted byte, the source line that produced it.
#[derive(Debug, Default)]
pub struct DebugInfo {
    pub chunk_names: Vec<String>,
    pub lines: Vec<Vec<usize>>,
}

impl DebugInfo {
    pub fn new() -> Self {
        DebugInfo::default()
    }

    pub fn add_chunk(&mut self, name: impl Into<String>) -> u32 {
        let idx = self.chunk_names.len() as u32;
        self.chunk_names.push(name.into());
        self.lines.push(Vec::new());
        idx
    }

    pub fn line_at(&self, chunk: u32, byte_offset: usize) -> usize {
        self.lines[chunk as usize]
            .get(byte_offset)
            .copied()
            .unwrap_or(0)
    }
}

/// The output of compilation: every chunk, the globals list, the
/// structurally-deduplicated constant pool, and the string interner. Owns
/// everything the VM reads; the VM may only mutate the globals slice.
#[derive(Debug, Default)]
pub struct CompiledUnit {
    pub chunks: Vec<Chunk>,
    pub entry_chunk: Option<u32>,
    pub global_names: Vec<String>,
    pub globals: Vec<Value>,
    pub constants: Vec<Value>,
    pub interner: Interner,
    pub debug: DebugInfo,
}

impl CompiledUnit {
    pub fn new() -> Self {
        CompiledUnit::default()
    }

    pub fn add_chunk(&mut self, name: impl Into<String>) -> u32 {
        self.chunks.push(Chunk::new());
        self.debug.add_chunk(name)
    }

    pub fn chunk(&self, idx: u32) -> &Chunk {
        &self.chunks[idx as usize]
    }

    pub fn chunk_mut(&mut self, idx: u32) -> &mut Chunk {
        &mut self.chunks[idx as usize]
    }

    /// Appends `value` to the constant pool, reusing an existing slot if an
    /// structurally-equal constant is already present (invariant: no
    /// duplicates). Enforces the 2^24-entry ceiling.
    pub fn add_constant(&mut self, value: Value) -> Result<u32, String> {
        if let Some(idx) = self.constants.iter().position(|v| *v == value) {
            return Ok(idx as u32);
        }
        if self.constants.len() >= (1 << 24) {
            return Err("Too many constants in one chunk".to_string());
        }
        self.constants.push(value);
        Ok((self.constants.len() - 1) as u32)
    }

    pub fn add_global(&mut self, name: impl Into<String>, value: Value) -> Result<u8, String> {
        if self.globals.len() >= 256 {
            return Err("Too many globals".to_string());
        }
        let idx = self.globals.len() as u8;
        self.global_names.push(name.into());
        self.globals.push(value);
        Ok(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interner_returns_same_handle_for_equal_content() {
        let mut interner = Interner::new();
        let a = interner.intern("hello");
        let b = interner.intern("hello");
        let c = interner.intern("world");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(interner.resolve(a), "hello");
    }

    #[test]
    fn constant_pool_deduplicates() {
        let mut unit = CompiledUnit::new();
        let a = unit.add_constant(Value::Int(42)).unwrap();
        let b = unit.add_constant(Value::Int(42)).unwrap();
        let c = unit.add_constant(Value::Int(43)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(unit.constants.len(), 2);
    }
}
