//! N-dimensional array node.
//!
//! A [`Tensor`] is dtype + shape + a flat little-endian element buffer. The
//! buffer is either owned or a shared view into a memory-mapped store file.
//! A tensor that currently lives in an array store carries a [`Backing`]
//! naming the store and key, which lets the serializer reuse the existing
//! entry instead of rewriting it.

use std::sync::Arc;

use memmap2::Mmap;

use crate::error::{TreeError, TreeResult};
use crate::node::{node_common, Node, NodeKind};

/// Canonical type-tag for inline tensors in a document.
pub const TENSOR_TYPE: &str = "arbor.Tensor";

/// Element type of a tensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

impl DType {
    /// Size of one element in bytes.
    pub fn size(&self) -> usize {
        match self {
            DType::Bool | DType::I8 | DType::U8 => 1,
            DType::I16 | DType::U16 => 2,
            DType::I32 | DType::U32 | DType::F32 => 4,
            DType::I64 | DType::U64 | DType::F64 => 8,
        }
    }

    /// Name used in the document grammar and diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::I8 => "i8",
            DType::I16 => "i16",
            DType::I32 => "i32",
            DType::I64 => "i64",
            DType::U8 => "u8",
            DType::U16 => "u16",
            DType::U32 => "u32",
            DType::U64 => "u64",
            DType::F32 => "f32",
            DType::F64 => "f64",
        }
    }

    /// Parse a dtype name from a document.
    pub fn parse(name: &str) -> TreeResult<Self> {
        Ok(match name {
            "bool" => DType::Bool,
            "i8" => DType::I8,
            "i16" => DType::I16,
            "i32" => DType::I32,
            "i64" => DType::I64,
            "u8" => DType::U8,
            "u16" => DType::U16,
            "u32" => DType::U32,
            "u64" => DType::U64,
            "f32" => DType::F32,
            "f64" => DType::F64,
            other => return Err(TreeError::UnknownDType(other.to_string())),
        })
    }

    /// One-byte code for the array file header.
    pub fn code(&self) -> u8 {
        match self {
            DType::Bool => 0,
            DType::I8 => 1,
            DType::I16 => 2,
            DType::I32 => 3,
            DType::I64 => 4,
            DType::U8 => 5,
            DType::U16 => 6,
            DType::U32 => 7,
            DType::U64 => 8,
            DType::F32 => 9,
            DType::F64 => 10,
        }
    }

    /// Inverse of [`DType::code`].
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => DType::Bool,
            1 => DType::I8,
            2 => DType::I16,
            3 => DType::I32,
            4 => DType::I64,
            5 => DType::U8,
            6 => DType::U16,
            7 => DType::U32,
            8 => DType::U64,
            9 => DType::F32,
            10 => DType::F64,
            _ => return None,
        })
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A single element read out of (or written into) a tensor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Elem {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
}

/// Rust types that can serve as tensor elements.
pub trait Element: Copy + Send + 'static {
    const DTYPE: DType;
    fn write_le(self, out: &mut Vec<u8>);
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! numeric_element {
    ($($ty:ty => $dtype:expr),* $(,)?) => {$(
        impl Element for $ty {
            const DTYPE: DType = $dtype;
            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }
            fn read_le(bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$ty>()];
                buf.copy_from_slice(&bytes[..std::mem::size_of::<$ty>()]);
                <$ty>::from_le_bytes(buf)
            }
        }
    )*};
}

numeric_element!(
    i8 => DType::I8,
    i16 => DType::I16,
    i32 => DType::I32,
    i64 => DType::I64,
    u8 => DType::U8,
    u16 => DType::U16,
    u32 => DType::U32,
    u64 => DType::U64,
    f32 => DType::F32,
    f64 => DType::F64,
);

impl Element for bool {
    const DTYPE: DType = DType::Bool;
    fn write_le(self, out: &mut Vec<u8>) {
        out.push(self as u8);
    }
    fn read_le(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

/// Where an externalized tensor currently lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Backing {
    /// Identity of the owning store (canonical root for directory stores).
    pub store: String,
    /// Structural-path key within the store.
    pub key: String,
}

#[derive(Clone)]
enum Buf {
    Owned(Vec<u8>),
    Mapped {
        map: Arc<Mmap>,
        offset: usize,
        len: usize,
    },
}

/// N-dimensional array with a flat little-endian buffer.
#[derive(Clone)]
pub struct Tensor {
    dtype: DType,
    shape: Vec<usize>,
    buf: Buf,
    backing: Option<Backing>,
}

impl Tensor {
    /// All-zero tensor of the given dtype and shape.
    pub fn zeros(dtype: DType, shape: &[usize]) -> Self {
        let len = shape.iter().product::<usize>() * dtype.size();
        Self {
            dtype,
            shape: shape.to_vec(),
            buf: Buf::Owned(vec![0u8; len]),
            backing: None,
        }
    }

    /// Build from a typed slice; the element count must match the shape.
    pub fn from_slice<T: Element>(shape: &[usize], data: &[T]) -> TreeResult<Self> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(TreeError::ShapeMismatch {
                shape: shape.to_vec(),
                expected,
                actual: data.len(),
            });
        }
        let mut bytes = Vec::with_capacity(expected * T::DTYPE.size());
        for v in data {
            v.write_le(&mut bytes);
        }
        Ok(Self {
            dtype: T::DTYPE,
            shape: shape.to_vec(),
            buf: Buf::Owned(bytes),
            backing: None,
        })
    }

    /// Build from dynamically typed elements, casting each into `dtype`.
    pub fn from_elems(dtype: DType, shape: &[usize], elems: &[Elem]) -> TreeResult<Self> {
        let expected: usize = shape.iter().product();
        if elems.len() != expected {
            return Err(TreeError::ShapeMismatch {
                shape: shape.to_vec(),
                expected,
                actual: elems.len(),
            });
        }
        let mut t = Self::zeros(dtype, shape);
        for (i, e) in elems.iter().enumerate() {
            t.write_elem(i, *e);
        }
        Ok(t)
    }

    /// Adopt a raw owned byte buffer (store read path).
    pub fn from_bytes(dtype: DType, shape: &[usize], bytes: Vec<u8>) -> TreeResult<Self> {
        let expected = shape.iter().product::<usize>() * dtype.size();
        if bytes.len() != expected {
            return Err(TreeError::BufferTooShort {
                expected,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            dtype,
            shape: shape.to_vec(),
            buf: Buf::Owned(bytes),
            backing: None,
        })
    }

    /// View into a shared memory mapping (store mapped-read path).
    pub fn from_mapped(
        dtype: DType,
        shape: &[usize],
        map: Arc<Mmap>,
        offset: usize,
    ) -> TreeResult<Self> {
        let len = shape.iter().product::<usize>() * dtype.size();
        if offset + len > map.len() {
            return Err(TreeError::BufferTooShort {
                expected: offset + len,
                actual: map.len(),
            });
        }
        Ok(Self {
            dtype,
            shape: shape.to_vec(),
            buf: Buf::Mapped { map, offset, len },
            backing: None,
        })
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Total element count.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the buffer is a memory-mapped store view.
    pub fn is_mapped(&self) -> bool {
        matches!(self.buf, Buf::Mapped { .. })
    }

    pub fn backing(&self) -> Option<&Backing> {
        self.backing.as_ref()
    }

    pub fn set_backing(&mut self, backing: Option<Backing>) {
        self.backing = backing;
    }

    /// Raw little-endian element bytes.
    pub fn bytes(&self) -> &[u8] {
        match &self.buf {
            Buf::Owned(v) => v,
            Buf::Mapped { map, offset, len } => &map[*offset..*offset + *len],
        }
    }

    /// Mutable bytes. A mapped buffer is first copied into an owned one,
    /// and the backing is cleared: the store entry no longer reflects this
    /// tensor, so the next save must re-externalize it.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        if let Buf::Mapped { .. } = self.buf {
            let copy = self.bytes().to_vec();
            self.buf = Buf::Owned(copy);
        }
        self.backing = None;
        match &mut self.buf {
            Buf::Owned(v) => v,
            Buf::Mapped { .. } => unreachable!(),
        }
    }

    /// Read the element at flat index `i`.
    pub fn get_elem(&self, i: usize) -> Option<Elem> {
        if i >= self.len() {
            return None;
        }
        let size = self.dtype.size();
        let chunk = &self.bytes()[i * size..(i + 1) * size];
        Some(match self.dtype {
            DType::Bool => Elem::Bool(bool::read_le(chunk)),
            DType::I8 => Elem::Int(i8::read_le(chunk) as i64),
            DType::I16 => Elem::Int(i16::read_le(chunk) as i64),
            DType::I32 => Elem::Int(i32::read_le(chunk) as i64),
            DType::I64 => Elem::Int(i64::read_le(chunk)),
            DType::U8 => Elem::UInt(u8::read_le(chunk) as u64),
            DType::U16 => Elem::UInt(u16::read_le(chunk) as u64),
            DType::U32 => Elem::UInt(u32::read_le(chunk) as u64),
            DType::U64 => Elem::UInt(u64::read_le(chunk)),
            DType::F32 => Elem::Float(f32::read_le(chunk) as f64),
            DType::F64 => Elem::Float(f64::read_le(chunk)),
        })
    }

    /// Write the element at flat index `i`, casting into the dtype.
    /// Detaches any store backing (see [`Tensor::bytes_mut`]).
    pub fn set_elem(&mut self, i: usize, value: Elem) -> bool {
        if i >= self.len() {
            return false;
        }
        self.write_elem(i, value);
        self.backing = None;
        true
    }

    /// Copy out as a typed vector; `None` when the dtype does not match.
    pub fn to_vec<T: Element>(&self) -> Option<Vec<T>> {
        if self.dtype != T::DTYPE {
            return None;
        }
        let size = self.dtype.size();
        Some(
            self.bytes()
                .chunks_exact(size)
                .map(|c| T::read_le(c))
                .collect(),
        )
    }

    fn write_elem(&mut self, i: usize, value: Elem) {
        let dtype = self.dtype;
        let size = dtype.size();
        // Owned-buffer write that leaves the backing untouched; public
        // mutation entry points clear it themselves.
        if let Buf::Mapped { .. } = self.buf {
            let copy = self.bytes().to_vec();
            self.buf = Buf::Owned(copy);
        }
        let bytes = match &mut self.buf {
            Buf::Owned(v) => v,
            Buf::Mapped { .. } => unreachable!(),
        };
        let mut tmp = Vec::with_capacity(size);
        match dtype {
            DType::Bool => (match value {
                Elem::Bool(b) => b,
                Elem::Int(v) => v != 0,
                Elem::UInt(v) => v != 0,
                Elem::Float(f) => f != 0.0,
            })
            .write_le(&mut tmp),
            DType::I8 => (value.as_i64() as i8).write_le(&mut tmp),
            DType::I16 => (value.as_i64() as i16).write_le(&mut tmp),
            DType::I32 => (value.as_i64() as i32).write_le(&mut tmp),
            DType::I64 => value.as_i64().write_le(&mut tmp),
            DType::U8 => (value.as_u64() as u8).write_le(&mut tmp),
            DType::U16 => (value.as_u64() as u16).write_le(&mut tmp),
            DType::U32 => (value.as_u64() as u32).write_le(&mut tmp),
            DType::U64 => value.as_u64().write_le(&mut tmp),
            DType::F32 => (value.as_f64() as f32).write_le(&mut tmp),
            DType::F64 => value.as_f64().write_le(&mut tmp),
        }
        bytes[i * size..(i + 1) * size].copy_from_slice(&tmp);
    }
}

impl Elem {
    pub fn as_i64(&self) -> i64 {
        match self {
            Elem::Bool(b) => *b as i64,
            Elem::Int(v) => *v,
            Elem::UInt(v) => *v as i64,
            Elem::Float(f) => *f as i64,
        }
    }

    pub fn as_u64(&self) -> u64 {
        match self {
            Elem::Bool(b) => *b as u64,
            Elem::Int(v) => *v as u64,
            Elem::UInt(v) => *v,
            Elem::Float(f) => *f as u64,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Elem::Bool(b) => (*b as i64) as f64,
            Elem::Int(v) => *v as f64,
            Elem::UInt(v) => *v as f64,
            Elem::Float(f) => *f,
        }
    }
}

impl PartialEq for Tensor {
    // Logical equality: dtype, shape, and element bytes. Backing and buffer
    // residency (owned vs mapped) are not part of the value.
    fn eq(&self, other: &Self) -> bool {
        self.dtype == other.dtype && self.shape == other.shape && self.bytes() == other.bytes()
    }
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("dtype", &self.dtype.name())
            .field("shape", &self.shape)
            .field("mapped", &self.is_mapped())
            .field("backing", &self.backing)
            .finish()
    }
}

impl Node for Tensor {
    fn type_name(&self) -> &str {
        TENSOR_TYPE
    }
    fn kind(&self) -> NodeKind {
        NodeKind::Tensor
    }
    node_common!();

    fn as_tensor(&self) -> Option<&Tensor> {
        Some(self)
    }
    fn as_tensor_mut(&mut self) -> Option<&mut Tensor> {
        Some(self)
    }
}
