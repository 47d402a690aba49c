//! The `Tensor` value type (§3).
//!
//! An immutable-by-value container: element kind, shape, and a byte
//! buffer whose size is `elementsize(kind) * product(shape)` unless the
//! shape is empty (rank 0, meaning "unset").

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DType {
    Float32,
    Float64,
    Int32,
    Int64,
    UInt8,
}

impl DType {
    pub fn element_size(self) -> usize {
        match self {
            DType::Float32 => 4,
            DType::Float64 => 8,
            DType::Int32 => 4,
            DType::Int64 => 8,
            DType::UInt8 => 1,
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            DType::Float32 => 0,
            DType::Float64 => 1,
            DType::Int32 => 2,
            DType::Int64 => 3,
            DType::UInt8 => 4,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(DType::Float32),
            1 => Some(DType::Float64),
            2 => Some(DType::Int32),
            3 => Some(DType::Int64),
            4 => Some(DType::UInt8),
            _ => None,
        }
    }
}

/// An immutable-by-value tensor: dtype, shape, raw little-endian bytes.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    dtype: DType,
    shape: Vec<u64>,
    bytes: Vec<u8>,
}

impl Tensor {
    /// Construct a tensor, validating `bytes.len()` against shape/dtype.
    ///
    /// An empty shape (rank 0) means "unset" and allows any byte length —
    /// it is used for the end-of-stream sentinel (`Producer::next`).
    pub fn new(dtype: DType, shape: Vec<u64>, bytes: Vec<u8>) -> Self {
        if !shape.is_empty() {
            let expected = dtype.element_size() as u64 * shape.iter().product::<u64>();
            debug_assert_eq!(bytes.len() as u64, expected, "tensor byte length mismatch");
        }
        Self {
            dtype,
            shape,
            bytes,
        }
    }

    /// The end-of-stream / "unset" sentinel: rank 0, no bytes.
    pub fn empty(dtype: DType) -> Self {
        Self {
            dtype,
            shape: Vec::new(),
            bytes: Vec::new(),
        }
    }

    /// Zero-filled tensor of the given shape.
    pub fn zeros(dtype: DType, shape: Vec<u64>) -> Self {
        let len = dtype.element_size() * shape.iter().product::<u64>() as usize;
        Self::new(dtype, shape, vec![0u8; len])
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn is_empty_stream_marker(&self) -> bool {
        self.shape.is_empty()
    }

    pub fn len(&self) -> u64 {
        self.shape.iter().product()
    }

    /// View as `f32` (panics if `dtype != Float32` or bytes are misaligned).
    pub fn as_f32(&self) -> Vec<f32> {
        assert_eq!(self.dtype, DType::Float32);
        self.bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
            .collect()
    }

    /// Build a rank-1 `Float32` tensor from values.
    pub fn from_f32(values: &[f32]) -> Self {
        let mut bytes = Vec::with_capacity(values.len() * 4);
        for v in values {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        Self::new(DType::Float32, vec![values.len() as u64], bytes)
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor({:?}, shape={:?})", self.dtype, self.shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tensor_has_rank_zero() {
        let t = Tensor::empty(DType::Float32);
        assert!(t.is_empty_stream_marker());
        assert_eq!(t.bytes().len(), 0);
    }

    #[test]
    fn from_f32_round_trips() {
        let t = Tensor::from_f32(&[1.0, 2.0, 3.0]);
        assert_eq!(t.as_f32(), vec![1.0, 2.0, 3.0]);
        assert_eq!(t.shape(), &[3]);
    }

    #[test]
    fn zeros_has_expected_byte_length() {
        let t = Tensor::zeros(DType::Float64, vec![2, 3]);
        assert_eq!(t.bytes().len(), 2 * 3 * 8);
    }
}
