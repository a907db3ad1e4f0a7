// Tensor payloads routed between modules.
//
// The scheduler never inspects tensor contents; it only clones and moves
// them. Data is reference-counted so broadcast fan-out is a pointer copy.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::TandemError;

// ── Tensor Dtype ─────────────────────────────────────────────────────────────

/// Element type of a tensor payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TensorDtype {
    F16  = 0,
    BF16 = 1,
    F32  = 2,
    I32  = 3,
    I64  = 4,
    U8   = 5,
}

impl TensorDtype {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::F16),
            1 => Some(Self::BF16),
            2 => Some(Self::F32),
            3 => Some(Self::I32),
            4 => Some(Self::I64),
            5 => Some(Self::U8),
            _ => None,
        }
    }

    /// Bytes per element for this dtype.
    pub fn element_bytes(&self) -> usize {
        match self {
            Self::U8 => 1,
            Self::F16 | Self::BF16 => 2,
            Self::F32 | Self::I32 => 4,
            Self::I64 => 8,
        }
    }
}

impl fmt::Display for TensorDtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

// ── Tensor ───────────────────────────────────────────────────────────────────

/// An immutable, shape-checked tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    dtype: TensorDtype,
    shape: Vec<u32>,
    data: Arc<[u8]>,
}

impl Tensor {
    /// Build a tensor, checking that `data` holds exactly `shape` elements.
    ///
    /// A shape whose byte size overflows `usize` reports `expected` as
    /// `usize::MAX`.
    pub fn new(dtype: TensorDtype, shape: Vec<u32>, data: Vec<u8>) -> Result<Self, TandemError> {
        let expected = element_count(&shape).and_then(|n| n.checked_mul(dtype.element_bytes()));
        if expected != Some(data.len()) {
            return Err(TandemError::TensorSize {
                shape,
                dtype,
                expected: expected.unwrap_or(usize::MAX),
                actual: data.len(),
            });
        }
        Ok(Self {
            dtype,
            shape,
            data: data.into(),
        })
    }

    pub fn from_f32(shape: Vec<u32>, values: &[f32]) -> Result<Self, TandemError> {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::new(TensorDtype::F32, shape, data)
    }

    /// One-dimensional `f32` tensor.
    pub fn vector(values: &[f32]) -> Self {
        let data: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self {
            dtype: TensorDtype::F32,
            shape: vec![values.len() as u32],
            data: data.into(),
        }
    }

    /// Decode little-endian `f32` elements.
    pub fn to_f32(&self) -> Result<Vec<f32>, TandemError> {
        if self.dtype != TensorDtype::F32 {
            return Err(TandemError::DtypeMismatch {
                expected: TensorDtype::F32,
                actual: self.dtype,
            });
        }
        Ok(self
            .data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    pub fn dtype(&self) -> TensorDtype {
        self.dtype
    }

    pub fn shape(&self) -> &[u32] {
        &self.shape
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.dtype.element_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn element_count(shape: &[u32]) -> Option<usize> {
    shape
        .iter()
        .try_fold(1usize, |acc, d| acc.checked_mul(*d as usize))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dtype_from_u8() {
        for v in 0..=5u8 {
            let dt = TensorDtype::from_u8(v).unwrap();
            assert_eq!(dt as u8, v);
        }
        assert!(TensorDtype::from_u8(6).is_none());
    }

    #[test]
    fn dtype_element_bytes() {
        assert_eq!(TensorDtype::U8.element_bytes(), 1);
        assert_eq!(TensorDtype::BF16.element_bytes(), 2);
        assert_eq!(TensorDtype::F32.element_bytes(), 4);
        assert_eq!(TensorDtype::I64.element_bytes(), 8);
    }

    #[test]
    fn size_mismatch_rejected() {
        let err = Tensor::new(TensorDtype::F32, vec![2, 2], vec![0; 15]).unwrap_err();
        match err {
            TandemError::TensorSize { expected, actual, .. } => {
                assert_eq!(expected, 16);
                assert_eq!(actual, 15);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn oversized_shape_rejected_without_overflow() {
        let err = Tensor::new(TensorDtype::F32, vec![u32::MAX; 3], vec![0; 4]).unwrap_err();
        match err {
            TandemError::TensorSize { expected, actual, .. } => {
                assert_eq!(expected, usize::MAX);
                assert_eq!(actual, 4);
            }
            other => panic!("unexpected error: {other}"),
        }

        // Element count fits but the byte size does not.
        let huge = vec![u32::MAX, u32::MAX];
        assert!(Tensor::new(TensorDtype::I64, huge, Vec::new()).is_err());
    }

    #[test]
    fn f32_values_survive_encoding() {
        let t = Tensor::from_f32(vec![3], &[1.5, -2.0, 0.25]).unwrap();
        assert_eq!(t.len(), 3);
        assert_eq!(t.to_f32().unwrap(), vec![1.5, -2.0, 0.25]);
    }

    #[test]
    fn to_f32_rejects_other_dtypes() {
        let t = Tensor::new(TensorDtype::U8, vec![4], vec![1, 2, 3, 4]).unwrap();
        assert!(matches!(t.to_f32(), Err(TandemError::DtypeMismatch { .. })));
    }

    #[test]
    fn clones_share_storage() {
        let t = Tensor::vector(&[1.0; 1024]);
        let c = t.clone();
        assert!(std::ptr::eq(t.bytes().as_ptr(), c.bytes().as_ptr()));
    }

    #[test]
    fn scalar_shape_has_one_element() {
        let t = Tensor::from_f32(vec![], &[4.0]).unwrap();
        assert_eq!(t.len(), 1);
    }
}
