// Shared error type for the data model.

#[derive(Debug, thiserror::Error)]
pub enum TandemError {
    #[error("tensor shape {shape:?} of {dtype} needs {expected} bytes, got {actual}")]
    TensorSize {
        shape: Vec<u32>,
        dtype: crate::tensor::TensorDtype,
        expected: usize,
        actual: usize,
    },

    #[error("tensor dtype mismatch: expected {expected}, got {actual}")]
    DtypeMismatch {
        expected: crate::tensor::TensorDtype,
        actual: crate::tensor::TensorDtype,
    },

    #[error("binding error: {0}")]
    Binding(String),
}
