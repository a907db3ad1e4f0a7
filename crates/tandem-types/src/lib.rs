pub mod binding;
pub mod config;
pub mod error;
pub mod module;
pub mod tensor;

pub use binding::{BindingTarget, OutputMap};
pub use error::TandemError;
pub use module::{ModuleIndex, ModuleLoadInfo};
pub use tensor::{Tensor, TensorDtype};
