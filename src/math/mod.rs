pub mod tensor;

pub use tensor::{argmax, Tensor};
