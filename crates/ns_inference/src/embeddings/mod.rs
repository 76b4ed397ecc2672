pub mod hashing;
pub mod onnx;

pub use hashing::{Encoding, HashingEncoder};
pub use onnx::FastEmbedEncoder;
