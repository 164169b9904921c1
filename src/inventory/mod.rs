//! Locating GGUF weights on disk.
//!
//! The scanner walks a model directory (typically a Hugging Face cache or a
//! folder of cloned repositories) and produces one [`ModelRecord`] per
//! weights file, attaching any projector file and prompt format it can infer
//! from the surrounding directory.
//!
//! [`ModelRecord`]: crate::models::ModelRecord

pub mod prompt_format;
pub mod scanner;

pub use prompt_format::guess_prompt_format;
pub use scanner::{scan_models, ScanDefaults};
