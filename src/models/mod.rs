pub mod record;

pub use record::{basename, ModelRecord, Origin, DEFAULT_MODEL_TYPE};
