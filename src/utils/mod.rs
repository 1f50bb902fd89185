pub mod collection_ext;
pub mod error;
pub mod string_ext;

pub use collection_ext::{coefficient_of_variation, unique_ordered};
pub use error::{
    ExecutionError, PipelineError, PipelineStage, SynthesisError, TimeRangeError,
    UnsafeQueryError, ValidationError,
};
pub use string_ext::{StringExt, sql_quote, strip_code_fences};
