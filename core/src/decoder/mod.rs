//! Tool-output decoding: captured text in, structured findings out.

mod finding;
mod registry;

pub use finding::{Finding, Findings};
pub use registry::{DecoderRegistry, OutputDecoder, RAW_OUTPUT_KEY};
