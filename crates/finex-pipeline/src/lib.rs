pub mod logger;
pub mod pipeline;

pub use logger::{JsonlFileSink, LogSink, MemorySink, ResultLogger};
pub use pipeline::DocumentPipeline;
