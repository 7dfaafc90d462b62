pub mod coverage;
pub mod export_service;
pub mod llm_service;
pub mod prompt_builder;
pub mod response_parser;
pub mod unresolved_writer;

pub use coverage::CoverageAggregator;
pub use export_service::ExportApplier;
pub use llm_service::{LlmService, Oracle, OracleReply};
pub use unresolved_writer::UnresolvedWriter;
