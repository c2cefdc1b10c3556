pub mod config;
pub mod datasource;
pub mod external;
pub mod haiku;
pub mod image;
pub mod logging;
pub mod output;
pub mod processor;

pub use config::Config;
pub use datasource::{DataSource, LoadOutcome, SourceKind, SourceLoader};
pub use external::{ChatClient, ExternalError, ImageClient, ImageHost, OpenAiClient};
pub use output::{write_output, OutputError, OutputFormat};
pub use processor::{MapReduceSummarizer, PipelineError, RunReport};
