pub mod api_client;
pub mod progress_monitor;
pub mod prompt_renderer;
pub mod result_writer;

pub use api_client::{ApiClient, ModelClient};
pub use progress_monitor::{ProgressMonitor, ProgressSnapshot};
pub use prompt_renderer::PromptTemplates;
pub use result_writer::{ReportSettings, ResultWriter};
