pub mod analysis;
pub mod batch;
pub mod document;
pub mod loaders;

pub use analysis::{parse_sections, AnalysisResult, ReportSection};
pub use batch::{BatchCounts, BatchRun, DocumentOutcome, OutcomeStatus};
pub use document::{safe_filename, ArtifactPaths, Document, OutputLayout};
pub use loaders::{list_documents_sync, load_all_documents, load_first_document};
