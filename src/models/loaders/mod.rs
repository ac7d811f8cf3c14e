pub mod document_loader;

pub use document_loader::{list_documents_sync, load_all_documents, load_first_document};
