pub mod http_transport;
pub mod pdf_extractor;

pub use http_transport::{ChatTransport, HttpTransport};
pub use pdf_extractor::{extract_blocking, LopdfExtractor, TextExtractor};
