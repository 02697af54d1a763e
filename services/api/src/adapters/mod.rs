pub mod blob;
pub mod db;
pub mod notify;
pub mod pdf;

pub use blob::FsBlobStore;
pub use db::DbAdapter;
pub use notify::LogNotifier;
pub use pdf::PrintPdfRenderer;
