// Table ingestion and report output

pub mod error;
pub mod ingest;
pub mod package;
pub mod report;

pub use error::{IngestError, ReportError};
pub use ingest::{load_table, template_profile, FileProvider, TableProvider, TemplateProfile};
pub use package::{create_zip, write_audit_log};
pub use report::{write_json, write_workbook};
