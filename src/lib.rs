// Vegas Card - Core Library
// Exposes all modules for use in the CLI and tests

pub mod db;
pub mod entities;
pub mod forecast;
pub mod importer;
pub mod normalizer;
pub mod parser;
pub mod resolver;

// Re-export commonly used types
pub use db::{SqliteStore, Store};
pub use entities::{
    CompanyRecord, Consultant, ForecastCompany, MovementRecord, Partner, Product,
};
pub use forecast::{
    aggregate, build_dashboard, CompanyForecast, ConsultantForecast, DashboardSummary,
    GroupForecast, RosterConsultant, Totals, TOP_EMPRESAS,
};
pub use importer::{
    run_closing_import, run_company_import, upsert_in_batches, ImportReport, ImportSession,
    ImportStatus, BATCH_SIZE,
};
pub use normalizer::{
    clean_competence, clean_date, clean_int, clean_number, clean_percent, clean_text, fold,
};
pub use parser::{
    parse_closing_sheet, parse_company_sheet, ClosingPreview, ClosingRow, CompanyRow,
    ParseOutcome, RawRow,
};
pub use resolver::resolve_references;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
