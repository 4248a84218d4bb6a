//! Wire types and report line protocol shared by every bq session.

pub mod envelope;
pub mod report;

pub use envelope::{QUERY_PATH, QueryKind, QueryRequest, QueryResponse, TOKEN_HEADER};
pub use report::{IdentityRecord, Report, ReportGroup, ReportParser, ReportRecord};
