pub mod summary;
pub mod write;

pub use summary::Summary;
pub use write::{published_maps, write_report, ReportPaths, Written, COLUMNS};
