pub mod chart;
pub mod classify;
pub mod fetch;
pub mod report;
pub mod scan;
pub mod settings;
pub mod years;

pub use scan::{ScanOutcome, Scanner};
pub use settings::ScanSettings;
