//! What a scan asks for and the store settings it runs under.

mod info;
mod scan;
mod time_range;

pub use info::ScanInfo;
pub use scan::{Scan, ScanType};
pub use time_range::TimeRange;
