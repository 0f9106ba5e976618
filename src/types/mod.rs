//! Input-side types: what a target line parses into.

mod port;
mod scan_id;
mod target;

pub use port::{Port, PortError};
pub use scan_id::ScanId;
pub use target::{AddressSpec, Mode, Target, TargetError, TargetLine};
