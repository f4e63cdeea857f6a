//! Report generation flow shared by the HTTP handlers.

pub mod coordinator;

pub use coordinator::{Acknowledgement, ReportCoordinator, ReportParams};
