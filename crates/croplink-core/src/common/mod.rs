pub mod dataset;
pub mod error;
pub mod stamp;
pub mod types;

pub use error::{Error, ErrorBody, ErrorCode, Result};
