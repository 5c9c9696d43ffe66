pub mod errors;

pub use errors::{PaxosError, Result};
