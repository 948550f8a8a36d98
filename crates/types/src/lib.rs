pub mod asset;
pub mod error;
pub mod event;
pub mod fixed;
pub mod intent;
pub mod pool;
pub mod result;
pub mod wallet;

pub use asset::*;
pub use error::*;
pub use event::*;
pub use intent::*;
pub use pool::*;
pub use result::*;
pub use wallet::*;

/// Seconds in a 365 day year, used for apr math
pub const SECONDS_PER_YEAR: u64 = 31_536_000;
