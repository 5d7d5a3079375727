pub mod settlement;
pub mod system;

pub use settlement::*;
pub use system::*;
