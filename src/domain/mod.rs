pub mod fixture;
pub mod key;
pub mod outcome;
pub mod position;
pub mod wager;

pub use fixture::*;
pub use key::*;
pub use outcome::*;
pub use position::*;
pub use wager::*;
