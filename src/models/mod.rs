mod gateway;
mod settlement;
mod tenant;
mod transaction;

pub use gateway::*;
pub use settlement::*;
pub use tenant::*;
pub use transaction::*;
