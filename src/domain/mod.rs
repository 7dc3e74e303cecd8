pub mod events;
pub mod order;
pub mod position;

pub use events::*;
pub use order::*;
pub use position::*;
