pub mod entities;
pub mod readings;
pub mod window;

pub use entities::*;
pub use readings::*;
pub use window::*;
