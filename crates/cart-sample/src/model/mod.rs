pub mod cart;
pub mod notification;

pub use cart::*;
pub use notification::*;
