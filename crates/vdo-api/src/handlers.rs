//! Request handlers.

pub mod health;
pub mod notifications;
pub mod presign;
pub mod ready;

pub use health::*;
pub use notifications::*;
pub use presign::*;
pub use ready::*;
