//! Request handlers.

pub mod health;
pub mod identity;
pub mod video;
pub mod watch;

pub use health::*;
pub use identity::*;
pub use video::*;
pub use watch::*;
