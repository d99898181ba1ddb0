pub mod api;
pub mod pagination;
pub mod session;

pub use api::*;
pub use pagination::*;
pub use session::*;
