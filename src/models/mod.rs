pub mod batch;
pub mod request;

pub use batch::*;
pub use request::*;
