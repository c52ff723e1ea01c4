mod mode;
mod name;

pub use mode::LockMode;
pub use name::{ResourceKind, ResourceName};
