pub mod error;
pub mod event;
pub mod types;
pub mod value;

pub use error::{ErrorKind, ScenarioError};
pub use event::*;
pub use types::*;
pub use value::*;
