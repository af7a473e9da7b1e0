pub mod errors;
pub mod machine;
pub mod primitives;

pub use errors::{RuntimeError, WordResult};
pub use machine::{Machine, PrimitiveImpl};
pub use primitives::install_prelude;
