pub mod catalogs;
pub mod types;

pub use catalogs::*;
pub use types::*;
