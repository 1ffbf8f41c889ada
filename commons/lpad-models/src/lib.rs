pub mod catalog;
pub mod chart;
pub mod event;
pub mod operation;
pub mod release;

pub use catalog::*;
pub use chart::*;
pub use event::*;
pub use operation::*;
pub use release::*;
