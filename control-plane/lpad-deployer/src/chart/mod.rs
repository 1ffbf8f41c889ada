//! Chart tooling: repository indexes, locating charts on disk, reading them
//! and merging install values.

pub mod index;
pub mod loader;
pub mod locate;
pub mod values;

pub use index::{HttpIndexFetcher, IndexFetcher, RepoIndex};
pub use loader::{LoadedChart, load_chart, read_chart};
pub use locate::{ChartLocator, LocatedChart};
pub use values::merge_values;
