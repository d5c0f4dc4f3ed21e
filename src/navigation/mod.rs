//! Reactive mapping and navigation.
//!
//! - [`grid::OccupancyGrid`]: fixed-size binary occupancy map
//! - [`reactive::ReactiveNavigator`]: one decision step per scan batch

pub mod grid;
pub mod reactive;

pub use grid::OccupancyGrid;
pub use reactive::{ReactiveNavigator, StepOutcome};
