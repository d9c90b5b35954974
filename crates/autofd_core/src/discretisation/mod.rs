//! Spatial and temporal discretisation of expanded equations.
//!
//! - **Spatial**: central finite differences of even order on a uniform grid,
//!   optionally scaled by metric coefficient arrays.
//! - **Temporal**: explicit Runge-Kutta schemes expressed as stage updates,
//!   stage residuals and a final combination.
//! - **Metric**: the pluggable source of per-direction metric coefficients.

pub mod metric;
pub mod spatial;
pub mod temporal;

pub use metric::{MetricTransform, StretchedMetric};
pub use spatial::{Central, Residual, SpatialDiscretisation, Stencil, StencilUse};
pub use temporal::{Assignment, RungeKutta, Stage, TemporalDiscretisation};

/// Symbol of the time coordinate in evolution equations.
pub const TIME: &str = "t";

/// Symbol of the time step in generated updates.
pub const TIME_STEP: &str = "deltat";
