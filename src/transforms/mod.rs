//! Higher-level façades (§4.5) built on top of the tank catalog and the
//! fluent builder: a `Transform` fits global statistics over a dataset once,
//! then exposes `pour`/`pump` without the caller ever touching a
//! [`crate::waterwork::Waterwork`] directly.

pub mod datetime_transform;

use crate::error::WwResult;
use crate::waterwork::Waterwork;

/// The shape every façade in this module follows. Associated types let each
/// transform pick its own fit/pour/pump payloads while keeping the same
/// four-method lifecycle: fit statistics once, build the graph once, then
/// `pour`/`pump` repeatedly against it.
pub trait Transform {
    type FitInput;
    type PourInput;
    type PourOutput;
    type PumpOutput;

    /// Computes whatever global statistics this transform's graph is
    /// parameterised by (means, category maps, ...). Must run before
    /// `get_waterwork`/`pour`/`pump`.
    fn calc_global_values(&mut self, fit_data: Self::FitInput) -> WwResult<()>;

    /// Builds the underlying waterwork from the fitted statistics.
    fn get_waterwork(&self) -> WwResult<Waterwork>;

    fn pour(&mut self, data: Self::PourInput) -> WwResult<Self::PourOutput>;

    fn pump(&mut self, data: Self::PumpOutput) -> WwResult<Self::PourInput>;
}

pub use datetime_transform::{DatetimeNormalizer, DatetimeNormalizerConfig, DatetimeNormalizerOutput, NormMode};
