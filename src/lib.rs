//! waterworks: reversible data-transformation pipelines.
//!
//! A waterwork is a DAG of *tanks* (operations) wired together through
//! *slots* (inputs) and *tubes* (outputs). Every tank's `pour` (forward) and
//! `pump` (backward) are exact inverses of each other, so a whole graph can
//! be run forward over raw data and backward over its own output to recover
//! the original input bit-for-bit.
//!
//! ```
//! use waterworks::builder;
//! use waterworks::waterwork::{KeyMode, Waterwork};
//!
//! let mut ww = Waterwork::build("example", |ww| {
//!     builder::add(ww, vec![1.0, 2.0, 3.0], 1.0, None)?;
//!     Ok(())
//! }).unwrap();
//!
//! let taps = ww.pour(Default::default(), KeyMode::Str).unwrap();
//! assert!(!taps.is_empty());
//! ```

mod error;
mod part;
pub mod builder;
pub mod scope;
pub mod tank;
pub mod tanks;
pub mod transforms;
pub mod value;
pub mod waterwork;

pub use error::{WaterworksError, WwResult};
pub use part::{Placeholder, Slot, Tube};
pub use tank::{Tank, TankOps, ValueMap};
pub use value::{ArrayValue, Descriptor, ValDtype, ValType, Value};
pub use waterwork::{FunnelKey, KeyMode, TapKey, Waterwork};
