#![warn(clippy::all, clippy::pedantic)]

// disable some style lints
#![allow(clippy::needless_return, clippy::must_use_candidate, clippy::comparison_chain)]
#![allow(clippy::redundant_field_names, clippy::redundant_closure_for_method_calls)]
#![allow(clippy::unreadable_literal, clippy::option_if_let_else, clippy::range_plus_one)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc, clippy::module_name_repetitions)]

#![allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap, clippy::cast_lossless, clippy::cast_sign_loss)]
#![allow(clippy::default_trait_access)]

// Tests lints
#![cfg_attr(test, allow(clippy::float_cmp))]

pub mod types;
pub use types::*;

mod errors;
pub use self::errors::Error;

pub mod cell;
pub use self::cell::{CellShape, UnitCell};

pub mod kernels;
pub use self::kernels::Execution;
pub use self::kernels::{distance_array, distance_array_into};
pub use self::kernels::{self_distance_array, self_distance_array_into};
pub use self::kernels::{bond_lengths, bond_lengths_into};
pub use self::kernels::{angles, angles_into, dihedrals, dihedrals_into};
pub use self::kernels::{apply_pbc, to_cartesian, to_fractional};

pub mod search;
pub use self::search::{capped_distance, self_capped_distance};
pub use self::search::{Method, PairList, SearchParameters};
