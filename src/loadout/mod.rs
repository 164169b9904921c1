//! Loadouts: curated model lists tiered by the VRAM they need.

pub mod definition;
pub mod selector;
pub mod size;

pub use definition::{available_loadouts, builtin_loadouts, load_loadouts, parse_loadout, Loadout};
pub use selector::select_loadout;
pub use size::megabyte_int_from_size_string;
