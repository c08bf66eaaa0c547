//! Static inputs for a war processing run: the roster of known teammates,
//! the alias book for multi-account families, and the tunable processing
//! presets. All of it is loaded once up front and is immutable during a run.

mod alias;
mod presets;
mod roster;

pub use alias::AliasBook;
pub use presets::{BackgroundThreshold, Presets, SamplerPreset};
pub use roster::Roster;
