pub mod error;
pub mod maintenance;
pub mod primary;
pub mod resolution;

pub use error::DedupError;
pub use maintenance::{sweep, DuplicateGroup, SweepPhase};
pub use primary::select_primary;
pub use resolution::{resolve_deferred, EpisodeResolver, ExtractedCandidate, Resolution};
