pub mod browser_manager;
pub mod extractor;
pub mod harvest;
pub mod scroll;
pub mod session;
pub mod surface;

pub use harvest::{DedupPolicy, HarvestOutcome, HarvestState, Harvester};
pub use session::{HarvestFailure, SessionManager};
pub use surface::{BrowsingSession, BrowsingSurface, SessionLauncher, SurfaceError};
