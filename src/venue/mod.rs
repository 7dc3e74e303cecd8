pub mod factory;
pub mod paper;
pub mod traits;

pub use factory::{build_venue, VenueKind};
pub use paper::PaperVenue;
pub use traits::{SubmitKind, SubmitRequest, VenueAck, VenueAdapter};

#[cfg(test)]
pub use traits::MockVenueAdapter;
