pub mod media;
pub mod poster;
pub mod rating_key;

pub use media::{Episode, LibrarySection, Season, Show};
pub use poster::{ItemKind, PosterCandidate, PosterItem};
pub use rating_key::RatingKey;
