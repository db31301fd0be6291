//! Sound bank: prompt → descriptor → patch → registry.
//!
//! - [`descriptor`] - Loose descriptors, keyword fallback, patch conversion
//! - [`remote`] - Remote descriptor service client
//! - [`registry`] - Registered patches and their persistence
//! - [`store`] - Durable key-value stores
//! - [`requests`] - Background generation worker

pub mod descriptor;
pub mod registry;
pub mod remote;
pub mod requests;
pub mod store;

pub use descriptor::{SoundDescriptor, SoundDescriptorGenerator, DEFAULT_PATCH_NAME};
pub use registry::{PatchRegistry, DEFAULT_STORE_KEY};
pub use remote::{service_from_config, DescriptorRequest, DescriptorService, OfflineDescriptorService};
#[cfg(feature = "remote")]
pub use remote::HttpDescriptorService;
pub use requests::{PatchRequest, PatchRequester, PatchResult};
pub use store::{BackgroundStore, FileStore, KeyValueStore, MemoryStore};

/// Genres offered for patch generation.
pub const GENRES: [&str; 8] = [
    "Afrobeat",
    "Makossa",
    "Bikutsi",
    "Highlife",
    "Amapiano",
    "Trap",
    "Lo-Fi",
    "Cinematic",
];

/// Look up a genre by name, case-insensitively.
pub fn find_genre(name: &str) -> Option<&'static str> {
    GENRES
        .iter()
        .copied()
        .find(|g| g.eq_ignore_ascii_case(name.trim()))
}
