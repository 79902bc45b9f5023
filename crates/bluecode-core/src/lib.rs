//! bluecode core: RAM-only client database and hotplug Wi-Fi toggle
//!
//! Two controllers protect a small router against forensic recovery of
//! client-identifying data:
//!
//! - **Lifecycle**: keeps the client database on a tmpfs layer while the
//!   service runs and securely erases every copy on stop
//! - **Toggle**: a physical button enables or disables the local access
//!   point without ever dropping station uplinks
//!
//! # Platform Seams
//!
//! Mounting, the wireless configuration store, status notification and the
//! identifier randomization engine are traits. OpenWrt implementations live
//! in `bluecode-openwrt`; this crate only touches the filesystem directly for
//! copying and erasing files.

pub mod config;
pub mod erase;
pub mod error;
pub mod lifecycle;
pub mod mount;
pub mod platform_durability;
pub mod privilege;
pub mod randomize;
pub mod store;
pub mod toggle;

// Re-export key types for convenience
pub use config::Config;
pub use erase::{EraseOutcome, Eraser};
pub use error::{
    EraseError, LifecycleError, LifecycleResult, RandomizeError, StoreError, StoreResult,
    ToggleError, ToggleResult,
};
pub use lifecycle::{LifecycleController, ServiceLifecycleState};
pub use mount::VolatileMounter;
pub use randomize::{RandomizeRequest, RandomizeTarget, Randomizer};
pub use store::{ConfigStore, InterfaceMode, InterfaceRecord, MemoryConfigStore};
pub use toggle::{ButtonAction, ButtonEvent, Control, HotplugToggle, Notifier, ToggleOutcome};
