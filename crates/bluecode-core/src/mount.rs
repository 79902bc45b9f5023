//! Volatile filesystem seam.
//!
//! The lifecycle controller never calls mount(2) directly. Production uses
//! the tmpfs mounter from `bluecode-openwrt`; tests substitute a simulated
//! layered mounter.

use std::io;
use std::path::Path;

/// Binds and detaches memory-backed filesystem layers.
pub trait VolatileMounter {
    /// Mount a fresh, empty volatile layer on `target`.
    fn mount_volatile(&self, target: &Path) -> io::Result<()>;

    /// Lazily detach the topmost volatile layer bound at `target`.
    ///
    /// Returns `Ok(false)` when no volatile layer is bound there. Layers of
    /// other filesystem types are never touched.
    fn detach(&self, target: &Path) -> io::Result<bool>;

    /// Whether `target` is currently backed by a volatile layer.
    fn is_volatile(&self, target: &Path) -> io::Result<bool>;
}

impl<M: VolatileMounter + ?Sized> VolatileMounter for &M {
    fn mount_volatile(&self, target: &Path) -> io::Result<()> {
        (**self).mount_volatile(target)
    }

    fn detach(&self, target: &Path) -> io::Result<bool> {
        (**self).detach(target)
    }

    fn is_volatile(&self, target: &Path) -> io::Result<bool> {
        (**self).is_volatile(target)
    }
}
