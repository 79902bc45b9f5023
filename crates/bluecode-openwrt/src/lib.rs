//! OpenWrt adapters for bluecode
//!
//! Implements the platform seams of `bluecode-core` for GL-iNet style
//! OpenWrt routers:
//!
//! - [`TmpfsMounter`]: mount(2)/umount2(2) with layer detection from `/proc/self/mountinfo`
//! - [`UciStore`]: `wireless.@wifi-iface[i]` records via the `uci` and `wifi` tools
//! - [`StatusNotifier`]: JSON-lines status channel mirrored to syslog
//! - [`CommandRandomizer`]: runs the identifier randomization engine
//!
//! The `bluecode` binary wires them together for the init script and the
//! button hotplug handler.

pub mod cli;
pub mod engine;
pub mod mount;
pub mod notify;
pub mod runner;
pub mod uci;

pub use cli::{init_tracing, run, Cli, CliError};
pub use engine::CommandRandomizer;
pub use mount::TmpfsMounter;
pub use notify::{StatusMessage, StatusNotifier};
pub use runner::{CommandOutput, CommandRunner, SystemRunner};
pub use uci::UciStore;
