//! Request model for the external identifier randomization engine.
//!
//! The engine itself (MAC/BSSID/IMEI generation, log sanitization) lives
//! outside this crate. The lifecycle only builds a request and hands it to a
//! [`Randomizer`] implementation, which in production spawns the engine's
//! command line.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::RandomizeError;

/// What the engine should randomize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RandomizeTarget {
    Mac,
    Bssid,
    Imei,
    Logs,
    All,
}

impl RandomizeTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            RandomizeTarget::Mac => "mac",
            RandomizeTarget::Bssid => "bssid",
            RandomizeTarget::Imei => "imei",
            RandomizeTarget::Logs => "logs",
            RandomizeTarget::All => "all",
        }
    }

    /// IMEI changes only take effect after a full device reboot.
    /// `All` implies IMEI.
    pub fn requires_reboot(&self) -> bool {
        matches!(self, RandomizeTarget::Imei | RandomizeTarget::All)
    }
}

impl fmt::Display for RandomizeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RandomizeTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mac" => Ok(RandomizeTarget::Mac),
            "bssid" => Ok(RandomizeTarget::Bssid),
            "imei" => Ok(RandomizeTarget::Imei),
            "logs" => Ok(RandomizeTarget::Logs),
            "all" => Ok(RandomizeTarget::All),
            other => Err(format!("unknown randomize target '{}'", other)),
        }
    }
}

/// Targets randomized automatically after `start()`.
pub const BOOT_TARGETS: [RandomizeTarget; 3] =
    [RandomizeTarget::Mac, RandomizeTarget::Bssid, RandomizeTarget::Logs];

/// Parse a comma or whitespace separated target list.
pub fn parse_targets(list: &str) -> Result<BTreeSet<RandomizeTarget>, String> {
    list.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(RandomizeTarget::from_str)
        .collect()
}

/// One invocation of the randomization engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomizeRequest {
    pub targets: BTreeSet<RandomizeTarget>,
    pub dry_run: bool,
    pub no_restart: bool,
    /// Interface groups to touch; empty means the engine's default
    pub interfaces: Vec<String>,
}

impl RandomizeRequest {
    /// The request issued once volatile mounting has completed at boot.
    pub fn boot(targets: &BTreeSet<RandomizeTarget>) -> Self {
        Self {
            targets: targets.clone(),
            dry_run: false,
            no_restart: true,
            interfaces: Vec::new(),
        }
    }

    pub fn requires_reboot(&self) -> bool {
        self.targets.iter().any(RandomizeTarget::requires_reboot)
    }

    /// Command-line arguments understood by the engine.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec!["--randomize".to_string()];
        args.extend(self.targets.iter().map(|t| t.as_str().to_string()));
        if self.dry_run {
            args.push("--dry-run".into());
        }
        if self.no_restart {
            args.push("--no-restart".into());
        }
        if !self.interfaces.is_empty() {
            args.push("--interfaces".into());
            args.extend(self.interfaces.iter().cloned());
        }
        args
    }

    /// Human-readable target list, e.g. `mac,bssid,logs`.
    pub fn target_list(&self) -> String {
        self.targets.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(",")
    }
}

/// Seam to the external randomization engine.
pub trait Randomizer {
    fn randomize(&self, request: &RandomizeRequest) -> Result<(), RandomizeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boot_request_args() {
        let targets: BTreeSet<_> = BOOT_TARGETS.into_iter().collect();
        let req = RandomizeRequest::boot(&targets);
        assert_eq!(
            req.to_args(),
            vec!["--randomize", "mac", "bssid", "logs", "--no-restart"]
        );
        assert!(!req.requires_reboot());
        assert_eq!(req.target_list(), "mac,bssid,logs");
    }

    #[test]
    fn test_interfaces_and_dry_run() {
        let mut req = RandomizeRequest::boot(&[RandomizeTarget::Mac].into_iter().collect());
        req.dry_run = true;
        req.interfaces = vec!["wan".into(), "upstream".into()];
        assert_eq!(
            req.to_args(),
            vec!["--randomize", "mac", "--dry-run", "--no-restart", "--interfaces", "wan", "upstream"]
        );
    }

    #[test]
    fn test_reboot_targets() {
        assert!(RandomizeTarget::Imei.requires_reboot());
        assert!(RandomizeTarget::All.requires_reboot());
        assert!(!RandomizeTarget::Logs.requires_reboot());
    }

    #[test]
    fn test_parse_targets() {
        let set = parse_targets("mac, bssid logs").unwrap();
        assert_eq!(set.len(), 3);
        assert!(set.contains(&RandomizeTarget::Bssid));

        assert!(parse_targets("mac,toaster").is_err());
        assert!(parse_targets("").unwrap().is_empty());
    }
}
