//! Effective-user check shared by both controllers.

/// True when the process runs with an effective uid of 0.
pub fn is_root() -> bool {
    #[cfg(unix)]
    {
        // SAFETY: geteuid has no preconditions and cannot fail.
        unsafe { libc::geteuid() == 0 }
    }

    #[cfg(not(unix))]
    {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_matches_libc() {
        let euid = unsafe { libc::geteuid() };
        assert_eq!(is_root(), euid == 0);
    }
}
