use std::fmt;

/// Build details captured by `build.rs`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildInfo {
    pub version: &'static str,
    pub repo_version: &'static str,
    pub build_profile: &'static str,
    pub build_timestamp: &'static str,
    pub rust_version: &'static str,
    pub target: &'static str,
}

pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: env!("CARGO_PKG_VERSION"),
        repo_version: env!("REPO_VERSION"),
        build_profile: env!("BUILD_PROFILE"),
        build_timestamp: env!("BUILD_TIMESTAMP"),
        rust_version: env!("RUST_VERSION"),
        target: env!("BUILD_TARGET"),
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "thorne {} ({})", self.version, self.repo_version)?;
        writeln!(f, "profile: {}", self.build_profile)?;
        writeln!(f, "built: {}", self.build_timestamp)?;
        writeln!(f, "target: {}", self.target)?;
        write!(f, "{}", self.rust_version)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_display_leads_with_version() {
        let info = build_info();
        assert!(info
            .to_string()
            .starts_with(&format!("thorne {}", env!("CARGO_PKG_VERSION"))));
    }
}
