//! Browser target parsing for vendor prefixing

use lightningcss::targets::{Browsers, Targets};

use crate::error::{BuildError, BuildResult};

/// Resolve browserslist queries (`"defaults"`, `"> 0.5%"`, `"safari 9"`, ...)
/// into the oldest version of each browser they select
pub fn parse_targets(targets: &[String]) -> BuildResult<Option<Browsers>> {
    if targets.is_empty() {
        return Ok(None);
    }

    Browsers::from_browserslist(targets).map_err(|e| {
        BuildError::config(format!(
            "invalid browser targets '{}': {}",
            targets.join(", "),
            e
        ))
    })
}

/// Wrap parsed browsers into lightningcss targets
pub fn to_targets(browsers: Option<Browsers>) -> Targets {
    match browsers {
        Some(browsers) => Targets::from(browsers),
        None => Targets::default(),
    }
}
