// Generated-chart version marker.
//
// Generated charts carry `[SS v<major>.<minor>.<patch>]` at the front of
// their description and author. The marker tells later runs which charts
// they produced (and may therefore overwrite) and which build produced them.
// Older builds wrote a two-part `[SS v<major>.<minor>]` marker, which is
// read as patch 0. Only a marker at the very start of the text counts, in
// any letter case; a description that merely mentions one is hand-made.

use crate::config::OverwriteBehavior;
use crate::song::Chart;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

/// Version written into generated charts. Kept in step with the package
/// version.
pub const CURRENT: Version = Version {
    major: 0,
    minor: 1,
    patch: 0,
};

const MARKER_OPEN: &str = "[SS v";

static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\[SS v([0-9]+)\.([0-9]+)(?:\.([0-9]+))?\]")
        .expect("marker pattern is valid")
});

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl Version {
    /// Parse `x.y.z` or the older `x.y`.
    pub fn parse(s: &str) -> Option<Version> {
        let mut parts = s.split('.').map(|p| p.parse::<u32>().ok());
        let major = parts.next()??;
        let minor = parts.next()??;
        let patch = match parts.next() {
            Some(p) => p?,
            None => 0,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Version {
            major,
            minor,
            patch,
        })
    }
}

/// Length of the leading marker in `text`, with its version.
fn find_marker(text: &str) -> Option<(usize, Version)> {
    let caps = MARKER.captures(text)?;
    let number = |i: usize| caps.get(i).map(|m| m.as_str().parse::<u32>());
    let version = Version {
        major: number(1)?.ok()?,
        minor: number(2)?.ok()?,
        patch: number(3).transpose().ok()?.unwrap_or(0),
    };
    Some((caps.get(0)?.end(), version))
}

/// Version of the marker leading `text`, if any.
pub fn marker_version(text: &str) -> Option<Version> {
    find_marker(text).map(|(_, v)| v)
}

/// `text` with its leading marker, if any, replaced by the current one.
pub fn mark(text: &str) -> String {
    let rest = match find_marker(text) {
        Some((end, _)) => &text[end..],
        None => text,
    };
    let rest = rest.trim();
    if rest.is_empty() {
        format!("{MARKER_OPEN}{CURRENT}]")
    } else {
        format!("{MARKER_OPEN}{CURRENT}] {rest}")
    }
}

/// Newest marker version on a chart's description or author.
pub fn chart_version(chart: &Chart) -> Option<Version> {
    marker_version(&chart.description).max(marker_version(&chart.author))
}

/// Whether `existing` may be replaced by a newly generated chart.
pub fn should_overwrite(behavior: OverwriteBehavior, existing: &Chart) -> bool {
    match behavior {
        OverwriteBehavior::DoNotOverwrite => false,
        OverwriteBehavior::Always => true,
        OverwriteBehavior::IfGenerated => chart_version(existing).is_some(),
        OverwriteBehavior::IfGeneratedAndNewerVersion => {
            chart_version(existing).is_some_and(|v| v < CURRENT)
        }
    }
}
