use data_vault::VersionRecord;
use data_vault::util::format_size;
use std::fmt;

const RULE_WIDTH: usize = 60;

/// Version history of a file, with the current version marked
pub struct History<'a> {
    pub name: &'a str,
    pub versions: &'a [VersionRecord],
    pub current: i64,
}

impl fmt::Display for History<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "File: {}", self.name)?;
        writeln!(f, "{}\n", "=".repeat(RULE_WIDTH))?;

        for (idx, version) in self.versions.iter().enumerate() {
            let is_current = i64::try_from(idx).is_ok_and(|i| i == self.current);
            let marker = if is_current { " >>> CURRENT" } else { "" };
            let local_time = version.timestamp.with_timezone(&chrono::Local);

            writeln!(f, "Version {}{marker}", version.version)?;
            writeln!(f, "  Time: {}", local_time.format("%Y-%m-%d %H:%M:%S"))?;
            writeln!(f, "  Size: {}", format_size(version.size))?;
            writeln!(f, "  Hash: {}", version.hash)?;
            writeln!(f)?;
        }
        Ok(())
    }
}
