//! Archive locations for entities that reach the `archived` level

use once_cell::sync::Lazy;
use regex::Regex;

static DATE_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}").unwrap());

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Daily/periodic notes: any path mentioning `Daily`, or a file name that
/// starts with a `YYYY-MM-DD` date
pub fn is_periodic_note(path: &str) -> bool {
    path.contains("Daily") || DATE_PREFIX.is_match(file_name(path))
}

/// Where an archived entity should live, or `None` when it already sits
/// inside `archive_dir`
pub fn archive_path(vault_path: &str, archive_dir: &str) -> Option<String> {
    let archive_dir = archive_dir.trim_matches('/');
    if vault_path == archive_dir || vault_path.starts_with(&format!("{archive_dir}/")) {
        return None;
    }

    let file = file_name(vault_path);
    Some(if is_periodic_note(vault_path) {
        format!("{archive_dir}/Daily/{file}")
    } else {
        format!("{archive_dir}/{file}")
    })
}
