use chrono::{DateTime, NaiveDateTime, Utc};

pub const BACKUP_NAME_PREFIX: &str = "backup_";
pub const BACKUP_TIME_FORMAT: &str = "%Y%m%dT%H%M%SZ";
/// `BACKUP_NAME_PREFIX` followed by a `BACKUP_TIME_FORMAT` timestamp.
pub const BACKUP_NAME_LENGTH: usize = 23;

pub fn format_backup_name(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{}{}", prefix, at.format(BACKUP_TIME_FORMAT))
}

/// True for names produced by [`format_backup_name`] with the default prefix.
pub fn is_backup_name(name: &str) -> bool {
    name.len() == BACKUP_NAME_LENGTH
        && name
            .strip_prefix(BACKUP_NAME_PREFIX)
            .is_some_and(|stamp| NaiveDateTime::parse_from_str(stamp, BACKUP_TIME_FORMAT).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn names_carry_prefix_and_timestamp() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let name = format_backup_name(BACKUP_NAME_PREFIX, at);
        assert_eq!(name, "backup_20240309T070501Z");
        assert_eq!(name.len(), BACKUP_NAME_LENGTH);
        assert!(is_backup_name(&name));
    }

    #[test]
    fn foreign_names_are_rejected() {
        assert!(!is_backup_name("backup_latest"));
        assert!(!is_backup_name("base_000000010000000000000002"));
        assert!(!is_backup_name("backup_20241399T999999Z"));
    }
}
