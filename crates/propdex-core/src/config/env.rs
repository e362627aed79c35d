#[must_use]
pub(super) fn read_non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[must_use]
pub(super) fn read_env_usize(name: &str, default_value: usize, min_value: usize) -> usize {
    parse_usize_at_least(read_non_empty_env(name).as_deref(), default_value, min_value)
}

#[must_use]
pub(super) fn read_env_u64(name: &str, default_value: u64, min_value: u64) -> u64 {
    read_non_empty_env(name)
        .and_then(|raw| raw.parse::<u64>().ok())
        .filter(|value| *value >= min_value)
        .unwrap_or(default_value)
}

#[must_use]
pub(super) fn read_env_i32(name: &str, default_value: i32) -> i32 {
    read_non_empty_env(name)
        .and_then(|raw| raw.parse::<i32>().ok())
        .unwrap_or(default_value)
}

#[must_use]
pub(super) fn parse_usize_at_least(raw: Option<&str>, default_value: usize, min_value: usize) -> usize {
    raw.and_then(|raw| raw.trim().parse::<usize>().ok())
        .filter(|value| *value >= min_value)
        .unwrap_or(default_value)
}
