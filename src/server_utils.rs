pub fn sanitize_name(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "Player".to_string();
    }
    trimmed.chars().take(16).collect()
}

/// Room ids are lowercased and limited to `[a-z0-9_-]{1,32}`.
pub fn normalize_room_id(raw: &str) -> Option<String> {
    let normalized = raw.trim().to_ascii_lowercase();
    let valid = !normalized.is_empty()
        && normalized.len() <= 32
        && normalized
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    valid.then_some(normalized)
}

pub fn parse_stats_limit(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|value| value.parse::<usize>().ok())
}

pub fn virtual_player_name(behavior_label: &str, ordinal: u64) -> String {
    format!("{behavior_label} bot {ordinal}")
}
