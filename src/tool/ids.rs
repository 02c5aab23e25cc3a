/// Short uppercase prefix for a project's task IDs.
///
/// `amplifier-core` -> `AC`, `my-big-project` -> `MBP`, `projector` -> `PRO`.
pub fn project_prefix(slug: &str) -> String {
    let parts: Vec<&str> = slug.split('-').collect();
    if parts.len() >= 2 {
        parts
            .iter()
            .filter_map(|p| p.chars().next())
            .collect::<String>()
            .to_uppercase()
    } else {
        slug.chars().take(3).collect::<String>().to_uppercase()
    }
}

/// Sequence number of `id` if it has the form `<prefix>-<digits>`.
fn sequence_number(id: &str, prefix: &str) -> Option<u64> {
    let digits = id.strip_prefix(prefix)?.strip_prefix('-')?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Next ID after the highest existing one for `prefix`. Gaps left by removed
/// tasks are never refilled.
pub fn next_task_id<'a>(ids: impl IntoIterator<Item = &'a str>, prefix: &str) -> String {
    let max = ids
        .into_iter()
        .filter_map(|id| sequence_number(id, prefix))
        .max()
        .unwrap_or(0);
    format!("{prefix}-{:03}", max + 1)
}
