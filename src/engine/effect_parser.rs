/// Splits a generated numbered list into effect texts.
///
/// A leading `N. ` marker is stripped; lines without one are taken whole.
/// Blank lines are dropped.
pub fn parse_effects_list(text: &str) -> Vec<String> {
    let mut effects = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let effect = strip_list_number(line).unwrap_or(line).trim();
        if !effect.is_empty() {
            effects.push(effect.to_string());
        }
    }

    effects
}

fn strip_list_number(line: &str) -> Option<&str> {
    let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    let rest = line[digits..].strip_prefix('.')?;
    if rest.starts_with(char::is_whitespace) {
        Some(rest)
    } else {
        None
    }
}
