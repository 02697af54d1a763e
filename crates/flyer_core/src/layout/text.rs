//! Text measuring and wrapping for product cells.

/// Average glyph advance of Helvetica, in ems.
const AVERAGE_GLYPH_EM: f32 = 0.5;

pub fn estimate_text_width(text: &str, font_size: f32) -> f32 {
    text.chars().count() as f32 * font_size * AVERAGE_GLYPH_EM
}

/// How many average glyphs fit into `width` at `font_size`.
pub fn chars_per_line(width: f32, font_size: f32) -> usize {
    if font_size <= 0.0 {
        return 0;
    }
    (width / (font_size * AVERAGE_GLYPH_EM)).floor().max(0.0) as usize
}

/// Cuts `text` so it fits `max_chars`, marking the cut with "...".
pub fn truncate_to(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars <= 3 {
        return text.chars().take(max_chars).collect();
    }
    let mut cut: String = text.chars().take(max_chars - 3).collect();
    cut.truncate(cut.trim_end().len());
    cut.push_str("...");
    cut
}

/// Turns a free-form description into bullet lines that fit `max_chars` columns,
/// keeping at most `max_lines` lines. Every input line becomes one bullet; list
/// markers the author typed are replaced by `bullet`. Continuation lines are
/// indented to align under the bullet text.
pub fn wrap_bullets(text: &str, bullet: &str, max_chars: usize, max_lines: usize) -> Vec<String> {
    let indent = " ".repeat(bullet.chars().count());
    let width = max_chars.saturating_sub(indent.len()).max(1);
    let mut lines = Vec::new();

    for item in text.lines() {
        let item = item
            .trim()
            .trim_start_matches(['-', '*', '\u{2022}'])
            .trim();
        if item.is_empty() {
            continue;
        }
        let mut current = String::new();
        let mut first = true;
        for word in item.split_whitespace() {
            let word = truncate_to(word, width);
            let needed = if current.is_empty() {
                word.chars().count()
            } else {
                current.chars().count() + 1 + word.chars().count()
            };
            if needed > width && !current.is_empty() {
                let prefix = if first { bullet } else { indent.as_str() };
                lines.push(format!("{prefix}{current}"));
                first = false;
                current.clear();
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&word);
        }
        if !current.is_empty() {
            let prefix = if first { bullet } else { indent.as_str() };
            lines.push(format!("{prefix}{current}"));
        }
    }

    if lines.len() > max_lines {
        lines.truncate(max_lines);
        if let Some(last) = lines.last_mut() {
            let trimmed = truncate_to(last, max_chars.saturating_sub(3));
            *last = if trimmed.ends_with("...") {
                trimmed
            } else {
                format!("{trimmed}...")
            };
        }
    }
    lines
}
