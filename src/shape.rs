//! Text wrapping against a pixel budget. Measurement is injected so the
//! algorithm stays independent of any particular shaping backend.

use std::collections::HashMap;

use crate::error::CardpressResult;

/// Fraction of the budget actually used for fitting. The editor's canvas
/// renders with slightly different metrics than the server shaper, so lines
/// that measure exactly at the budget there can spill here.
const FIT_MARGIN: f64 = 0.95;

/// Greedy word wrap of `text` into lines no wider than `budget_px`.
///
/// Explicit newlines are hard breaks and blank paragraphs survive as empty
/// lines. A single word wider than the budget is broken per character rather
/// than overflowing. Empty input produces no lines at all.
///
/// Measurements are cached per call; repeated words (common in form text)
/// are only shaped once.
pub fn wrap_text(
    text: &str,
    budget_px: f64,
    measure: &mut dyn FnMut(&str) -> CardpressResult<f64>,
) -> CardpressResult<Vec<String>> {
    if text.is_empty() {
        return Ok(Vec::new());
    }
    if !budget_px.is_finite() || budget_px <= 0.0 {
        return Ok(vec![text.to_string()]);
    }

    let limit = budget_px * FIT_MARGIN;
    let mut cache: HashMap<String, f64> = HashMap::new();
    let mut measure_cached = |s: &str| -> CardpressResult<f64> {
        if let Some(&w) = cache.get(s) {
            return Ok(w);
        }
        let w = measure(s)?;
        cache.insert(s.to_string(), w);
        Ok(w)
    };

    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        if paragraph.trim().is_empty() {
            lines.push(String::new());
            continue;
        }
        wrap_paragraph(paragraph, limit, &mut measure_cached, &mut lines)?;
    }
    Ok(lines)
}

fn wrap_paragraph(
    paragraph: &str,
    limit: f64,
    measure: &mut impl FnMut(&str) -> CardpressResult<f64>,
    lines: &mut Vec<String>,
) -> CardpressResult<()> {
    let mut current = String::new();

    for word in paragraph.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };

        if measure(&candidate)? <= limit {
            current = candidate;
            continue;
        }

        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }

        if measure(word)? <= limit {
            current = word.to_string();
        } else {
            current = break_long_word(word, limit, measure, lines)?;
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    Ok(())
}

/// Per-character breaking for a word wider than the whole budget. Returns the
/// trailing fragment, which may still accept following words.
fn break_long_word(
    word: &str,
    limit: f64,
    measure: &mut impl FnMut(&str) -> CardpressResult<f64>,
    lines: &mut Vec<String>,
) -> CardpressResult<String> {
    let mut fragment = String::new();
    for ch in word.chars() {
        let mut candidate = fragment.clone();
        candidate.push(ch);
        if !fragment.is_empty() && measure(&candidate)? > limit {
            lines.push(std::mem::take(&mut fragment));
            fragment.push(ch);
        } else {
            fragment = candidate;
        }
    }
    Ok(fragment)
}
