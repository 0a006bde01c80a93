//! Fuel-type token splitting and spelling normalization.

use super::record::FuelType;

/// Maximum number of fuel types kept per facility.
pub const MAX_FUEL_TYPES: usize = 4;

/// Placeholder spellings that carry no fuel information.
const PLACEHOLDERS: &[&str] = &["n/a", "na", "none", "null", "-"];

/// Splits a raw fuel-type column into tokens.
///
/// The source joins entries with `_`, sometimes followed by a space, and a few
/// rows use ` & ` instead. Tokens are returned trimmed but otherwise untouched;
/// empty tokens are kept so the cleaner can count them.
pub fn split_fuel_tokens(raw: &str) -> Vec<String> {
    raw.replace("_ ", "_")
        .replace(" & ", "_")
        .split('_')
        .map(|token| token.trim().to_string())
        .collect()
}

/// Normalizes one token into a fuel label, or `None` if it is unusable.
///
/// Words are capitalized, slashes are kept tight (`solar/wind` becomes
/// `Solar/Wind`) and a trailing `Pv` qualifier is dropped so that `solar pv`
/// and `Solar` agree.
///
/// # Examples
///
/// ```
/// use es_explorer::data::fuel::normalize_fuel_token;
///
/// assert_eq!(normalize_fuel_token("solar PV").map(|f| f.to_string()), Some("Solar".into()));
/// assert!(normalize_fuel_token("  ").is_none());
/// ```
pub fn normalize_fuel_token(token: &str) -> Option<FuelType> {
    let spaced = token.replace('/', " / ");
    let words: Vec<String> = spaced
        .split_whitespace()
        .enumerate()
        .filter(|(i, word)| *i == 0 || !word.eq_ignore_ascii_case("pv"))
        .map(|(_, word)| capitalize(word))
        .collect();
    let label = words.join(" ").replace(" / ", "/");

    if label.is_empty() || !label.chars().any(char::is_alphabetic) {
        return None;
    }
    if PLACEHOLDERS.iter().any(|p| label.eq_ignore_ascii_case(p)) {
        return None;
    }
    Some(FuelType::new(label))
}

/// Normalizes a token list: unusable tokens are dropped, duplicates collapse,
/// and at most [`MAX_FUEL_TYPES`] labels are kept.
///
/// Returns the labels and the number of tokens that were discarded.
pub fn normalize_fuel_tokens(tokens: &[String]) -> (Vec<FuelType>, usize) {
    let mut fuels: Vec<FuelType> = Vec::with_capacity(tokens.len().min(MAX_FUEL_TYPES));
    let mut discarded = 0;
    for token in tokens {
        match normalize_fuel_token(token) {
            Some(fuel) if fuels.contains(&fuel) => {}
            Some(fuel) if fuels.len() < MAX_FUEL_TYPES => fuels.push(fuel),
            _ => discarded += 1,
        }
    }
    (fuels, discarded)
}

/// Capitalizes each whitespace-separated word: `LOS ANGELES` becomes
/// `Los Angeles`.
pub fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
