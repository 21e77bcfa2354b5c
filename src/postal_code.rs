/// Strip every non-digit character
pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Normalize a postal code (CEP) to its 8 raw digits.
///
/// Returns `None` unless exactly 8 digits remain after stripping punctuation.
pub fn normalize(raw: &str) -> Option<String> {
    let digits = digits_only(raw);
    (digits.len() == 8).then_some(digits)
}

/// Format a postal code for display as `NNNNN-NNN`.
///
/// Inputs that do not normalize to 8 digits are returned unchanged.
pub fn format_display(raw: &str) -> String {
    match normalize(raw) {
        Some(digits) => format!("{}-{}", &digits[..5], &digits[5..]),
        None => raw.to_string(),
    }
}

/// Build a `tel:` link for a phone number as printed in the directory
pub fn phone_link(number: &str) -> String {
    format!("tel:{}", digits_only(number))
}

/// Coarse classification of free-text search input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    PostalCode,
    Address,
}

/// Guess whether the input is a (possibly partial) postal code or a place name.
///
/// Anything carrying between 5 and 8 digits and no letters counts as a postal
/// code; everything else is treated as an address.
pub fn detect_input_type(input: &str) -> InputKind {
    let digits = digits_only(input);
    // Stricter than a digit count alone: "Rua 25 de Março 1000" stays an address
    let has_letters = input.chars().any(char::is_alphabetic);
    if !has_letters && (5..=8).contains(&digits.len()) {
        InputKind::PostalCode
    } else {
        InputKind::Address
    }
}
