//! Transfer codes: human-transcribable secrets shared between devices.
//!
//! A transfer code is the only key material protecting the cloud copy, so
//! it must be easy to read off one screen and type into another. The
//! alphabet drops every glyph pair people confuse (`0/O`, `1/I/l`) plus
//! the non-alphanumeric base64 symbols.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rand::Rng;

/// Code length in characters.
pub const CODE_LENGTH: usize = 16;

/// The 57 unambiguous symbols a transfer code is drawn from: the base64
/// alphabet without `0 O 1 I l + /`.
pub const ALPHABET: &str = "ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz23456789";

/// Generate a new random transfer code.
///
/// Random bytes are base64-encoded and filtered to the unambiguous
/// alphabet until 16 characters are collected. Rejection sampling keeps
/// the distribution uniform; truncating a biased mapping would not.
pub fn generate() -> String {
    let mut rng = rand::rng();
    let mut code = String::with_capacity(CODE_LENGTH);

    while code.len() < CODE_LENGTH {
        let mut bytes = [0u8; 32];
        rng.fill(&mut bytes[..]);
        for ch in STANDARD.encode(bytes).chars() {
            if ALPHABET.contains(ch) {
                code.push(ch);
                if code.len() == CODE_LENGTH {
                    break;
                }
            }
        }
    }

    code
}

/// Strip the whitespace a user may have typed or copied along.
pub fn normalize(input: &str) -> String {
    input.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Whether `input` (after whitespace removal) is a well-formed code.
pub fn is_valid(input: &str) -> bool {
    let code = normalize(input);
    code.len() == CODE_LENGTH && code.chars().all(|c| ALPHABET.contains(c))
}

/// Format a code for display as four groups of four.
pub fn format(code: &str) -> String {
    let code = normalize(code);
    code.as_bytes()
        .chunks(4)
        .map(|chunk| std::str::from_utf8(chunk).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(" ")
}
