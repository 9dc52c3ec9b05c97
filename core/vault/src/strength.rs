//! Password strength checks and generation.

use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::Rng;

/// Minimum length for a strong password, in characters.
pub const MIN_STRONG_LENGTH: usize = 12;

/// Default length for generated passwords.
pub const DEFAULT_GENERATED_LENGTH: usize = 16;

const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";
const DIGITS: &str = "0123456789";
const SYMBOLS: &str = "!@#$%^&*()-_=+[]{};:,.<>?";

/// Result of [`check_password_strength`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrengthReport {
    pub is_strong: bool,
    /// Human-readable reasons, empty when strong.
    pub issues: Vec<String>,
}

/// Check a password against the strength rules.
///
/// Advisory only: nothing in the vault rejects a weak password.
pub fn check_password_strength(password: &str) -> StrengthReport {
    let mut issues = Vec::new();

    if password.chars().count() < MIN_STRONG_LENGTH {
        issues.push(format!("At least {} characters", MIN_STRONG_LENGTH));
    }
    if !password.chars().any(char::is_uppercase) {
        issues.push("Include an uppercase letter".to_string());
    }
    if !password.chars().any(char::is_lowercase) {
        issues.push("Include a lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        issues.push("Include a number".to_string());
    }
    if !password.chars().any(|c| SYMBOLS.contains(c)) {
        issues.push("Include a symbol".to_string());
    }

    StrengthReport {
        is_strong: issues.is_empty(),
        issues,
    }
}

fn pick<R: Rng + ?Sized>(rng: &mut R, class: &[char]) -> char {
    class[rng.gen_range(0..class.len())]
}

/// Generate a random password of `length` characters.
///
/// Always contains at least one uppercase letter, lowercase letter, digit
/// and symbol, so lengths below four still yield four characters.
pub fn generate_strong_password(length: usize) -> String {
    let mut rng = OsRng;

    let upper: Vec<char> = UPPER.chars().collect();
    let lower: Vec<char> = LOWER.chars().collect();
    let digits: Vec<char> = DIGITS.chars().collect();
    let symbols: Vec<char> = SYMBOLS.chars().collect();
    let all: Vec<char> = [UPPER, LOWER, DIGITS, SYMBOLS].concat().chars().collect();

    let mut password = vec![
        pick(&mut rng, &upper),
        pick(&mut rng, &lower),
        pick(&mut rng, &digits),
        pick(&mut rng, &symbols),
    ];
    while password.len() < length {
        password.push(pick(&mut rng, &all));
    }

    password.shuffle(&mut rng);
    password.into_iter().collect()
}
