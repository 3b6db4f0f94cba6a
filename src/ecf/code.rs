// src/ecf/code.rs

//! Federation grading-code validation
//!
//! A grading code is six digits followed by a check letter. The check
//! letter is drawn from an eleven-letter alphabet (I is skipped) and is
//! computed as a weighted digit sum modulo 11.

/// Check-letter alphabet; index = weighted digit sum mod 11
pub const CHECK_ALPHABET: [char; 11] = ['A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'J', 'K', 'L'];

/// Length of a grading code: six digits plus the check letter
pub const CODE_LENGTH: usize = 7;

/// Compute the check letter for a six-digit prefix.
///
/// Returns None unless the input is exactly six ASCII digits.
pub fn check_letter(digits: &str) -> Option<char> {
    if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let sum: u32 = digits
        .bytes()
        .enumerate()
        .map(|(i, b)| u32::from(b - b'0') * (7 - i as u32))
        .sum();
    Some(CHECK_ALPHABET[(sum % 11) as usize])
}

/// Check a full seven-character grading code, including the check letter.
pub fn is_valid_code(code: &str) -> bool {
    // Byte-wise: a multibyte character must never reach a str split
    let bytes = code.as_bytes();
    if bytes.len() != CODE_LENGTH || !bytes[..6].iter().all(u8::is_ascii_digit) {
        return false;
    }
    check_letter(&code[..6]) == Some(bytes[6] as char)
}

/// Structural shape test: six digits plus any letter from the check
/// alphabet, without verifying the check equation.
///
/// The source normalizer uses this when deciding whether a reported PIN
/// must be moved into a per-source namespace; a league that fills its PIN
/// column with grading codes must not cause cross-source merges even when
/// a code was mistyped.
pub fn looks_like_code(token: &str) -> bool {
    let bytes = token.as_bytes();
    bytes.len() == CODE_LENGTH
        && bytes[..6].iter().all(u8::is_ascii_digit)
        && CHECK_ALPHABET.contains(&(bytes[6] as char))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_letter() {
        // (1*7 + 2*6 + 3*5 + 4*4 + 5*3 + 6*2) = 77, 77 % 11 = 0 -> 'A'
        assert_eq!(check_letter("123456"), Some('A'));
        assert_eq!(check_letter("000000"), Some('A'));
        assert_eq!(check_letter("12345"), None);
        assert_eq!(check_letter("12345x"), None);
    }

    #[test]
    fn test_is_valid_code() {
        assert!(is_valid_code("123456A"));
        assert!(!is_valid_code("123456B"));
        assert!(!is_valid_code("123456"));
        assert!(!is_valid_code("123456AA"));
        assert!(!is_valid_code("12345aA"));
        // Seven bytes but not seven ASCII characters
        assert!(!is_valid_code("12345é"));
    }

    #[test]
    fn test_looks_like_code() {
        // Structural only: the check equation is not applied
        assert!(looks_like_code("123456B"));
        assert!(looks_like_code("123456A"));
        // 'I' is not in the alphabet
        assert!(!looks_like_code("123456I"));
        assert!(!looks_like_code("1234567"));
        assert!(!looks_like_code("123456"));
        // Multibyte input must be rejected, not split mid-character
        assert!(!looks_like_code("12345é"));
        assert!(!looks_like_code("1234é6"));
    }
}
