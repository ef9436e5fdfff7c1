//! Decimal amount formatting.
//!
//! Balances travel as decimal strings end to end. Formatting for
//! display pads or rounds to a fixed scale using digit arithmetic on
//! the string itself; amounts never pass through floating point, so
//! `0.1`-style representation drift cannot creep into what users see.

/// Display scale for token amounts.
pub const DECIMALS: usize = 6;

/// The canonical zero amount at display scale.
pub const ZERO: &str = "0.000000";

/// Format a raw decimal string to exactly [`DECIMALS`] fractional
/// digits, rounding half-up. Returns `None` when the input is not a
/// plain decimal number.
///
/// Accepted shapes: optional `+`/`-` sign, digits, at most one `.`.
/// Surrounding whitespace is ignored. `-0` collapses to positive zero.
pub fn format_amount(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let (negative, body) = match trimmed.as_bytes()[0] {
        b'-' => (true, &trimmed[1..]),
        b'+' => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    if body.is_empty() {
        return None;
    }

    let mut parts = body.splitn(2, '.');
    let int_part = parts.next().unwrap_or("");
    let frac_part = parts.next().unwrap_or("");
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let mut int_digits: Vec<u8> = int_part.bytes().map(|b| b - b'0').collect();
    let mut frac_digits: Vec<u8> = frac_part.bytes().map(|b| b - b'0').collect();

    if frac_digits.len() > DECIMALS {
        let round_up = frac_digits[DECIMALS] >= 5;
        frac_digits.truncate(DECIMALS);
        if round_up {
            let mut carry = 1u8;
            for digit in frac_digits.iter_mut().rev() {
                let sum = *digit + carry;
                *digit = sum % 10;
                carry = sum / 10;
                if carry == 0 {
                    break;
                }
            }
            if carry > 0 {
                for digit in int_digits.iter_mut().rev() {
                    let sum = *digit + carry;
                    *digit = sum % 10;
                    carry = sum / 10;
                    if carry == 0 {
                        break;
                    }
                }
                if carry > 0 {
                    int_digits.insert(0, carry);
                }
            }
        }
    } else {
        frac_digits.resize(DECIMALS, 0);
    }

    let int_str: String = match int_digits.iter().position(|&d| d != 0) {
        Some(first) => int_digits[first..].iter().map(|d| (d + b'0') as char).collect(),
        None => "0".to_string(),
    };
    let frac_str: String = frac_digits.iter().map(|d| (d + b'0') as char).collect();

    let is_zero = int_str == "0" && frac_digits.iter().all(|&d| d == 0);
    let sign = if negative && !is_zero { "-" } else { "" };
    Some(format!("{}{}.{}", sign, int_str, frac_str))
}
