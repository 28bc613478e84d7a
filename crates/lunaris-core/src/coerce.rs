//! Type coercion helpers for Lua 5.4 semantics.
//!
//! These mirror what the interpreter does for `tonumber`/`tostring` so that
//! host-side conversions of bridged values agree with script-side ones.

/// A Lua number. The interpreter keeps integers and floats as distinct
/// subtypes, so conversions preserve which one was produced.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Number {
    Integer(i64),
    Float(f64),
}

impl Number {
    /// Widen to a float.
    pub fn to_f64(self) -> f64 {
        match self {
            Number::Integer(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    /// Narrow to an integer, truncating toward zero. Out-of-range floats
    /// saturate and NaN becomes 0.
    pub fn to_i64_truncated(self) -> i64 {
        match self {
            Number::Integer(i) => i,
            Number::Float(f) => f as i64,
        }
    }
}

/// Lua's `isspace` set (C locale).
fn is_lua_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0b' | '\x0c')
}

/// Convert a byte string to a number following `tonumber` rules:
/// surrounding whitespace is ignored, decimal and hexadecimal integers are
/// accepted (hex wraps around on overflow), decimal integers that overflow
/// fall back to floats, hexadecimal floats take a `p` exponent, and
/// `inf`/`nan` spellings are rejected.
pub fn str_to_number(bytes: &[u8]) -> Option<Number> {
    let s = std::str::from_utf8(bytes).ok()?;
    let s = s.trim_matches(is_lua_space);
    if s.is_empty() {
        return None;
    }
    if let Some(i) = str_to_integer(s) {
        return Some(Number::Integer(i));
    }
    str_to_float(s).map(Number::Float)
}

fn str_to_integer(s: &str) -> Option<i64> {
    let (neg, digits) = match s.as_bytes().first()? {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };

    if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        if hex.is_empty() {
            return None;
        }
        let mut acc: u64 = 0;
        for c in hex.chars() {
            let d = c.to_digit(16)?;
            acc = acc.wrapping_mul(16).wrapping_add(d as u64);
        }
        let v = acc as i64;
        return Some(if neg { v.wrapping_neg() } else { v });
    }

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut acc: u64 = 0;
    for b in digits.bytes() {
        acc = acc.checked_mul(10)?.checked_add((b - b'0') as u64)?;
    }
    if neg {
        if acc <= 1u64 << 63 {
            Some((acc as i64).wrapping_neg())
        } else {
            None
        }
    } else {
        i64::try_from(acc).ok()
    }
}

fn split_sign(s: &str) -> (bool, &str) {
    match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    }
}

fn str_to_float(s: &str) -> Option<f64> {
    // The C library would accept "inf" and "nan"; Lua explicitly does not.
    if s.contains(['n', 'N']) {
        return None;
    }
    let (neg, body) = split_sign(s);
    if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        let v = hex_to_float(hex)?;
        return Some(if neg { -v } else { v });
    }
    s.parse::<f64>().ok()
}

/// Hexadecimal float body after the `0x`: hex digits with an optional
/// `.` fraction and an optional binary exponent (`p` or `P`, decimal).
fn hex_to_float(hex: &str) -> Option<f64> {
    let (mantissa, exponent) = match hex.find(['p', 'P']) {
        Some(i) => (&hex[..i], Some(&hex[i + 1..])),
        None => (hex, None),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }

    let mut value = 0.0f64;
    for c in int_part.chars() {
        value = value * 16.0 + c.to_digit(16)? as f64;
    }
    let mut scale = 1.0 / 16.0;
    for c in frac_part.chars() {
        value += c.to_digit(16)? as f64 * scale;
        scale /= 16.0;
    }

    let exp = match exponent {
        None => 0,
        Some(e) => {
            let (neg, digits) = split_sign(e);
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let magnitude = digits
                .bytes()
                .fold(0i32, |acc, b| acc.saturating_mul(10).saturating_add((b - b'0') as i32));
            if neg {
                -magnitude
            } else {
                magnitude
            }
        }
    };
    Some(value * 2f64.powi(exp))
}

/// Convert a float to integer if it has no fractional part.
pub fn float_to_integer(f: f64) -> Option<i64> {
    if f.is_finite() && f >= -9.223_372_036_854_776e18 && f < 9.223_372_036_854_776e18 {
        let i = f as i64;
        if i as f64 == f {
            return Some(i);
        }
    }
    None
}

/// Format a number the way `tostring` does.
pub fn number_to_string(n: Number) -> String {
    match n {
        Number::Integer(i) => i.to_string(),
        Number::Float(f) => format_float(f),
    }
}

/// Format a float using Lua's `%.14g`, appending `.0` when the result
/// would otherwise read as an integer.
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return if f.is_sign_negative() { "-nan" } else { "nan" }.to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let mut s = format_general(f, 14);
    if s.bytes().all(|b| b == b'-' || b.is_ascii_digit()) {
        s.push_str(".0");
    }
    s
}

/// C `%.<precision>g` for finite values.
fn format_general(f: f64, precision: i32) -> String {
    if f == 0.0 {
        return if f.is_sign_negative() { "-0" } else { "0" }.to_string();
    }
    let sci = format!("{:.*e}", (precision - 1) as usize, f);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };
    if exp < -4 || exp >= precision {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_fraction(mantissa), sign, exp.abs())
    } else {
        let decimals = (precision - 1 - exp).max(0) as usize;
        trim_fraction(&format!("{:.*}", decimals, f)).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
