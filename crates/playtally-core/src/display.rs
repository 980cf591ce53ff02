//! Human-readable number formatting shared by the dashboard and the CLI.

/// `1234567` → `1,234,567`.
///
/// Takes anything that widens to `i128`, so both raw `u64` counts and `i64`
/// deltas format without a lossy cast.
pub fn group_digits(n: impl Into<i128>) -> String {
    let n = n.into();
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Grouped delta with an explicit `+` on increases.
pub fn signed(n: i64) -> String {
    if n > 0 {
        format!("+{}", group_digits(n))
    } else {
        group_digits(n)
    }
}
