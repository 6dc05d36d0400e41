/// 12458 becomes "12,458".
pub fn thousands<T: std::fmt::Display>(s: T, _: &dyn askama::Values) -> askama::Result<String> {
    let s = s.to_string();
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", s.as_str()),
    };
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Ok(s);
    }

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    Ok(format!("{}{}", sign, grouped))
}
