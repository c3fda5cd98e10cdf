//! String helpers shared by payload validation and ingestion.

/// Trim and collapse internal runs of whitespace to a single space.
pub fn clean_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `clean_text`, mapping blank input to `None`.
pub fn clean_opt(s: Option<&str>) -> Option<String> {
    s.map(clean_text).filter(|v| !v.is_empty())
}

/// Clean every entry, drop blanks and case-insensitive duplicates, keep first-seen order.
pub fn clean_list<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for item in items {
        let cleaned = clean_text(item.as_ref());
        if cleaned.is_empty() {
            continue;
        }
        if !out.iter().any(|seen| seen.to_lowercase() == cleaned.to_lowercase()) {
            out.push(cleaned);
        }
    }
    out
}

/// Lowercase and strip Spanish diacritics, for matching headers and field names.
pub fn fold(s: &str) -> String {
    s.trim()
        .chars()
        .map(|c| match c {
            'á' | 'Á' => 'a',
            'é' | 'É' => 'e',
            'í' | 'Í' => 'i',
            'ó' | 'Ó' => 'o',
            'ú' | 'Ú' | 'ü' | 'Ü' => 'u',
            'ñ' | 'Ñ' => 'n',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

/// Canonical form of a Chilean RUT (`12345678-5`), or `None` when malformed or the
/// check digit does not match.
pub fn normalize_rut(raw: &str) -> Option<String> {
    let mut compact: String = raw
        .chars()
        .filter(|c| !matches!(c, '.' | ' ' | '-'))
        .collect::<String>()
        .to_uppercase();

    let dv = compact.pop()?;
    let body = compact.as_str();
    if body.is_empty() || body.len() > 9 || !body.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let body = body.trim_start_matches('0');
    if body.is_empty() {
        return None;
    }

    let expected = rut_check_digit(body)?;
    if dv != expected {
        return None;
    }
    Some(format!("{body}-{expected}"))
}

/// Modulo-11 check digit over the numeric body of a RUT.
fn rut_check_digit(body: &str) -> Option<char> {
    let mut sum = 0u32;
    let mut weight = 2u32;
    for c in body.chars().rev() {
        sum += c.to_digit(10)? * weight;
        weight = if weight == 7 { 2 } else { weight + 1 };
    }
    match 11 - (sum % 11) {
        11 => Some('0'),
        10 => Some('K'),
        d => char::from_digit(d, 10),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  Juan   Pérez \n"), "Juan Pérez");
        assert_eq!(clean_opt(Some("   ")), None);
        assert_eq!(clean_opt(Some(" x ")), Some("x".to_string()));
    }

    #[test]
    fn test_clean_list_dedups_case_insensitively() {
        let list = clean_list(["Salud", " salud ", "", "Contacto"]);
        assert_eq!(list, vec!["Salud".to_string(), "Contacto".to_string()]);
    }

    #[test]
    fn test_fold() {
        assert_eq!(fold(" Categoría de Daños "), "categoria de danos");
    }

    #[test]
    fn test_normalize_rut_accepts_common_formats() {
        assert_eq!(normalize_rut("12.345.678-5").as_deref(), Some("12345678-5"));
        assert_eq!(normalize_rut("123456785").as_deref(), Some("12345678-5"));
        assert_eq!(normalize_rut("11.111.111-1").as_deref(), Some("11111111-1"));
    }

    #[test]
    fn test_normalize_rut_k_check_digit() {
        // 10.000.013: weights give 11 - (sum % 11) == 10
        let body = "10000013";
        let dv = rut_check_digit(body).unwrap();
        assert_eq!(dv, 'K');
        assert_eq!(
            normalize_rut("10.000.013-k").as_deref(),
            Some("10000013-K")
        );
    }

    #[test]
    fn test_normalize_rut_rejects_bad_input() {
        assert!(normalize_rut("12.345.678-9").is_none());
        assert!(normalize_rut("abc").is_none());
        assert!(normalize_rut("").is_none());
        assert!(normalize_rut("0-0").is_none());
    }

    #[test]
    fn test_normalize_rut_multibyte_input() {
        assert!(normalize_rut("1é").is_none());
        assert!(normalize_rut("12345678-É").is_none());
        assert!(normalize_rut("ñ").is_none());
        assert!(normalize_rut("1234567ü-5").is_none());
    }
}
