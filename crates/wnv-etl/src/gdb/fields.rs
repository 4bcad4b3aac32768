const MAX_FIELD_NAME_LEN: usize = 64;

/// Turns a CSV column header into a geodatabase field name.
///
/// Characters outside `[A-Za-z0-9_]` become `_`, a leading digit gets an `F_` prefix and
/// the result is capped at 64 characters. `Street Address` becomes `Street_Address`.
pub fn sanitize_field_name(header: &str) -> String {
    let cleaned = header.replace(['\u{feff}', '\u{200b}'], "");
    let mut name: String = cleaned
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();

    if name.is_empty() {
        name.push_str("Field");
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert_str(0, "F_");
    }

    name.truncate(MAX_FIELD_NAME_LEN);
    name
}

pub(crate) fn is_valid_class_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    name.len() <= 160 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
