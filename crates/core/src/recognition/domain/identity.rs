/// Identity names are non-empty and limited to letters, digits, `-` and `_`.
/// Letters and digits may be any Unicode alphanumerics.
pub fn is_valid_identity(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
}
