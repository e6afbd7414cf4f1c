/// Labels are 1 to 6 characters, a leading letter then alphanumerics.
pub const MAX_LABEL_LEN: usize = 6;

/// Reserved symbol the linker resolves to one past the end of data
/// when no object defines it.
pub const STACK_LABEL: &str = "Stack";

pub fn is_valid_label(name: &str) -> bool {
  if name.is_empty() || name.len() > MAX_LABEL_LEN {
    return false;
  }
  let mut chars = name.chars();
  match chars.next() {
    Some(first) if first.is_ascii_alphabetic() => {}
    _ => return false,
  }
  chars.all(|c| c.is_ascii_alphanumeric())
}

/// A label is global iff its first character is uppercase.
pub fn is_global_label(name: &str) -> bool {
  name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn accepts_short_alphanumeric_labels() {
    assert!(is_valid_label("a"));
    assert!(is_valid_label("loop1"));
    assert!(is_valid_label("Stack"));
    assert!(is_valid_label("Ab9z42"));
  }

  #[test]
  fn rejects_malformed_labels() {
    assert!(!is_valid_label(""));
    assert!(!is_valid_label("toolong7"));
    assert!(!is_valid_label("1abc"));
    assert!(!is_valid_label("ab_c"));
    assert!(!is_valid_label("ab cd"));
  }

  #[test]
  fn globality_follows_leading_case() {
    assert!(is_global_label("Foo"));
    assert!(is_global_label("Stack"));
    assert!(!is_global_label("foo"));
    assert!(!is_global_label("x1"));
    assert!(!is_global_label(""));
  }
}
