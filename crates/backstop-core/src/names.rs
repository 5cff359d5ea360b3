use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("rule name must not be empty")]
    Empty,
    #[error("rule name must not contain control character {character:?}")]
    InvalidCharacter { character: char },
}

/// Trims a user-supplied rule name and checks that it can be used as a key.
pub fn normalize_rule_name(name: &str) -> Result<String, NameError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(NameError::Empty);
    }

    if let Some(character) = trimmed.chars().find(|character| character.is_control()) {
        return Err(NameError::InvalidCharacter { character });
    }

    Ok(trimmed.to_string())
}

/// Trims a directory or skip path; empty input is rejected.
pub fn normalize_path(path: &str) -> Option<String> {
    let trimmed = path.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
