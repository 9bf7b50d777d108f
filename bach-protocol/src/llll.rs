//! Structural checks for llll strings
//!
//! Only bracket balance and forbidden characters are checked. Whether the
//! content makes musical sense is left to the host.

/// Why an llll string was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LlllError {
    #[error("llll is empty")]
    Empty,

    #[error("unexpected closing bracket ']' at position {position} (context: '...{context}...')")]
    UnexpectedClose { position: usize, context: String },

    #[error("{depth} unclosed bracket(s) '[' remain at end of string")]
    Unclosed { depth: usize },

    #[error("illegal character(s) {chars}; llll only uses square brackets for grouping")]
    IllegalCharacters { chars: String },
}

const CONTEXT_RADIUS: usize = 20;

/// Validate bracket balance and reject curly braces.
pub fn validate_llll(text: &str) -> Result<(), LlllError> {
    if text.trim().is_empty() {
        return Err(LlllError::Empty);
    }

    let chars: Vec<char> = text.chars().collect();
    let mut depth: usize = 0;

    for (position, ch) in chars.iter().enumerate() {
        match ch {
            '[' => depth += 1,
            ']' => {
                if depth == 0 {
                    let start = position.saturating_sub(CONTEXT_RADIUS);
                    let end = (position + CONTEXT_RADIUS).min(chars.len());
                    let context: String = chars[start..end]
                        .iter()
                        .map(|c| if *c == '\n' { ' ' } else { *c })
                        .collect();
                    return Err(LlllError::UnexpectedClose { position, context });
                }
                depth -= 1;
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err(LlllError::Unclosed { depth });
    }

    let mut illegal: Vec<char> = chars.iter().copied().filter(|c| matches!(c, '{' | '}')).collect();
    if !illegal.is_empty() {
        illegal.sort_unstable();
        illegal.dedup();
        let chars = illegal
            .iter()
            .map(|c| format!("'{}'", c))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(LlllError::IllegalCharacters { chars });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_chord() {
        assert!(validate_llll("[1000 [6000 500 100] [6400 500 90]]").is_ok());
    }

    #[test]
    fn test_valid_multi_voice_body() {
        assert!(validate_llll("[ [ 0. [ 6000. 500. 100 0 ] 0 ] 0 ] [ [ 0. [ 4800. 500. 90 0 ] 0 ] 0 ]").is_ok());
    }

    #[test]
    fn test_empty_rejected() {
        assert_eq!(validate_llll("   "), Err(LlllError::Empty));
    }

    #[test]
    fn test_unclosed() {
        assert_eq!(
            validate_llll("[1000 [6000 500 100]"),
            Err(LlllError::Unclosed { depth: 1 })
        );
    }

    #[test]
    fn test_extra_close_reports_position() {
        match validate_llll("[0 [6000]]]") {
            Err(LlllError::UnexpectedClose { position, context }) => {
                assert_eq!(position, 10);
                assert!(context.contains("6000"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_curly_braces_rejected() {
        let err = validate_llll("[0 {6000 500 100}]").unwrap_err();
        assert_eq!(
            err,
            LlllError::IllegalCharacters {
                chars: "'{', '}'".into()
            }
        );
        assert!(err.to_string().contains("square brackets"));
    }
}
