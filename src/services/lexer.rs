/// Shell-style tokenizer for the command router
///
/// Splits a line into words with POSIX `shlex` rules and no comment
/// handling. Space, tab, CR and LF separate words. Single quotes are
/// literal. Inside double quotes a backslash escapes only `"` and `\\`,
/// and outside quotes it escapes any next character. `#` is an ordinary
/// character.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitError {
    UnterminatedQuote(char),
    TrailingEscape,
}

impl std::fmt::Display for SplitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SplitError::UnterminatedQuote(q) => write!(f, "no closing quotation ({})", q),
            SplitError::TrailingEscape => write!(f, "no escaped character"),
        }
    }
}

impl std::error::Error for SplitError {}

pub fn split(line: &str) -> Result<Vec<String>, SplitError> {
    let mut words = Vec::new();
    let mut current = String::new();
    // A word exists once any character or quote pair was consumed, so `''` yields an empty word.
    let mut in_word = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            ' ' | '\t' | '\r' | '\n' => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\\' => {
                let escaped = chars.next().ok_or(SplitError::TrailingEscape)?;
                current.push(escaped);
                in_word = true;
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(inner) => current.push(inner),
                        None => return Err(SplitError::UnterminatedQuote('\'')),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(next @ ('"' | '\\')) => current.push(next),
                            Some(next) => {
                                current.push('\\');
                                current.push(next);
                            }
                            None => return Err(SplitError::TrailingEscape),
                        },
                        Some(inner) => current.push(inner),
                        None => return Err(SplitError::UnterminatedQuote('"')),
                    }
                }
            }
            other => {
                current.push(other);
                in_word = true;
            }
        }
    }

    if in_word {
        words.push(current);
    }
    Ok(words)
}

/// Quote `word` so a POSIX shell reads it back as a single word.
pub fn quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r#"'\''"#))
    }
}
