use crate::core::{BackupError, Result};

/// Splits a command line into words following POSIX `sh` quoting rules.
///
/// Supports single quotes, double quotes (where only `\"`, `\\`, `\$` and
/// `` \` `` are escapes) and backslash escapes outside quotes. Expansions are
/// not performed.
pub fn split_command_line(line: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            ' ' | '\t' | '\n' => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(inner) => current.push(inner),
                        None => {
                            return Err(BackupError::Config(format!(
                                "unterminated single quote in command line: {}",
                                line
                            )));
                        }
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.peek().copied() {
                            Some(next @ ('"' | '\\' | '$' | '`')) => {
                                current.push(next);
                                chars.next();
                            }
                            _ => current.push('\\'),
                        },
                        Some(inner) => current.push(inner),
                        None => {
                            return Err(BackupError::Config(format!(
                                "unterminated double quote in command line: {}",
                                line
                            )));
                        }
                    }
                }
            }
            '\\' => {
                in_word = true;
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            other => {
                in_word = true;
                current.push(other);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

/// Quotes `word` for `sh` when it contains characters the shell would interpret.
pub fn quote_word(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-' | ':' | '=' | ',' | '+' | '@'));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', "'\\''"))
    }
}

/// Returns the value of the first `--name=value` word, if present.
pub fn flag_value<'a>(words: &'a [String], name: &str) -> Option<&'a str> {
    let prefix = format!("--{}=", name);
    words
        .iter()
        .find_map(|word| word.strip_prefix(prefix.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_plain_words_and_env_assignment() {
        let words = split_command_line("PGPORT=6000  clusterbackup pg\tbackup-push /data").unwrap();
        assert_eq!(
            words,
            vec!["PGPORT=6000", "clusterbackup", "pg", "backup-push", "/data"]
        );
    }

    #[test]
    fn double_quotes_keep_only_shell_escapes() {
        let words = split_command_line(r#"--x="{\"a\":\"b\\n\"}" '$lit'"#).unwrap();
        assert_eq!(words[0], r#"--x={"a":"b\n"}"#);
        assert_eq!(words[1], "$lit");
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        assert!(split_command_line("echo \"oops").is_err());
    }

    #[test]
    fn quote_word_survives_tokenization() {
        assert_eq!(quote_word("/data/seg0"), "/data/seg0");
        let odd = "/data/it's here";
        let quoted = quote_word(odd);
        assert_eq!(split_command_line(&quoted).unwrap(), vec![odd.to_string()]);
    }

    #[test]
    fn flag_value_finds_named_flag() {
        let words = split_command_line("cmd --config=/etc/a.json --b=2").unwrap();
        assert_eq!(flag_value(&words, "config"), Some("/etc/a.json"));
        assert_eq!(flag_value(&words, "missing"), None);
    }
}
