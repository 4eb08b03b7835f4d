// core/src/domain/version.rs
//
// Alphanumeric version key: splits a version string on maximal digit
// runs so that '1.0.10' sorts after '1.0.2', expressed as a comparable
// Rust value instead of a list of heterogeneous tokens.

use std::cmp::Ordering;

/// One token of an alphanumeric key: either a lowercased string run or an
/// integer run. Comparing two `Token`s of different variants is a logic
/// error in this domain (version strings always start and end on a string
/// segment, even if empty) so we only ever compare same-variant pairs once
/// the surrounding `AlphaKey` has normalised both sides.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Token {
    Str(String),
    Int(u64),
}

/// A comparable alphanumeric key: lexicographic,
/// element-wise comparison where integers compare as integers and strings
/// as strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlphaKey(Vec<Token>);

impl AlphaKey {
    /// Split `version` on maximal digit runs, alternating string segments
    /// (lowercased) and integers. Empty input yields an empty key.
    pub fn new(version: &str) -> Self {
        if version.is_empty() {
            return AlphaKey(Vec::new());
        }

        let mut tokens = Vec::new();
        let mut chars = version.chars().peekable();
        let mut buf = String::new();

        while let Some(&c) = chars.peek() {
            if c.is_ascii_digit() {
                if !buf.is_empty() {
                    tokens.push(Token::Str(buf.to_lowercase()));
                    buf = String::new();
                }
                let mut digits = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        digits.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                // A run of digits always fits in u64 for any realistic version string;
                // if it somehow doesn't, fall back to treating it as a string so we
                // never panic on attacker-controlled filenames.
                match digits.parse::<u64>() {
                    Ok(n) => tokens.push(Token::Int(n)),
                    Err(_) => tokens.push(Token::Str(digits)),
                }
            } else {
                buf.push(c);
                chars.next();
            }
        }
        if !buf.is_empty() {
            tokens.push(Token::Str(buf.to_lowercase()));
        }

        AlphaKey(tokens)
    }
}

impl PartialOrd for AlphaKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AlphaKey {
    fn cmp(&self, other: &Self) -> Ordering {
        for pair in self.0.iter().zip(other.0.iter()) {
            let ord = match pair {
                (Token::Int(a), Token::Int(b)) => a.cmp(b),
                (Token::Str(a), Token::Str(b)) => a.cmp(b),
                // A string segment and an integer segment never compare equal;
                // order them by kind so comparisons stay total without panicking.
                (Token::Str(_), Token::Int(_)) => Ordering::Greater,
                (Token::Int(_), Token::Str(_)) => Ordering::Less,
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        self.0.len().cmp(&other.0.len())
    }
}

/// Sort a slice of strings in place using alphanumeric comparison.
pub fn sorted_alphanumeric<S: AsRef<str>>(mut data: Vec<S>) -> Vec<S> {
    data.sort_by(|a, b| AlphaKey::new(a.as_ref()).cmp(&AlphaKey::new(b.as_ref())));
    data
}

/// Find the maximum version from a set of versions using alphanumeric
/// comparison. Empty or all-empty input yields `None`.
pub fn max_alphanumeric<'a, I: IntoIterator<Item = &'a str>>(versions: I) -> Option<&'a str> {
    versions
        .into_iter()
        .filter(|v| !v.is_empty())
        .max_by(|a, b| AlphaKey::new(a).cmp(&AlphaKey::new(b)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_numeric_runs_numerically() {
        assert!(AlphaKey::new("1.0.10") > AlphaKey::new("1.0.2"));
        assert!(AlphaKey::new("1.0.2") > AlphaKey::new("1.0.1"));
    }

    #[test]
    fn empty_string_yields_empty_key() {
        assert_eq!(AlphaKey::new(""), AlphaKey(Vec::new()));
    }

    #[test]
    fn non_digit_segments_sort_lexicographically() {
        assert!(AlphaKey::new("1.0.0-beta") < AlphaKey::new("1.0.0-rc"));
    }

    #[test]
    fn sorted_alphanumeric_orders_version_list() {
        let input = vec!["v1.0.10", "v1.0.2", "v1.0.1"];
        assert_eq!(sorted_alphanumeric(input), vec!["v1.0.1", "v1.0.2", "v1.0.10"]);
    }

    #[test]
    fn max_alphanumeric_finds_highest_version() {
        let versions = vec!["1.0.2", "1.0.10", "1.0.1"];
        assert_eq!(max_alphanumeric(versions), Some("1.0.10"));
    }

    #[test]
    fn max_alphanumeric_empty_input_is_none() {
        let versions: Vec<&str> = vec![];
        assert_eq!(max_alphanumeric(versions), None);
    }
}
