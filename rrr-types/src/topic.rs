//! Slash-tokenized topic name/filter matching shared by the broker
//! (§4.2 `topic_match`) and the MQTT subscription matcher (§4.4).

use crate::err::{DecodeError, DecodeErrorKind};

#[derive(Clone, Debug, PartialOrd, Ord, Eq, Hash)]
enum Token {
    MultiLevel,
    SingleLevel,
    Literal(String),
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Token::Literal(a), Token::Literal(b)) => a == b,
            (Token::MultiLevel, Token::MultiLevel) => true,
            (Token::SingleLevel, Token::SingleLevel) => true,
            _ => false,
        }
    }
}

impl Token {
    fn from_str(s: &str) -> Self {
        match s {
            "#" => Token::MultiLevel,
            "+" => Token::SingleLevel,
            _ => Token::Literal(s.to_string()),
        }
    }
}

fn tokenize(s: &str) -> Vec<Token> {
    s.split('/').map(Token::from_str).collect()
}

/// A topic filter, possibly containing `+`/`#` wildcards. `#`, per §4.2,
/// is only permitted as the final token.
#[derive(Clone, Debug)]
pub struct TopicFilter(Vec<Token>);

impl TopicFilter {
    pub fn parse(filter: &str) -> Result<Self, DecodeError> {
        if filter.is_empty() {
            return Err(DecodeError::new(
                DecodeErrorKind::MalformedTopic,
                String::from("topic filter must not be empty"),
            ));
        }

        let tokens = tokenize(filter);
        for (idx, token) in tokens.iter().enumerate() {
            if matches!(token, Token::MultiLevel) && idx != tokens.len() - 1 {
                return Err(DecodeError::new(
                    DecodeErrorKind::MalformedTopic,
                    format!("'#' is only valid as the final token of filter '{filter}'"),
                ));
            }
        }

        return Ok(Self(tokens));
    }

    pub fn matches(&self, topic: &str) -> bool {
        let topic_tokens = tokenize(topic);
        let mut t_iter = topic_tokens.iter();
        let mut f_iter = self.0.iter().peekable();

        loop {
            match (t_iter.next(), f_iter.next()) {
                (Some(_), Some(Token::MultiLevel)) => return true,
                (Some(Token::Literal(t)), Some(Token::Literal(f))) => {
                    if t != f {
                        return false;
                    }
                }
                (Some(_), Some(Token::SingleLevel)) => {}
                (None, None) => return true,
                (None, Some(Token::MultiLevel)) => return true,
                _ => return false,
            }
        }
    }
}

/// Tokenizes a filter once and matches `topic` against it (§4.2
/// `topic_match`): single-level wildcard matches exactly one token,
/// multi-level wildcard matches zero or more trailing tokens, `#` is only
/// valid as the filter's final token.
pub fn topic_match(topic: &str, filter: &str) -> bool {
    match TopicFilter::parse(filter) {
        Ok(filter) => filter.matches(topic),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_matches_anything() {
        assert!(topic_match("a/b/c", "#"));
        assert!(topic_match("a", "#"));
    }

    #[test]
    fn single_level_matches_one_token() {
        assert!(topic_match("a/b/c", "a/+/c"));
        assert!(!topic_match("a/b/c/d", "a/+/c"));
    }

    #[test]
    fn multi_level_only_valid_at_end() {
        assert!(TopicFilter::parse("a/#/c").is_err());
        assert!(TopicFilter::parse("a/b/#").is_ok());
    }
}
