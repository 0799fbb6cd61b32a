use logos::Logos;

/// Token stream for the trait-expression surface. The grammar is a flat
/// S-expression form: parentheses delimit, everything else is either a
/// double-quoted literal or a bare atom. Field names and string literals
/// are lexically identical — the compiler decides by position.
#[derive(Logos, Debug, PartialEq, Clone)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    // Quoted form; no escape sequences, matching the tokenizer the
    // expression language was designed against.
    #[regex(r#""[^"]*""#, |lex| {
        let s = lex.slice();
        Some(s[1..s.len()-1].to_string())
    })]
    Quoted(String),

    // Bare atom: operator keywords and unquoted literals.
    #[regex(r#"[^()"\s]+"#, |lex| lex.slice().to_string())]
    Atom(String),
}

impl Token {
    /// The textual payload of a word-like token (quoted or bare).
    pub fn word(&self) -> Option<&str> {
        match self {
            Token::Quoted(s) | Token::Atom(s) => Some(s),
            _ => None,
        }
    }
}

/// Lex one trait expression into tokens.
pub fn lex(source: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => tokens.push(token),
            Err(()) => {
                let span = lexer.span();
                return Err(LexError {
                    position: span.start,
                    snippet: source[span].to_string(),
                });
            }
        }
    }

    Ok(tokens)
}

#[derive(Debug, thiserror::Error)]
#[error("unexpected input at position {position}: '{snippet}'")]
pub struct LexError {
    pub position: usize,
    pub snippet: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lex_simple_comparison() {
        let tokens = lex(r#"(trait-eq "long" "1")"#).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::LParen,
                Token::Atom("trait-eq".to_string()),
                Token::Quoted("long".to_string()),
                Token::Quoted("1".to_string()),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn lex_nested_list() {
        let tokens = lex(r#"(trait-in "field" ("v1" "v2"))"#).unwrap();
        let lparens = tokens.iter().filter(|t| **t == Token::LParen).count();
        let rparens = tokens.iter().filter(|t| **t == Token::RParen).count();
        assert_eq!(lparens, 2);
        assert_eq!(rparens, 2);
        assert_eq!(tokens[3], Token::LParen);
        assert_eq!(tokens[4], Token::Quoted("v1".to_string()));
    }

    #[test]
    fn lex_empty_quoted() {
        let tokens = lex(r#"(trait-eq "field" "")"#).unwrap();
        assert_eq!(tokens[3], Token::Quoted(String::new()));
    }

    #[test]
    fn word_covers_quoted_and_bare() {
        assert_eq!(Token::Quoted("x".into()).word(), Some("x"));
        assert_eq!(Token::Atom("and".into()).word(), Some("and"));
        assert_eq!(Token::LParen.word(), None);
    }

    #[test]
    fn lex_rejects_unterminated_quote() {
        // The dangling quote cannot start a valid token.
        assert!(lex(r#"(trait-eq "long" "1)"#).is_err());
    }
}
