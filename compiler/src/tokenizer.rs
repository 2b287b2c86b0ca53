use regex::Regex;
use lazy_static::lazy_static;
use crate::utils::{quote, error};
use crate::error::StructError;

lazy_static! {
    /// Every lexeme of the schema language, trivia included.
    pub static ref TOKEN_REGEX: Regex = Regex::new(r"[A-Za-z_][A-Za-z0-9_]*|[{};]|//[^\n]*|/\*(?s:.*?)\*/|\s+").unwrap();
}

#[derive(Debug, PartialEq)]
pub struct Token {
    pub text:   String,
    pub line:   usize,
    pub column: usize,
}

/// 1-based source position.
#[derive(Clone, Copy)]
struct Position {
    line:   usize,
    column: usize,
}

impl Position {
    fn advance(&mut self, lexeme: &str) {
        match lexeme.rfind('\n') {
            Some(last) => {
                self.line += lexeme.matches('\n').count();
                self.column = lexeme.len() - last;
            }
            None => self.column += lexeme.len(),
        }
    }

    fn unexpected(self, text: &str) -> StructError {
        error(&format!("Syntax error: {}", quote(text)), self.line, self.column)
    }
}

fn is_trivia(lexeme: &str) -> bool {
    lexeme.starts_with("//") || lexeme.starts_with("/*") || lexeme.trim().is_empty()
}

/// Splits schema source into identifier and punctuation tokens, dropping
/// whitespace and comments. The last token is always an empty EOF marker.
pub fn tokenize_schema(text: &str) -> Result<Vec<Token>, StructError> {
    let mut tokens = Vec::new();
    let mut pos = Position { line: 1, column: 1 };
    let mut cursor = 0;

    for lexeme in TOKEN_REGEX.find_iter(text) {
        if lexeme.start() != cursor {
            return Err(pos.unexpected(&text[cursor..lexeme.start()]));
        }
        if !is_trivia(lexeme.as_str()) {
            tokens.push(Token { text: lexeme.as_str().to_string(), line: pos.line, column: pos.column });
        }
        pos.advance(lexeme.as_str());
        cursor = lexeme.end();
    }

    if cursor != text.len() {
        return Err(pos.unexpected(&text[cursor..]));
    }

    tokens.push(Token { text: String::new(), line: pos.line, column: pos.column });
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_simple() {
        let input = "mutable int32 x;";
        let expected = vec![
            Token { text: "mutable".into(), line: 1, column: 1 },
            Token { text: "int32".into(),   line: 1, column: 9 },
            Token { text: "x".into(),       line: 1, column: 15 },
            Token { text: ";".into(),       line: 1, column: 16 },
            Token { text: "".into(),        line: 1, column: 17 },
        ];
        let got = tokenize_schema(input).unwrap();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_tokenize_struct_header() {
        let input = "struct Point packed {\n}";
        let expected = vec![
            Token { text: "struct".into(), line: 1, column: 1 },
            Token { text: "Point".into(),  line: 1, column: 8 },
            Token { text: "packed".into(), line: 1, column: 14 },
            Token { text: "{".into(),      line: 1, column: 21 },
            Token { text: "}".into(),      line: 2, column: 1 },
            Token { text: "".into(),       line: 2, column: 2 },
        ];
        let got = tokenize_schema(input).unwrap();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_tokenize_skips_comments() {
        let input = "// line comment\n/* block\n comment */ bool b;";
        let texts: Vec<String> = tokenize_schema(input)
            .unwrap()
            .into_iter()
            .map(|t| t.text)
            .collect();
        assert_eq!(texts, vec!["bool", "b", ";", ""]);
    }

    #[test]
    fn test_tokenize_unexpected_text() {
        let input = "int32 x = 10;";
        let err = tokenize_schema(input).unwrap_err();
        assert!(
            matches!(err, StructError::ParseError { line: 1, column: 9, .. }),
            "expected a ParseError but got {:?}",
            err
        );
    }
}
