use crate::{
    tokenizer::Token,
    types::{Definition, FieldDecl, Schema},
    utils::{error, quote},
    error::StructError,
};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref IDENTIFIER:       Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
    static ref SEMICOLON:        Regex = Regex::new(r"^;$").unwrap();
    static ref LEFT_BRACE:       Regex = Regex::new(r"^\{$").unwrap();
    static ref RIGHT_BRACE:      Regex = Regex::new(r"^\}$").unwrap();
    static ref STRUCT_KEYWORD:   Regex = Regex::new(r"^struct$").unwrap();
    static ref PACKED_KEYWORD:   Regex = Regex::new(r"^packed$").unwrap();
    static ref MUTABLE_KEYWORD:  Regex = Regex::new(r"^mutable$").unwrap();
    static ref REPEATED_KEYWORD: Regex = Regex::new(r"^repeated$").unwrap();
    static ref EOF:              Regex = Regex::new(r"^$").unwrap();
}

/// Parses the token stream of a schema file into struct definitions.
///
/// ```text
/// struct <Name> [packed] {
///     [mutable] [repeated] <type> <name>;
/// }
/// ```
pub fn parse_schema(tokens: &[Token]) -> Result<Schema, StructError> {
    let mut definitions = Vec::new();
    let mut index       = 0;

    if tokens.is_empty() {
        return Ok(Schema { definitions });
    }

    // Past the end we keep looking at the EOF marker
    fn current_token(tokens: &[Token], index: usize) -> &Token {
        &tokens[index.min(tokens.len() - 1)]
    }

    fn eat(tokens: &[Token], index: &mut usize, test: &Regex) -> bool {
        if test.is_match(&current_token(tokens, *index).text) {
            *index += 1;
            true
        } else {
            false
        }
    }

    fn expect(tokens: &[Token], index: &mut usize, test: &Regex, expected: &str) -> Result<(), StructError> {
        if !eat(tokens, index, test) {
            let tok = current_token(tokens, *index);
            let found = if tok.text.is_empty() { "end of file".to_string() } else { quote(&tok.text) };
            return Err(error(
                &format!("Expected {} but found {}", expected, found),
                tok.line,
                tok.column,
            ));
        }
        Ok(())
    }

    fn unexpected_token(tokens: &[Token], index: usize) -> StructError {
        let tok = current_token(tokens, index);
        error(
            &format!("Unexpected token {}", quote(&tok.text)),
            tok.line,
            tok.column,
        )
    }

    // Parse definitions one by one
    while index < tokens.len() && !eat(tokens, &mut index, &EOF) {
        if !eat(tokens, &mut index, &STRUCT_KEYWORD) {
            return Err(unexpected_token(tokens, index));
        }

        // Definition name
        let name_tok = current_token(tokens, index);
        expect(tokens, &mut index, &IDENTIFIER, "identifier")?;
        let is_packed = eat(tokens, &mut index, &PACKED_KEYWORD);
        expect(tokens, &mut index, &LEFT_BRACE, "\"{\"")?;

        // Collect fields
        let mut fields = Vec::new();
        while !eat(tokens, &mut index, &RIGHT_BRACE) {
            let mut is_mutable  = false;
            let mut is_repeated = false;

            // Modifiers may come in either order, each at most once
            loop {
                let tok = current_token(tokens, index);
                if eat(tokens, &mut index, &MUTABLE_KEYWORD) {
                    if is_mutable {
                        return Err(error("Duplicate \"mutable\" modifier", tok.line, tok.column));
                    }
                    is_mutable = true;
                } else if eat(tokens, &mut index, &REPEATED_KEYWORD) {
                    if is_repeated {
                        return Err(error("Duplicate \"repeated\" modifier", tok.line, tok.column));
                    }
                    is_repeated = true;
                } else {
                    break;
                }
            }

            // Read the type token
            let t_tok = current_token(tokens, index);
            expect(tokens, &mut index, &IDENTIFIER, "type name")?;

            // Field name
            let f_tok = current_token(tokens, index);
            expect(tokens, &mut index, &IDENTIFIER, "field name")?;
            expect(tokens, &mut index, &SEMICOLON, "\";\"")?;

            fields.push(FieldDecl {
                name:   f_tok.text.clone(),
                line:   f_tok.line,
                column: f_tok.column,
                type_:  t_tok.text.clone(),
                is_mutable,
                is_repeated,
            });
        }

        definitions.push(Definition {
            name:   name_tok.text.clone(),
            line:   name_tok.line,
            column: name_tok.column,
            is_packed,
            fields,
        });
    }

    Ok(Schema { definitions })
}
