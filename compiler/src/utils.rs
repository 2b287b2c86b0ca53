use crate::error::StructError;

pub fn quote(text: &str) -> String {
    format!("{:?}", text)
}

pub fn error(msg: &str, line: usize, column: usize) -> StructError {
    StructError::ParseError {
        msg: msg.to_string(),
        line,
        column,
    }
}
