use serde::Serialize;

/// A parsed schema file, before verification and lowering into IR.
#[derive(Debug, PartialEq, Serialize)]
pub struct Schema {
    pub definitions: Vec<Definition>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDecl {
    pub name:        String,
    pub line:        usize,
    pub column:      usize,
    pub type_:       String,
    pub is_mutable:  bool,
    pub is_repeated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Definition {
    pub name:      String,
    pub line:      usize,
    pub column:    usize,
    pub is_packed: bool,
    pub fields:    Vec<FieldDecl>,
}
