/// All lexemes of the stencil language.
#[derive(Clone, Debug, PartialEq)]
pub enum Lexeme {
    // Keywords
    Stencil,
    With,
    Computation,
    Interval,
    If,
    Else,
    And,
    Or,
    Not,
    None,
    True,
    False,
    FieldTy,

    // Symbols
    LParen,     // (
    RParen,     // )
    LBrace,     // {
    RBrace,     // }
    LBracket,   // [
    RBracket,   // ]
    Comma,      // ,
    Colon,      // :
    Semicolon,  // ;
    Ellipsis,   // ...
    Eq,         // =
    EqEq,       // ==
    NotEq,      // !=
    Lt,         // <
    LtEq,       // <=
    Gt,         // >
    GtEq,       // >=
    Plus,       // +
    Minus,      // -
    Star,       // *
    StarStar,   // **
    Slash,      // /

    // Literals
    Integer(u64),
    Float(f64),
    Ident(String),

    // End of file
    Eof,
}

impl Lexeme {
    /// Try to match an identifier string to a keyword lexeme.
    pub fn from_keyword(s: &str) -> Option<Lexeme> {
        match s {
            "stencil" => Some(Lexeme::Stencil),
            "with" => Some(Lexeme::With),
            "computation" => Some(Lexeme::Computation),
            "interval" => Some(Lexeme::Interval),
            "if" => Some(Lexeme::If),
            "else" => Some(Lexeme::Else),
            "and" => Some(Lexeme::And),
            "or" => Some(Lexeme::Or),
            "not" => Some(Lexeme::Not),
            "None" => Some(Lexeme::None),
            "true" | "True" => Some(Lexeme::True),
            "false" | "False" => Some(Lexeme::False),
            "Field" => Some(Lexeme::FieldTy),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Lexeme::Stencil => "'stencil'",
            Lexeme::With => "'with'",
            Lexeme::Computation => "'computation'",
            Lexeme::Interval => "'interval'",
            Lexeme::If => "'if'",
            Lexeme::Else => "'else'",
            Lexeme::And => "'and'",
            Lexeme::Or => "'or'",
            Lexeme::Not => "'not'",
            Lexeme::None => "'None'",
            Lexeme::True => "'true'",
            Lexeme::False => "'false'",
            Lexeme::FieldTy => "'Field'",
            Lexeme::LParen => "'('",
            Lexeme::RParen => "')'",
            Lexeme::LBrace => "'{'",
            Lexeme::RBrace => "'}'",
            Lexeme::LBracket => "'['",
            Lexeme::RBracket => "']'",
            Lexeme::Comma => "','",
            Lexeme::Colon => "':'",
            Lexeme::Semicolon => "';'",
            Lexeme::Ellipsis => "'...'",
            Lexeme::Eq => "'='",
            Lexeme::EqEq => "'=='",
            Lexeme::NotEq => "'!='",
            Lexeme::Lt => "'<'",
            Lexeme::LtEq => "'<='",
            Lexeme::Gt => "'>'",
            Lexeme::GtEq => "'>='",
            Lexeme::Plus => "'+'",
            Lexeme::Minus => "'-'",
            Lexeme::Star => "'*'",
            Lexeme::StarStar => "'**'",
            Lexeme::Slash => "'/'",
            Lexeme::Integer(_) => "integer literal",
            Lexeme::Float(_) => "float literal",
            Lexeme::Ident(_) => "identifier",
            Lexeme::Eof => "end of file",
        }
    }
}
