use super::error::ScriptError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Str(String),
    Template(Vec<TemplatePart>),
    Regex { pattern: String, flags: String },
    Ident(String),
    Keyword(Keyword),
    Punct(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Text(String),
    /// Raw source of a `${...}` substitution, parsed separately.
    Expr(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Var,
    Let,
    Const,
    Function,
    Return,
    If,
    Else,
    While,
    Do,
    For,
    Break,
    Continue,
    True,
    False,
    Null,
    Undefined,
    Typeof,
    New,
    Throw,
    Try,
    Catch,
    Finally,
    Switch,
    Case,
    Default,
    In,
    This,
}

impl Keyword {
    fn from_ident(ident: &str) -> Option<Self> {
        let kw = match ident {
            "var" => Keyword::Var,
            "let" => Keyword::Let,
            "const" => Keyword::Const,
            "function" => Keyword::Function,
            "return" => Keyword::Return,
            "if" => Keyword::If,
            "else" => Keyword::Else,
            "while" => Keyword::While,
            "do" => Keyword::Do,
            "for" => Keyword::For,
            "break" => Keyword::Break,
            "continue" => Keyword::Continue,
            "true" => Keyword::True,
            "false" => Keyword::False,
            "null" => Keyword::Null,
            "undefined" => Keyword::Undefined,
            "typeof" => Keyword::Typeof,
            "new" => Keyword::New,
            "throw" => Keyword::Throw,
            "try" => Keyword::Try,
            "catch" => Keyword::Catch,
            "finally" => Keyword::Finally,
            "switch" => Keyword::Switch,
            "case" => Keyword::Case,
            "default" => Keyword::Default,
            "in" => Keyword::In,
            "this" => Keyword::This,
            _ => return None,
        };
        Some(kw)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    /// A line terminator appeared between the previous token and this one.
    pub newline_before: bool,
}

// Longest punctuators first so that greedy matching works.
const PUNCTUATORS: &[&str] = &[
    "...", "===", "!==", "**=", "=>", "==", "!=", "<=", ">=", "&&", "||", "??", "++", "--", "+=",
    "-=", "*=", "/=", "%=", "**", "{", "}", "(", ")", "[", "]", ";", ",", "<", ">", "+", "-", "*",
    "/", "%", "!", "=", "?", ":", ".",
];

pub struct Lexer<'a> {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    source: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            source,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, ScriptError> {
        let mut tokens: Vec<Token> = Vec::new();
        loop {
            let newline_before = self.skip_trivia()?;
            let line = self.line;
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    line,
                    newline_before: true,
                });
                break;
            };

            let kind = if c.is_ascii_digit()
                || (c == '.' && self.peek_at(1).is_some_and(|n| n.is_ascii_digit()))
            {
                self.number()?
            } else if c == '"' || c == '\'' {
                self.string(c)?
            } else if c == '`' {
                self.template()?
            } else if is_ident_start(c) {
                let ident = self.identifier();
                match Keyword::from_ident(&ident) {
                    Some(kw) => TokenKind::Keyword(kw),
                    None => TokenKind::Ident(ident),
                }
            } else if c == '/' && regex_allowed(tokens.last()) {
                self.regex()?
            } else {
                self.punctuator()?
            };

            tokens.push(Token {
                kind,
                line,
                newline_before,
            });
        }
        tracing::trace!(
            tokens = tokens.len(),
            bytes = self.source.len(),
            "Tokenized script"
        );
        Ok(tokens)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl std::fmt::Display) -> ScriptError {
        ScriptError::Syntax(format!("{} (line {})", message, self.line))
    }

    /// Skips whitespace and comments, reporting whether a line break was crossed.
    fn skip_trivia(&mut self) -> Result<bool, ScriptError> {
        let mut newline = false;
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some('\n'), _) => {
                    newline = true;
                    self.bump();
                }
                (Some(c), _) if c.is_whitespace() => {
                    self.bump();
                }
                (Some('/'), Some('/')) => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                (Some('/'), Some('*')) => {
                    self.bump();
                    self.bump();
                    loop {
                        match (self.peek(), self.peek_at(1)) {
                            (Some('*'), Some('/')) => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            (Some(c), _) => {
                                if c == '\n' {
                                    newline = true;
                                }
                                self.bump();
                            }
                            (None, _) => return Err(self.error("Unterminated comment")),
                        }
                    }
                }
                _ => return Ok(newline),
            }
        }
    }

    fn number(&mut self) -> Result<TokenKind, ScriptError> {
        let start = self.pos;
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X')) {
            self.bump();
            self.bump();
            let digits_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.bump();
            }
            let digits: String = self.chars[digits_start..self.pos].iter().collect();
            return u64::from_str_radix(&digits, 16)
                .map(|n| TokenKind::Number(n as f64))
                .map_err(|_| self.error("Invalid hexadecimal literal"));
        }

        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some('.') {
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let sign_offset = usize::from(matches!(self.peek_at(1), Some('+') | Some('-')));
            if self
                .peek_at(1 + sign_offset)
                .is_some_and(|c| c.is_ascii_digit())
            {
                for _ in 0..=sign_offset {
                    self.bump();
                }
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.bump();
                }
            }
        }
        if self.peek().is_some_and(is_ident_start) {
            return Err(self.error("Invalid or unexpected token"));
        }

        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| self.error(format!("Invalid number literal '{}'", text)))
    }

    fn escape(&mut self) -> Result<char, ScriptError> {
        let c = self
            .bump()
            .ok_or_else(|| self.error("Invalid or unexpected token"))?;
        let escaped = match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'v' => '\u{b}',
            '0' => '\0',
            'u' => {
                let hex: String = (0..4).filter_map(|_| self.bump()).collect();
                u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| self.error("Invalid Unicode escape sequence"))?
            }
            other => other,
        };
        Ok(escaped)
    }

    fn string(&mut self, quote: char) -> Result<TokenKind, ScriptError> {
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(TokenKind::Str(value)),
                Some('\\') => {
                    if self.peek() == Some('\n') {
                        self.bump();
                        continue;
                    }
                    value.push(self.escape()?);
                }
                Some('\n') | None => return Err(self.error("Invalid or unexpected token")),
                Some(c) => value.push(c),
            }
        }
    }

    fn template(&mut self) -> Result<TokenKind, ScriptError> {
        self.bump();
        let mut parts = Vec::new();
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('`') => break,
                Some('\\') => text.push(self.escape()?),
                Some('$') if self.peek() == Some('{') => {
                    self.bump();
                    if !text.is_empty() {
                        parts.push(TemplatePart::Text(std::mem::take(&mut text)));
                    }
                    let mut depth = 1usize;
                    let mut expr = String::new();
                    loop {
                        let c = self
                            .bump()
                            .ok_or_else(|| self.error("Unterminated template literal"))?;
                        match c {
                            '{' => depth += 1,
                            '}' => {
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                            }
                            _ => {}
                        }
                        expr.push(c);
                    }
                    parts.push(TemplatePart::Expr(expr));
                }
                Some(c) => text.push(c),
                None => return Err(self.error("Unterminated template literal")),
            }
        }
        if !text.is_empty() || parts.is_empty() {
            parts.push(TemplatePart::Text(text));
        }
        Ok(TokenKind::Template(parts))
    }

    fn identifier(&mut self) -> String {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_part) {
            self.bump();
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn regex(&mut self) -> Result<TokenKind, ScriptError> {
        self.bump();
        let mut pattern = String::new();
        let mut in_class = false;
        loop {
            match self.bump() {
                Some('\\') => {
                    pattern.push('\\');
                    if let Some(c) = self.bump() {
                        pattern.push(c);
                    }
                }
                Some('[') => {
                    in_class = true;
                    pattern.push('[');
                }
                Some(']') => {
                    in_class = false;
                    pattern.push(']');
                }
                Some('/') if !in_class => break,
                Some('\n') | None => {
                    return Err(self.error("Invalid regular expression: missing /"))
                }
                Some(c) => pattern.push(c),
            }
        }
        let flags = self.identifier();
        if let Some(flag) = flags.chars().find(|f| !matches!(f, 'g' | 'i' | 'm' | 's' | 'u')) {
            return Err(self.error(format!("Invalid regular expression flags '{}'", flag)));
        }
        Ok(TokenKind::Regex { pattern, flags })
    }

    fn punctuator(&mut self) -> Result<TokenKind, ScriptError> {
        for punct in PUNCTUATORS {
            let matches = punct
                .chars()
                .enumerate()
                .all(|(i, c)| self.peek_at(i) == Some(c));
            if matches {
                for _ in 0..punct.chars().count() {
                    self.bump();
                }
                return Ok(TokenKind::Punct(punct));
            }
        }
        let c = self.peek().unwrap_or(' ');
        Err(self.error(format!("Invalid or unexpected token '{}'", c)))
    }
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c == '$' || c.is_alphabetic()
}

fn is_ident_part(c: char) -> bool {
    is_ident_start(c) || c.is_alphanumeric()
}

/// A `/` starts a regular expression unless it follows something that ends an operand.
fn regex_allowed(previous: Option<&Token>) -> bool {
    match previous.map(|t| &t.kind) {
        None => true,
        Some(TokenKind::Number(_))
        | Some(TokenKind::Str(_))
        | Some(TokenKind::Template(_))
        | Some(TokenKind::Regex { .. })
        | Some(TokenKind::Ident(_)) => false,
        Some(TokenKind::Keyword(kw)) => !matches!(
            kw,
            Keyword::True | Keyword::False | Keyword::Null | Keyword::Undefined | Keyword::This
        ),
        Some(TokenKind::Punct(p)) => !matches!(*p, ")" | "]" | "}"),
        Some(TokenKind::Eof) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_numbers_and_punctuators() {
        assert_eq!(
            kinds("x === 3.5e1;"),
            vec![
                TokenKind::Ident("x".into()),
                TokenKind::Punct("==="),
                TokenKind::Number(35.0),
                TokenKind::Punct(";"),
                TokenKind::Eof,
            ]
        );
        assert_eq!(kinds("0xff")[0], TokenKind::Number(255.0));
    }

    #[test]
    fn test_division_versus_regex() {
        let tokens = kinds("a / 2; s.replace(/\\s+/g, '')");
        assert_eq!(tokens[1], TokenKind::Punct("/"));
        assert!(tokens.contains(&TokenKind::Regex {
            pattern: "\\s+".into(),
            flags: "g".into()
        }));
    }

    #[test]
    fn test_comments_mark_newlines() {
        let tokens = Lexer::new("a /* x\n y */ b // tail\nc").tokenize().unwrap();
        assert!(!tokens[0].newline_before);
        assert!(tokens[1].newline_before);
        assert!(tokens[2].newline_before);
        assert_eq!(tokens[2].line, 3);
    }

    #[test]
    fn test_spread_and_new_keywords() {
        assert_eq!(
            kinds("f(...xs) in this")[1..],
            [
                TokenKind::Punct("("),
                TokenKind::Punct("..."),
                TokenKind::Ident("xs".into()),
                TokenKind::Punct(")"),
                TokenKind::Keyword(Keyword::In),
                TokenKind::Keyword(Keyword::This),
                TokenKind::Eof,
            ]
        );
        assert_eq!(kinds("this / 2")[1], TokenKind::Punct("/"));
    }

    #[test]
    fn test_template_parts() {
        assert_eq!(
            kinds("`a${b + 1}c`")[0],
            TokenKind::Template(vec![
                TemplatePart::Text("a".into()),
                TemplatePart::Expr("b + 1".into()),
                TemplatePart::Text("c".into()),
            ])
        );
    }

    #[test]
    fn test_unterminated_string_is_syntax_error() {
        let err = Lexer::new("'abc").tokenize().unwrap_err();
        assert!(matches!(err, ScriptError::Syntax(_)));
    }
}
