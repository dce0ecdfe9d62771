use std::rc::Rc;

use super::ast::{
    BinaryOp, CatchClause, DeclKind, Expr, FunctionBody, FunctionDef, Iteration, ListItem,
    LogicalOp, ObjectProp, Param, Pattern, PatternElement, PatternProperty, Stmt, SwitchCase,
    TemplateSegment, UnaryOp,
};
use super::error::ScriptError;
use super::lexer::{Keyword, Lexer, TemplatePart, Token, TokenKind};

const MAX_NESTING: usize = 128;

/// Parses a complete program into its top-level statements.
pub fn parse_program(source: &str) -> Result<Vec<Stmt>, ScriptError> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser::new(tokens);
    let mut body = Vec::new();
    while !parser.at_eof() {
        body.push(parser.statement()?);
    }
    Ok(body)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    // ---- token helpers -------------------------------------------------

    fn current(&self) -> &Token {
        // The lexer always terminates the stream with Eof.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self, offset: usize) -> &TokenKind {
        let index = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[index].kind
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at_eof(&self) -> bool {
        matches!(self.current().kind, TokenKind::Eof)
    }

    fn is_punct(&self, punct: &str) -> bool {
        matches!(&self.current().kind, TokenKind::Punct(p) if *p == punct)
    }

    fn is_keyword(&self, keyword: Keyword) -> bool {
        matches!(&self.current().kind, TokenKind::Keyword(k) if *k == keyword)
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if self.is_punct(punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: &str) -> Result<(), ScriptError> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn expect_ident(&mut self) -> Result<String, ScriptError> {
        match &self.current().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn unexpected(&self) -> ScriptError {
        let token = self.current();
        let shown = match &token.kind {
            TokenKind::Eof => return ScriptError::Syntax("Unexpected end of input".to_string()),
            TokenKind::Number(n) => super::value::format_number(*n),
            TokenKind::Str(s) => format!("string '{}'", s),
            TokenKind::Template(_) => "template string".to_string(),
            TokenKind::Regex { pattern, .. } => format!("/{}/", pattern),
            TokenKind::Ident(name) => format!("identifier '{}'", name),
            TokenKind::Keyword(k) => format!("'{}'", keyword_text(*k)),
            TokenKind::Punct(p) => format!("'{}'", p),
        };
        ScriptError::Syntax(format!("Unexpected token {} (line {})", shown, token.line))
    }

    /// Automatic semicolon insertion: accept `;`, a line break, `}` or end of input.
    fn consume_semicolon(&mut self) -> Result<(), ScriptError> {
        if self.eat_punct(";") {
            return Ok(());
        }
        if self.is_punct("}") || self.at_eof() || self.current().newline_before {
            return Ok(());
        }
        Err(self.unexpected())
    }

    fn enter(&mut self) -> Result<(), ScriptError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(ScriptError::Syntax(
                "Program is nested too deeply".to_string(),
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // ---- statements ----------------------------------------------------

    fn statement(&mut self) -> Result<Stmt, ScriptError> {
        self.enter()?;
        let result = self.statement_inner();
        self.leave();
        result
    }

    fn statement_inner(&mut self) -> Result<Stmt, ScriptError> {
        match &self.current().kind {
            TokenKind::Punct("{") => {
                self.advance();
                Ok(Stmt::Block(self.block_body()?))
            }
            TokenKind::Punct(";") => {
                self.advance();
                Ok(Stmt::Empty)
            }
            TokenKind::Keyword(Keyword::Var)
            | TokenKind::Keyword(Keyword::Let)
            | TokenKind::Keyword(Keyword::Const) => {
                let decl = self.declaration()?;
                self.consume_semicolon()?;
                Ok(decl)
            }
            TokenKind::Keyword(Keyword::Function) => {
                self.advance();
                let name = self.expect_ident()?;
                let def = self.function_rest(Some(name))?;
                Ok(Stmt::Function(def))
            }
            TokenKind::Keyword(Keyword::If) => {
                self.advance();
                self.expect_punct("(")?;
                let test = self.expression()?;
                self.expect_punct(")")?;
                let consequent = Box::new(self.statement()?);
                let alternate = if self.is_keyword(Keyword::Else) {
                    self.advance();
                    Some(Box::new(self.statement()?))
                } else {
                    None
                };
                Ok(Stmt::If {
                    test,
                    consequent,
                    alternate,
                })
            }
            TokenKind::Keyword(Keyword::While) => {
                self.advance();
                self.expect_punct("(")?;
                let test = self.expression()?;
                self.expect_punct(")")?;
                let body = Box::new(self.statement()?);
                Ok(Stmt::While { test, body })
            }
            TokenKind::Keyword(Keyword::Do) => {
                self.advance();
                let body = Box::new(self.statement()?);
                if !self.is_keyword(Keyword::While) {
                    return Err(self.unexpected());
                }
                self.advance();
                self.expect_punct("(")?;
                let test = self.expression()?;
                self.expect_punct(")")?;
                self.eat_punct(";");
                Ok(Stmt::DoWhile { body, test })
            }
            TokenKind::Keyword(Keyword::For) => self.for_statement(),
            TokenKind::Keyword(Keyword::Try) => self.try_statement(),
            TokenKind::Keyword(Keyword::Switch) => self.switch_statement(),
            TokenKind::Keyword(Keyword::Return) => {
                self.advance();
                let argument = if self.is_punct(";")
                    || self.is_punct("}")
                    || self.at_eof()
                    || self.current().newline_before
                {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.consume_semicolon()?;
                Ok(Stmt::Return(argument))
            }
            TokenKind::Keyword(Keyword::Throw) => {
                self.advance();
                if self.current().newline_before {
                    return Err(ScriptError::Syntax(
                        "Illegal newline after throw".to_string(),
                    ));
                }
                let argument = self.expression()?;
                self.consume_semicolon()?;
                Ok(Stmt::Throw(argument))
            }
            TokenKind::Keyword(Keyword::Break) => {
                self.advance();
                self.consume_semicolon()?;
                Ok(Stmt::Break)
            }
            TokenKind::Keyword(Keyword::Continue) => {
                self.advance();
                self.consume_semicolon()?;
                Ok(Stmt::Continue)
            }
            _ => {
                let expr = self.expression()?;
                self.consume_semicolon()?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    /// Statements up to the closing `}` (the opening brace is already consumed).
    fn block_body(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        let mut body = Vec::new();
        while !self.is_punct("}") {
            if self.at_eof() {
                return Err(self.unexpected());
            }
            body.push(self.statement()?);
        }
        self.advance();
        Ok(body)
    }

    fn decl_kind(&mut self) -> Result<DeclKind, ScriptError> {
        let kind = match self.current().kind {
            TokenKind::Keyword(Keyword::Var) => DeclKind::Var,
            TokenKind::Keyword(Keyword::Let) => DeclKind::Let,
            TokenKind::Keyword(Keyword::Const) => DeclKind::Const,
            _ => return Err(self.unexpected()),
        };
        self.advance();
        Ok(kind)
    }

    fn declaration(&mut self) -> Result<Stmt, ScriptError> {
        let kind = self.decl_kind()?;
        let mut declarations = Vec::new();
        loop {
            let target = self.binding_pattern()?;
            let init = if self.eat_punct("=") {
                Some(self.assignment()?)
            } else if kind == DeclKind::Const {
                return Err(ScriptError::Syntax(
                    "Missing initializer in const declaration".to_string(),
                ));
            } else if !matches!(target, Pattern::Ident(_)) {
                return Err(ScriptError::Syntax(
                    "Missing initializer in destructuring declaration".to_string(),
                ));
            } else {
                None
            };
            declarations.push((target, init));
            if !self.eat_punct(",") {
                break;
            }
        }
        Ok(Stmt::Decl { kind, declarations })
    }

    fn for_statement(&mut self) -> Result<Stmt, ScriptError> {
        self.advance();
        self.expect_punct("(")?;

        let start = self.pos;
        let is_decl = matches!(
            self.current().kind,
            TokenKind::Keyword(Keyword::Var)
                | TokenKind::Keyword(Keyword::Let)
                | TokenKind::Keyword(Keyword::Const)
        );
        let kind = if is_decl {
            Some(self.decl_kind()?)
        } else {
            None
        };
        let target = if kind.is_some() {
            Some(self.binding_pattern()?)
        } else if let TokenKind::Ident(name) = &self.current().kind {
            let target = Pattern::Ident(name.clone());
            self.advance();
            Some(target)
        } else {
            None
        };
        let iteration = match &self.current().kind {
            TokenKind::Ident(of) if of == "of" => Some(Iteration::Of),
            TokenKind::Keyword(Keyword::In) => Some(Iteration::In),
            _ => None,
        };
        if let (Some(target), Some(iteration)) = (target, iteration) {
            self.advance();
            let iterable = match iteration {
                Iteration::Of => self.assignment()?,
                Iteration::In => self.expression()?,
            };
            self.expect_punct(")")?;
            let body = Box::new(self.statement()?);
            return Ok(Stmt::ForEach {
                iteration,
                kind,
                target,
                iterable,
                body,
            });
        }
        self.pos = start;

        let init = if self.is_punct(";") {
            None
        } else if is_decl {
            Some(Box::new(self.declaration()?))
        } else {
            Some(Box::new(Stmt::Expr(self.expression()?)))
        };
        self.expect_punct(";")?;
        let test = if self.is_punct(";") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_punct(";")?;
        let update = if self.is_punct(")") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_punct(")")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::For {
            init,
            test,
            update,
            body,
        })
    }

    fn try_statement(&mut self) -> Result<Stmt, ScriptError> {
        self.advance();
        self.expect_punct("{")?;
        let block = self.block_body()?;
        let handler = if self.is_keyword(Keyword::Catch) {
            self.advance();
            let param = if self.eat_punct("(") {
                let param = self.binding_pattern()?;
                self.expect_punct(")")?;
                Some(param)
            } else {
                None
            };
            self.expect_punct("{")?;
            Some(CatchClause {
                param,
                body: self.block_body()?,
            })
        } else {
            None
        };
        let finalizer = if self.is_keyword(Keyword::Finally) {
            self.advance();
            self.expect_punct("{")?;
            Some(self.block_body()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(ScriptError::Syntax(
                "Missing catch or finally after try".to_string(),
            ));
        }
        Ok(Stmt::Try {
            block,
            handler,
            finalizer,
        })
    }

    fn switch_statement(&mut self) -> Result<Stmt, ScriptError> {
        self.advance();
        self.expect_punct("(")?;
        let discriminant = self.expression()?;
        self.expect_punct(")")?;
        self.expect_punct("{")?;
        let mut cases: Vec<SwitchCase> = Vec::new();
        while !self.eat_punct("}") {
            let test = if self.is_keyword(Keyword::Case) {
                self.advance();
                Some(self.expression()?)
            } else if self.is_keyword(Keyword::Default) {
                self.advance();
                if cases.iter().any(|case| case.test.is_none()) {
                    return Err(ScriptError::Syntax(
                        "More than one default clause in switch statement".to_string(),
                    ));
                }
                None
            } else {
                return Err(self.unexpected());
            };
            self.expect_punct(":")?;
            let mut body = Vec::new();
            while !(self.is_keyword(Keyword::Case)
                || self.is_keyword(Keyword::Default)
                || self.is_punct("}"))
            {
                if self.at_eof() {
                    return Err(self.unexpected());
                }
                body.push(self.statement()?);
            }
            cases.push(SwitchCase { test, body });
        }
        Ok(Stmt::Switch {
            discriminant,
            cases,
        })
    }

    /// Parameter list and body after `function name`.
    fn function_rest(&mut self, name: Option<String>) -> Result<Rc<FunctionDef>, ScriptError> {
        self.expect_punct("(")?;
        let (params, rest) = self.params()?;
        self.expect_punct("{")?;
        let body = FunctionBody::Block(self.block_body()?);
        Ok(Rc::new(FunctionDef {
            name,
            params,
            rest,
            body,
            is_arrow: false,
        }))
    }

    /// Parameters up to and including the closing `)`.
    fn params(&mut self) -> Result<(Vec<Param>, Option<Pattern>), ScriptError> {
        let mut params = Vec::new();
        while !self.eat_punct(")") {
            if self.eat_punct("...") {
                let rest = self.binding_pattern()?;
                self.expect_punct(")")?;
                return Ok((params, Some(rest)));
            }
            let target = self.binding_pattern()?;
            let default = self.pattern_default()?;
            params.push(Param { target, default });
            if !self.is_punct(")") {
                self.expect_punct(",")?;
            }
        }
        Ok((params, None))
    }

    /// Target of a declaration, parameter or catch clause.
    fn binding_pattern(&mut self) -> Result<Pattern, ScriptError> {
        self.enter()?;
        let result = self.binding_pattern_inner();
        self.leave();
        result
    }

    fn binding_pattern_inner(&mut self) -> Result<Pattern, ScriptError> {
        if self.eat_punct("[") {
            let mut elements = Vec::new();
            let mut rest = None;
            while !self.eat_punct("]") {
                if self.eat_punct(",") {
                    elements.push(None);
                    continue;
                }
                if self.eat_punct("...") {
                    rest = Some(Box::new(self.binding_pattern()?));
                    self.expect_punct("]")?;
                    break;
                }
                let target = self.binding_pattern()?;
                let default = self.pattern_default()?;
                elements.push(Some(PatternElement { target, default }));
                if !self.is_punct("]") {
                    self.expect_punct(",")?;
                }
            }
            return Ok(Pattern::Array { elements, rest });
        }

        if self.eat_punct("{") {
            let mut properties = Vec::new();
            let mut rest = None;
            while !self.eat_punct("}") {
                if self.eat_punct("...") {
                    rest = Some(self.expect_ident()?);
                    self.expect_punct("}")?;
                    break;
                }
                let shorthand = matches!(self.current().kind, TokenKind::Ident(_));
                let key = self.property_key()?;
                let target = if self.eat_punct(":") {
                    self.binding_pattern()?
                } else if shorthand {
                    Pattern::Ident(key.clone())
                } else {
                    return Err(self.unexpected());
                };
                let default = self.pattern_default()?;
                properties.push(PatternProperty {
                    key,
                    target,
                    default,
                });
                if !self.is_punct("}") {
                    self.expect_punct(",")?;
                }
            }
            return Ok(Pattern::Object { properties, rest });
        }

        Ok(Pattern::Ident(self.expect_ident()?))
    }

    fn pattern_default(&mut self) -> Result<Option<Expr>, ScriptError> {
        if self.eat_punct("=") {
            Ok(Some(self.assignment()?))
        } else {
            Ok(None)
        }
    }

    fn property_key(&mut self) -> Result<String, ScriptError> {
        let key = match &self.current().kind {
            TokenKind::Ident(name) => name.clone(),
            TokenKind::Str(s) => s.clone(),
            TokenKind::Number(n) => super::value::format_number(*n),
            TokenKind::Keyword(k) => keyword_text(*k).to_string(),
            _ => return Err(self.unexpected()),
        };
        self.advance();
        Ok(key)
    }

    // ---- expressions ---------------------------------------------------

    fn expression(&mut self) -> Result<Expr, ScriptError> {
        // Comma sequences keep only the last value.
        let mut expr = self.assignment()?;
        while self.eat_punct(",") {
            expr = self.assignment()?;
        }
        Ok(expr)
    }

    fn assignment(&mut self) -> Result<Expr, ScriptError> {
        self.enter()?;
        let result = self.assignment_inner();
        self.leave();
        result
    }

    fn assignment_inner(&mut self) -> Result<Expr, ScriptError> {
        if self.arrow_ahead() {
            return self.arrow_function();
        }

        let target = self.conditional()?;
        let op = match &self.current().kind {
            TokenKind::Punct("=") => None,
            TokenKind::Punct("+=") => Some(BinaryOp::Add),
            TokenKind::Punct("-=") => Some(BinaryOp::Sub),
            TokenKind::Punct("*=") => Some(BinaryOp::Mul),
            TokenKind::Punct("/=") => Some(BinaryOp::Div),
            TokenKind::Punct("%=") => Some(BinaryOp::Rem),
            TokenKind::Punct("**=") => Some(BinaryOp::Pow),
            _ => return Ok(target),
        };
        if op.is_none() && matches!(target, Expr::Array(_) | Expr::Object(_)) {
            let pattern = assignment_pattern(target)?;
            self.advance();
            let value = self.assignment()?;
            return Ok(Expr::Destructure {
                pattern: Box::new(pattern),
                value: Box::new(value),
            });
        }
        if !matches!(
            target,
            Expr::Ident(_) | Expr::Member { .. } | Expr::Index { .. }
        ) {
            return Err(ScriptError::Syntax(
                "Invalid left-hand side in assignment".to_string(),
            ));
        }
        self.advance();
        let value = self.assignment()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    fn arrow_ahead(&self) -> bool {
        match self.peek_kind(0) {
            TokenKind::Ident(_) => matches!(self.peek_kind(1), TokenKind::Punct("=>")),
            TokenKind::Punct("(") => {
                let mut depth = 0usize;
                let mut offset = 0usize;
                loop {
                    match self.peek_kind(offset) {
                        TokenKind::Punct("(") => depth += 1,
                        TokenKind::Punct(")") => {
                            depth -= 1;
                            if depth == 0 {
                                return matches!(
                                    self.peek_kind(offset + 1),
                                    TokenKind::Punct("=>")
                                );
                            }
                        }
                        TokenKind::Eof => return false,
                        _ => {}
                    }
                    offset += 1;
                }
            }
            _ => false,
        }
    }

    fn arrow_function(&mut self) -> Result<Expr, ScriptError> {
        let (params, rest) = if self.eat_punct("(") {
            self.params()?
        } else {
            let param = Param {
                target: Pattern::Ident(self.expect_ident()?),
                default: None,
            };
            (vec![param], None)
        };
        self.expect_punct("=>")?;
        let body = if self.eat_punct("{") {
            FunctionBody::Block(self.block_body()?)
        } else {
            FunctionBody::Expr(self.assignment()?)
        };
        Ok(Expr::Function(Rc::new(FunctionDef {
            name: None,
            params,
            rest,
            body,
            is_arrow: true,
        })))
    }

    fn conditional(&mut self) -> Result<Expr, ScriptError> {
        let test = self.binary(0)?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        let consequent = self.assignment()?;
        self.expect_punct(":")?;
        let alternate = self.assignment()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    fn binary(&mut self, min_precedence: u8) -> Result<Expr, ScriptError> {
        let mut bare_unary = matches!(
            self.current().kind,
            TokenKind::Punct("!")
                | TokenKind::Punct("-")
                | TokenKind::Punct("+")
                | TokenKind::Keyword(Keyword::Typeof)
        );
        let mut left = self.unary()?;
        loop {
            let Some((precedence, op)) = self.binary_operator() else {
                break;
            };
            if precedence < min_precedence {
                break;
            }
            if bare_unary && matches!(op, Operator::Binary(BinaryOp::Pow)) {
                return Err(ScriptError::Syntax(
                    "Unary operator used immediately before exponentiation expression. \
                     Parenthesis must be used to disambiguate operator precedence"
                        .to_string(),
                ));
            }
            bare_unary = false;
            self.advance();
            // `**` is right-associative, everything else binds left.
            let next_min = if matches!(op, Operator::Binary(BinaryOp::Pow)) {
                precedence
            } else {
                precedence + 1
            };
            let right = self.binary(next_min)?;
            left = match op {
                Operator::Binary(op) => Expr::Binary(op, Box::new(left), Box::new(right)),
                Operator::Logical(op) => Expr::Logical(op, Box::new(left), Box::new(right)),
            };
        }
        Ok(left)
    }

    fn binary_operator(&self) -> Option<(u8, Operator)> {
        let p = match &self.current().kind {
            TokenKind::Keyword(Keyword::In) => return Some((5, Operator::Binary(BinaryOp::In))),
            TokenKind::Punct(p) => *p,
            _ => return None,
        };
        let entry = match p {
            "??" => (1, Operator::Logical(LogicalOp::Nullish)),
            "||" => (2, Operator::Logical(LogicalOp::Or)),
            "&&" => (3, Operator::Logical(LogicalOp::And)),
            "==" => (4, Operator::Binary(BinaryOp::LooseEq)),
            "!=" => (4, Operator::Binary(BinaryOp::LooseNotEq)),
            "===" => (4, Operator::Binary(BinaryOp::StrictEq)),
            "!==" => (4, Operator::Binary(BinaryOp::StrictNotEq)),
            "<" => (5, Operator::Binary(BinaryOp::Lt)),
            "<=" => (5, Operator::Binary(BinaryOp::LtEq)),
            ">" => (5, Operator::Binary(BinaryOp::Gt)),
            ">=" => (5, Operator::Binary(BinaryOp::GtEq)),
            "+" => (6, Operator::Binary(BinaryOp::Add)),
            "-" => (6, Operator::Binary(BinaryOp::Sub)),
            "*" => (7, Operator::Binary(BinaryOp::Mul)),
            "/" => (7, Operator::Binary(BinaryOp::Div)),
            "%" => (7, Operator::Binary(BinaryOp::Rem)),
            "**" => (8, Operator::Binary(BinaryOp::Pow)),
            _ => return None,
        };
        Some(entry)
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        self.enter()?;
        let result = self.unary_inner();
        self.leave();
        result
    }

    fn unary_inner(&mut self) -> Result<Expr, ScriptError> {
        let op = match &self.current().kind {
            TokenKind::Punct("!") => Some(UnaryOp::Not),
            TokenKind::Punct("-") => Some(UnaryOp::Neg),
            TokenKind::Punct("+") => Some(UnaryOp::Plus),
            TokenKind::Keyword(Keyword::Typeof) => Some(UnaryOp::Typeof),
            TokenKind::Punct("++") | TokenKind::Punct("--") => {
                let increment = self.is_punct("++");
                self.advance();
                let target = self.unary()?;
                check_update_target(&target)?;
                return Ok(Expr::Update {
                    increment,
                    prefix: true,
                    target: Box::new(target),
                });
            }
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.unary()?;
            return Ok(Expr::Unary(op, Box::new(operand)));
        }

        let expr = self.call_member()?;
        if (self.is_punct("++") || self.is_punct("--")) && !self.current().newline_before {
            let increment = self.is_punct("++");
            self.advance();
            check_update_target(&expr)?;
            return Ok(Expr::Update {
                increment,
                prefix: false,
                target: Box::new(expr),
            });
        }
        Ok(expr)
    }

    fn call_member(&mut self) -> Result<Expr, ScriptError> {
        let mut expr = if self.is_keyword(Keyword::New) {
            self.advance();
            let callee = self.expect_ident()?;
            let args = if self.eat_punct("(") {
                self.arguments()?
            } else {
                Vec::new()
            };
            Expr::New { callee, args }
        } else {
            self.primary()?
        };

        loop {
            if self.eat_punct(".") {
                let property = match &self.current().kind {
                    TokenKind::Ident(name) => name.clone(),
                    TokenKind::Keyword(k) => keyword_text(*k).to_string(),
                    _ => return Err(self.unexpected()),
                };
                self.advance();
                expr = Expr::Member {
                    object: Box::new(expr),
                    property,
                };
            } else if self.eat_punct("[") {
                let index = self.expression()?;
                self.expect_punct("]")?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.eat_punct("(") {
                let args = self.arguments()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    /// Call arguments up to and including the closing `)`.
    fn arguments(&mut self) -> Result<Vec<ListItem>, ScriptError> {
        let mut args = Vec::new();
        while !self.eat_punct(")") {
            args.push(self.list_item()?);
            if !self.is_punct(")") {
                self.expect_punct(",")?;
            }
        }
        Ok(args)
    }

    fn list_item(&mut self) -> Result<ListItem, ScriptError> {
        if self.eat_punct("...") {
            Ok(ListItem::Spread(self.assignment()?))
        } else {
            Ok(ListItem::Expr(self.assignment()?))
        }
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        let start = self.pos;
        let token = self.advance();
        let expr = match token.kind {
            TokenKind::Number(n) => Expr::Number(n),
            TokenKind::Str(s) => Expr::Str(Rc::from(s.as_str())),
            TokenKind::Template(parts) => template(parts)?,
            TokenKind::Regex { pattern, flags } => Expr::Regex { pattern, flags },
            TokenKind::Ident(name) => Expr::Ident(name),
            TokenKind::Keyword(Keyword::True) => Expr::Bool(true),
            TokenKind::Keyword(Keyword::False) => Expr::Bool(false),
            TokenKind::Keyword(Keyword::Null) => Expr::Null,
            TokenKind::Keyword(Keyword::Undefined) => Expr::Undefined,
            TokenKind::Keyword(Keyword::This) => Expr::This,
            TokenKind::Keyword(Keyword::Function) => {
                let name = match &self.current().kind {
                    TokenKind::Ident(name) => {
                        let name = name.clone();
                        self.advance();
                        Some(name)
                    }
                    _ => None,
                };
                Expr::Function(self.function_rest(name)?)
            }
            TokenKind::Punct("(") => {
                let inner = self.expression()?;
                self.expect_punct(")")?;
                inner
            }
            TokenKind::Punct("[") => {
                let mut elements = Vec::new();
                while !self.eat_punct("]") {
                    elements.push(self.list_item()?);
                    if !self.is_punct("]") {
                        self.expect_punct(",")?;
                    }
                }
                Expr::Array(elements)
            }
            TokenKind::Punct("{") => self.object_literal()?,
            _ => {
                self.pos = start;
                return Err(self.unexpected());
            }
        };
        Ok(expr)
    }

    fn object_literal(&mut self) -> Result<Expr, ScriptError> {
        let mut properties = Vec::new();
        while !self.eat_punct("}") {
            if self.eat_punct("...") {
                properties.push(ObjectProp::Spread(self.assignment()?));
            } else if self.eat_punct("[") {
                let key = self.assignment()?;
                self.expect_punct("]")?;
                self.expect_punct(":")?;
                properties.push(ObjectProp::Computed(key, self.assignment()?));
            } else {
                let shorthand = matches!(self.current().kind, TokenKind::Ident(_));
                let key = self.property_key()?;
                let value = if self.eat_punct(":") {
                    self.assignment()?
                } else if self.is_punct("(") {
                    // Method shorthand: `name() { ... }`.
                    Expr::Function(self.function_rest(None)?)
                } else if shorthand {
                    Expr::Ident(key.clone())
                } else {
                    return Err(self.unexpected());
                };
                properties.push(ObjectProp::Field(key, value));
            }
            if !self.is_punct("}") {
                self.expect_punct(",")?;
            }
        }
        Ok(Expr::Object(properties))
    }
}

enum Operator {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

fn check_update_target(target: &Expr) -> Result<(), ScriptError> {
    match target {
        Expr::Ident(_) | Expr::Member { .. } | Expr::Index { .. } => Ok(()),
        _ => Err(ScriptError::Syntax(
            "Invalid left-hand side expression in update operation".to_string(),
        )),
    }
}

fn invalid_destructuring() -> ScriptError {
    ScriptError::Syntax("Invalid destructuring assignment target".to_string())
}

/// Reinterprets an array or object literal on the left of `=` as a pattern.
fn assignment_pattern(expr: Expr) -> Result<Pattern, ScriptError> {
    match expr {
        Expr::Ident(name) => Ok(Pattern::Ident(name)),
        Expr::Member { .. } | Expr::Index { .. } => Ok(Pattern::Member(Box::new(expr))),
        Expr::Array(items) => {
            let count = items.len();
            let mut elements = Vec::with_capacity(count);
            let mut rest = None;
            for (index, item) in items.into_iter().enumerate() {
                match item {
                    ListItem::Spread(target) if index + 1 == count => {
                        rest = Some(Box::new(assignment_pattern(target)?));
                    }
                    ListItem::Spread(_) => return Err(invalid_destructuring()),
                    ListItem::Expr(expr) => {
                        let (target, default) = split_default(expr)?;
                        elements.push(Some(PatternElement { target, default }));
                    }
                }
            }
            Ok(Pattern::Array { elements, rest })
        }
        Expr::Object(props) => {
            let count = props.len();
            let mut properties = Vec::with_capacity(count);
            let mut rest = None;
            for (index, prop) in props.into_iter().enumerate() {
                match prop {
                    ObjectProp::Field(key, value) => {
                        let (target, default) = split_default(value)?;
                        properties.push(PatternProperty {
                            key,
                            target,
                            default,
                        });
                    }
                    ObjectProp::Spread(Expr::Ident(name)) if index + 1 == count => {
                        rest = Some(name);
                    }
                    _ => return Err(invalid_destructuring()),
                }
            }
            Ok(Pattern::Object { properties, rest })
        }
        _ => Err(invalid_destructuring()),
    }
}

/// `target = default` inside an assignment pattern.
fn split_default(expr: Expr) -> Result<(Pattern, Option<Expr>), ScriptError> {
    match expr {
        Expr::Assign {
            op: None,
            target,
            value,
        } => Ok((assignment_pattern(*target)?, Some(*value))),
        Expr::Destructure { pattern, value } => Ok((*pattern, Some(*value))),
        other => Ok((assignment_pattern(other)?, None)),
    }
}

fn template(parts: Vec<TemplatePart>) -> Result<Expr, ScriptError> {
    let mut segments = Vec::with_capacity(parts.len());
    for part in parts {
        match part {
            TemplatePart::Text(text) => segments.push(TemplateSegment::Text(text)),
            TemplatePart::Expr(source) => {
                let tokens = Lexer::new(&source).tokenize()?;
                let mut parser = Parser::new(tokens);
                let expr = parser.expression()?;
                if !parser.at_eof() {
                    return Err(parser.unexpected());
                }
                segments.push(TemplateSegment::Expr(expr));
            }
        }
    }
    Ok(Expr::Template(segments))
}

fn keyword_text(keyword: Keyword) -> &'static str {
    match keyword {
        Keyword::Var => "var",
        Keyword::Let => "let",
        Keyword::Const => "const",
        Keyword::Function => "function",
        Keyword::Return => "return",
        Keyword::If => "if",
        Keyword::Else => "else",
        Keyword::While => "while",
        Keyword::Do => "do",
        Keyword::For => "for",
        Keyword::Break => "break",
        Keyword::Continue => "continue",
        Keyword::True => "true",
        Keyword::False => "false",
        Keyword::Null => "null",
        Keyword::Undefined => "undefined",
        Keyword::Typeof => "typeof",
        Keyword::New => "new",
        Keyword::Throw => "throw",
        Keyword::Try => "try",
        Keyword::Catch => "catch",
        Keyword::Finally => "finally",
        Keyword::Switch => "switch",
        Keyword::Case => "case",
        Keyword::Default => "default",
        Keyword::In => "in",
        Keyword::This => "this",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_and_associativity() {
        let program = parse_program("1 + 2 * 3 ** 2 ** 2;").unwrap();
        let Stmt::Expr(Expr::Binary(BinaryOp::Add, _, right)) = &program[0] else {
            panic!("expected addition at the root: {:?}", program);
        };
        let Expr::Binary(BinaryOp::Mul, _, pow) = right.as_ref() else {
            panic!("expected multiplication: {:?}", right);
        };
        assert!(matches!(
            pow.as_ref(),
            Expr::Binary(BinaryOp::Pow, _, inner) if matches!(inner.as_ref(), Expr::Binary(BinaryOp::Pow, _, _))
        ));
    }

    #[test]
    fn test_semicolons_are_optional_at_line_breaks() {
        let program = parse_program("let a = 1\nlet b = a + 1\nconsole.log(b)").unwrap();
        assert_eq!(program.len(), 3);
    }

    #[test]
    fn test_missing_separator_on_same_line_is_rejected() {
        let err = parse_program("let a = 1 let b = 2").unwrap_err();
        assert!(matches!(err, ScriptError::Syntax(_)));
    }

    #[test]
    fn test_arrow_functions() {
        let program = parse_program("const f = (a, b = 2) => a + b; const g = x => { return x; };")
            .unwrap();
        assert_eq!(program.len(), 2);
        let Stmt::Decl { declarations, .. } = &program[0] else {
            panic!("expected declaration");
        };
        let Some(Expr::Function(def)) = &declarations[0].1 else {
            panic!("expected arrow function");
        };
        assert!(def.is_arrow);
        assert_eq!(def.params.len(), 2);
        assert!(def.params[1].default.is_some());
    }

    #[test]
    fn test_for_of_and_classic_for() {
        let program =
            parse_program("for (const c of s) { n++; } for (let i = 0; i < 3; i++) {}").unwrap();
        assert!(matches!(
            program[0],
            Stmt::ForEach {
                iteration: Iteration::Of,
                kind: Some(DeclKind::Const),
                ..
            }
        ));
        assert!(matches!(program[1], Stmt::For { .. }));

        let program = parse_program("for (k in o) {} for (const [k, v] of xs) {}").unwrap();
        assert!(matches!(
            program[0],
            Stmt::ForEach {
                iteration: Iteration::In,
                kind: None,
                ..
            }
        ));
        assert!(matches!(
            &program[1],
            Stmt::ForEach { target: Pattern::Array { elements, .. }, .. } if elements.len() == 2
        ));
    }

    #[test]
    fn test_destructuring_patterns() {
        let program = parse_program(
            "const { a, b: [x, , y = 2], ...others } = o; [p, q] = [q, p]; function f(...args) {}",
        )
        .unwrap();
        let Stmt::Decl { declarations, .. } = &program[0] else {
            panic!("expected declaration");
        };
        let Pattern::Object { properties, rest } = &declarations[0].0 else {
            panic!("expected object pattern: {:?}", declarations);
        };
        assert_eq!(properties.len(), 2);
        assert_eq!(rest.as_deref(), Some("others"));
        assert!(matches!(
            &properties[1].target,
            Pattern::Array { elements, .. } if elements.len() == 3 && elements[1].is_none()
        ));
        assert!(matches!(program[1], Stmt::Expr(Expr::Destructure { .. })));
        let Stmt::Function(def) = &program[2] else {
            panic!("expected function");
        };
        assert!(def.params.is_empty());
        assert!(matches!(def.rest, Some(Pattern::Ident(_))));

        assert!(parse_program("let [a];").is_err());
        assert!(parse_program("[a + 1] = xs;").is_err());
    }

    #[test]
    fn test_try_and_switch_statements() {
        let program = parse_program(
            "try { f(); } catch (e) { g(e); } finally { h(); }\n\
             switch (x) { case 1: case 2: y(); break; default: z(); }",
        )
        .unwrap();
        assert!(matches!(
            &program[0],
            Stmt::Try { handler: Some(_), finalizer: Some(_), .. }
        ));
        let Stmt::Switch { cases, .. } = &program[1] else {
            panic!("expected switch");
        };
        assert_eq!(cases.len(), 3);
        assert!(cases[0].body.is_empty());
        assert!(cases[2].test.is_none());

        let err = parse_program("try { f(); }").unwrap_err();
        assert!(err.to_string().contains("Missing catch or finally"));
        let err = parse_program("switch (x) { default: a(); default: b(); }").unwrap_err();
        assert!(err.to_string().contains("More than one default"));
    }

    #[test]
    fn test_unary_operand_of_exponent_needs_parentheses() {
        let err = parse_program("-2 ** 2;").unwrap_err();
        assert!(err.to_string().starts_with("Unary operator used immediately before exponentiation"));
        assert!(parse_program("typeof x ** 2;").is_err());
        assert!(parse_program("(-2) ** 2; 2 ** -2; a * -b; -a * b ** 2;").is_ok());
    }

    #[test]
    fn test_return_on_its_own_line_returns_undefined() {
        let program = parse_program("function f() { return\n 1; }").unwrap();
        let Stmt::Function(def) = &program[0] else {
            panic!("expected function");
        };
        let FunctionBody::Block(body) = &def.body else {
            panic!("expected block body");
        };
        assert!(matches!(body[0], Stmt::Return(None)));
    }

    #[test]
    fn test_invalid_assignment_target() {
        assert!(parse_program("1 = 2;").is_err());
        assert!(parse_program("f()++;").is_err());
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let source = format!("{}1{}", "(".repeat(500), ")".repeat(500));
        let err = parse_program(&source).unwrap_err();
        assert!(err.to_string().contains("nested too deeply"));
    }
}
