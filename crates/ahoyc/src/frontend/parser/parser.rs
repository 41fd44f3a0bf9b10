//! Recursive descent parser with best-effort error recovery
//!
//! Errors never abort the parse: each one becomes a [`Diagnostic`] and the
//! parser resynchronizes at the next statement terminator or top-level
//! boundary (`fn`, `struct`, `enum`, `const`, `import`, `program`).

use crate::common::{Diagnostic, Span};
use crate::frontend::ast::*;
use crate::frontend::lexer::{Token, TokenKind};

type ParseResult<T> = Result<T, Diagnostic>;

/// Parse a token stream into a module plus collected diagnostics
pub fn parse(tokens: &[Token]) -> (Module, Vec<Diagnostic>) {
    let mut parser = Parser::new(tokens, None);
    let module = parser.parse_module();
    (module, parser.into_diagnostics())
}

/// Like [`parse`], but stamps every diagnostic with `path` so callers can
/// aggregate reports across files
pub fn parse_lint(tokens: &[Token], path: &str) -> (Module, Vec<Diagnostic>) {
    let mut parser = Parser::new(tokens, Some(path.to_string()));
    let module = parser.parse_module();
    (module, parser.into_diagnostics())
}

/// Ahoy parser over a token slice
pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    file: Option<String>,
    diagnostics: Vec<Diagnostic>,
    eof: Token,
}

fn join(a: Span, b: Span) -> Span {
    Span::new(a.start, b.end, a.line, a.column)
}

/// Block-ended statements need no terminator after the closing brace
fn requires_terminator(kind: &StmtKind) -> bool {
    !matches!(
        kind,
        StmtKind::If { .. }
            | StmtKind::Switch { .. }
            | StmtKind::When { .. }
            | StmtKind::While { .. }
            | StmtKind::ForRange { .. }
            | StmtKind::ForCount { .. }
            | StmtKind::ForInArray { .. }
            | StmtKind::ForInDict { .. }
    )
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token], file: Option<String>) -> Self {
        let end = tokens.last().map(|t| t.span).unwrap_or_default();
        Self {
            tokens,
            pos: 0,
            file,
            diagnostics: Vec::new(),
            eof: Token::new(TokenKind::Eof, String::new(), end),
        }
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    // ==================== Token access ====================

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&self.eof)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).unwrap_or(&self.eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn check(&self, expected: &TokenKind) -> bool {
        std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(expected)
    }

    fn match_token(&mut self, expected: &TokenKind) -> bool {
        if self.check(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: TokenKind) -> ParseResult<Token> {
        if self.check(&expected) {
            Ok(self.advance())
        } else {
            let found = self.peek().clone();
            Err(self.error_at(
                found.span,
                format!("expected {}, found {}", expected, found.kind),
            ))
        }
    }

    fn expect_identifier(&mut self) -> ParseResult<(String, Span)> {
        let token = self.peek().clone();
        if let TokenKind::Ident(name) = token.kind {
            self.advance();
            Ok((name, token.span))
        } else {
            Err(self.error_at(
                token.span,
                format!("expected identifier, found {}", token.kind),
            ))
        }
    }

    fn skip_newlines(&mut self) {
        while self.check(&TokenKind::Newline) {
            self.advance();
        }
    }

    fn error_at(&self, span: Span, message: impl Into<String>) -> Diagnostic {
        let mut diagnostic = Diagnostic::new(span, message);
        diagnostic.file = self.file.clone();
        diagnostic
    }

    // ==================== Recovery ====================

    fn at_top_level_boundary(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Fn
                | TokenKind::Struct
                | TokenKind::Enum
                | TokenKind::Const
                | TokenKind::Import
                | TokenKind::Program
                | TokenKind::Eof
        )
    }

    fn synchronize_top_level(&mut self) {
        while !self.at_top_level_boundary() {
            if matches!(self.advance().kind, TokenKind::Newline) {
                return;
            }
        }
    }

    fn synchronize_stmt(&mut self) {
        loop {
            match self.peek().kind {
                TokenKind::RBrace | TokenKind::Case | TokenKind::Eof => return,
                TokenKind::Newline => {
                    self.advance();
                    return;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// Consume the newline(s) ending a simple statement
    fn terminate_stmt(&mut self) -> ParseResult<()> {
        match self.peek().kind {
            TokenKind::Newline => {
                self.skip_newlines();
                Ok(())
            }
            TokenKind::RBrace | TokenKind::Case | TokenKind::Eof => Ok(()),
            _ => {
                let found = self.peek().clone();
                Err(self.error_at(
                    found.span,
                    format!("expected newline or ';' after statement, found {}", found.kind),
                ))
            }
        }
    }

    // ==================== Module & items ====================

    pub fn parse_module(&mut self) -> Module {
        let start = self.peek().span;
        let mut items = Vec::new();

        self.skip_newlines();
        while !self.at_eof() {
            match self.parse_item() {
                Ok(item) => {
                    let needs_terminator = match &item {
                        Item::Stmt(stmt) => requires_terminator(&stmt.kind),
                        Item::Program(_) | Item::Import(_) => true,
                        Item::Decl(Decl::Const(_)) => true,
                        Item::Decl(_) => false,
                    };
                    items.push(item);
                    if needs_terminator {
                        if let Err(diagnostic) = self.terminate_stmt() {
                            self.diagnostics.push(diagnostic);
                            self.synchronize_top_level();
                        }
                    }
                }
                Err(diagnostic) => {
                    self.diagnostics.push(diagnostic);
                    self.synchronize_top_level();
                }
            }
            self.skip_newlines();
        }

        let end = self.peek().span;
        Module::new(items, join(start, end))
    }

    fn parse_item(&mut self) -> ParseResult<Item> {
        match self.peek().kind {
            TokenKind::Program => {
                let start = self.advance().span;
                let (name, end) = self.expect_identifier()?;
                Ok(Item::Program(ProgramDecl {
                    name,
                    span: join(start, end),
                }))
            }
            TokenKind::Import => Ok(Item::Import(self.parse_import()?)),
            TokenKind::Fn => Ok(Item::Decl(Decl::Function(self.parse_fn()?))),
            TokenKind::Struct => Ok(Item::Decl(Decl::Struct(self.parse_struct()?))),
            TokenKind::Enum => Ok(Item::Decl(Decl::Enum(self.parse_enum()?))),
            TokenKind::Const => Ok(Item::Decl(Decl::Const(self.parse_const()?))),
            _ => Ok(Item::Stmt(self.parse_stmt()?)),
        }
    }

    fn parse_import(&mut self) -> ParseResult<ImportDecl> {
        let start = self.expect(TokenKind::Import)?.span;

        let token = self.peek().clone();
        let (path, mut end) = match token.kind {
            TokenKind::Str(path) => {
                self.advance();
                (path, token.span)
            }
            TokenKind::Ident(_) => {
                let (first, mut span) = self.expect_identifier()?;
                let mut parts = vec![first];
                while self.match_token(&TokenKind::Dot) {
                    let (part, part_span) = self.expect_identifier()?;
                    parts.push(part);
                    span = part_span;
                }
                (parts.join("."), span)
            }
            _ => {
                return Err(self.error_at(
                    token.span,
                    format!("expected import path, found {}", token.kind),
                ));
            }
        };

        let alias = if self.match_token(&TokenKind::As) {
            let (alias, alias_span) = self.expect_identifier()?;
            end = alias_span;
            Some(alias)
        } else {
            None
        };

        Ok(ImportDecl {
            path,
            alias,
            span: join(start, end),
        })
    }

    fn parse_fn(&mut self) -> ParseResult<FnDecl> {
        let start = self.expect(TokenKind::Fn)?.span;
        let (name, _) = self.expect_identifier()?;
        self.expect(TokenKind::LParen)?;

        let mut params = Vec::new();
        self.skip_newlines();
        while !self.check(&TokenKind::RParen) {
            let (pname, pspan) = self.expect_identifier()?;
            let ty = if self.match_token(&TokenKind::Colon) {
                Some(self.expect_identifier()?.0)
            } else {
                None
            };
            params.push(Param {
                name: pname,
                ty,
                span: pspan,
            });
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
            self.skip_newlines();
        }
        self.expect(TokenKind::RParen)?;

        let return_type = if self.match_token(&TokenKind::Colon) {
            Some(self.expect_identifier()?.0)
        } else {
            None
        };

        let body = self.parse_block()?;
        let span = join(start, body.span);
        Ok(FnDecl {
            name,
            params,
            return_type,
            body,
            span,
        })
    }

    fn parse_struct(&mut self) -> ParseResult<StructDecl> {
        let start = self.expect(TokenKind::Struct)?.span;
        let (name, _) = self.expect_identifier()?;
        self.expect(TokenKind::LBrace)?;
        self.skip_newlines();

        let mut fields = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            let (fname, fspan) = self.expect_identifier()?;
            self.expect(TokenKind::Colon)?;
            let (ty, _) = self.expect_identifier()?;
            fields.push(StructField {
                name: fname,
                ty,
                span: fspan,
            });
            self.match_token(&TokenKind::Comma);
            self.skip_newlines();
        }

        let end = self.expect(TokenKind::RBrace)?.span;
        Ok(StructDecl {
            name,
            fields,
            span: join(start, end),
        })
    }

    fn parse_enum(&mut self) -> ParseResult<EnumDecl> {
        let start = self.expect(TokenKind::Enum)?.span;
        let (name, _) = self.expect_identifier()?;
        self.expect(TokenKind::LBrace)?;
        self.skip_newlines();

        let mut members = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            members.push(self.expect_identifier()?.0);
            self.match_token(&TokenKind::Comma);
            self.skip_newlines();
        }

        let end = self.expect(TokenKind::RBrace)?.span;
        Ok(EnumDecl {
            name,
            members,
            span: join(start, end),
        })
    }

    fn parse_const(&mut self) -> ParseResult<ConstDecl> {
        let start = self.expect(TokenKind::Const)?.span;
        let (name, _) = self.expect_identifier()?;
        self.expect(TokenKind::Equals)?;
        let value = self.parse_expr()?;
        let span = join(start, value.span);
        Ok(ConstDecl { name, value, span })
    }

    // ==================== Statements ====================

    fn parse_block(&mut self) -> ParseResult<Block> {
        let start = self.expect(TokenKind::LBrace)?.span;
        let stmts = self.parse_stmt_list(&[TokenKind::RBrace])?;
        let end = self.expect(TokenKind::RBrace)?.span;
        Ok(Block::new(stmts, join(start, end)))
    }

    /// Parse statements until one of `stops` (or EOF), recovering per
    /// statement so one bad line does not lose the rest of the block
    fn parse_stmt_list(&mut self, stops: &[TokenKind]) -> ParseResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        self.skip_newlines();
        while !self.at_eof() && !stops.iter().any(|k| self.check(k)) {
            match self.parse_stmt() {
                Ok(stmt) => {
                    let needs_terminator = requires_terminator(&stmt.kind);
                    stmts.push(stmt);
                    if needs_terminator {
                        if let Err(diagnostic) = self.terminate_stmt() {
                            self.diagnostics.push(diagnostic);
                            self.synchronize_stmt();
                        }
                    }
                }
                Err(diagnostic) => {
                    self.diagnostics.push(diagnostic);
                    self.synchronize_stmt();
                }
            }
            self.skip_newlines();
        }
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> ParseResult<Stmt> {
        match self.peek().kind {
            TokenKind::If => self.parse_if(),
            TokenKind::Switch => self.parse_switch(),
            TokenKind::When => self.parse_when(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Return => {
                let start = self.advance().span;
                let value = if matches!(
                    self.peek().kind,
                    TokenKind::Newline | TokenKind::RBrace | TokenKind::Eof
                ) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                let span = value.as_ref().map_or(start, |e| join(start, e.span));
                Ok(Stmt::new(StmtKind::Return(value), span))
            }
            TokenKind::Break => {
                let span = self.advance().span;
                Ok(Stmt::new(StmtKind::Break, span))
            }
            TokenKind::Skip => {
                let span = self.advance().span;
                Ok(Stmt::new(StmtKind::Skip, span))
            }
            TokenKind::Ident(_) => {
                if matches!(self.peek_at(1).kind, TokenKind::Equals) {
                    self.parse_assign()
                } else if matches!(self.peek_at(1).kind, TokenKind::Comma) && self.is_tuple_assign()
                {
                    self.parse_tuple_assign()
                } else {
                    self.parse_expr_stmt()
                }
            }
            _ => self.parse_expr_stmt(),
        }
    }

    fn parse_expr_stmt(&mut self) -> ParseResult<Stmt> {
        let expr = self.parse_expr()?;
        let span = expr.span;
        Ok(Stmt::new(StmtKind::Expr(expr), span))
    }

    fn parse_assign(&mut self) -> ParseResult<Stmt> {
        let (target, start) = self.expect_identifier()?;
        self.expect(TokenKind::Equals)?;
        let value = self.parse_expr()?;
        let span = join(start, value.span);
        Ok(Stmt::new(StmtKind::Assign { target, value }, span))
    }

    /// Lookahead for `IDENT (',' IDENT)+ '='` without consuming anything
    fn is_tuple_assign(&self) -> bool {
        let mut offset = 0;
        loop {
            if !matches!(self.peek_at(offset).kind, TokenKind::Ident(_)) {
                return false;
            }
            offset += 1;
            match self.peek_at(offset).kind {
                TokenKind::Comma => offset += 1,
                TokenKind::Equals => return true,
                _ => return false,
            }
        }
    }

    fn parse_tuple_assign(&mut self) -> ParseResult<Stmt> {
        let (first, start) = self.expect_identifier()?;
        let mut targets = vec![first];
        while self.match_token(&TokenKind::Comma) {
            targets.push(self.expect_identifier()?.0);
        }
        self.expect(TokenKind::Equals)?;

        let mut values = vec![self.parse_expr()?];
        while self.match_token(&TokenKind::Comma) {
            values.push(self.parse_expr()?);
        }

        if values.len() != targets.len() {
            let span = values.last().map_or(start, |e| e.span);
            return Err(self.error_at(
                span,
                format!(
                    "tuple assignment expects {} values, found {}",
                    targets.len(),
                    values.len()
                ),
            ));
        }

        let span = join(start, values.last().map_or(start, |e| e.span));
        Ok(Stmt::new(StmtKind::TupleAssign { targets, values }, span))
    }

    fn parse_if(&mut self) -> ParseResult<Stmt> {
        let start = self.expect(TokenKind::If)?.span;
        let cond = self.parse_expr()?;
        let body = self.parse_block()?;
        let mut arms = vec![IfArm { cond, body }];
        let mut else_body = None;
        let mut end = arms[0].body.span;

        loop {
            if self.check(&TokenKind::Elseif) {
                self.advance();
                let cond = self.parse_expr()?;
                let body = self.parse_block()?;
                end = body.span;
                arms.push(IfArm { cond, body });
            } else if self.check(&TokenKind::Else) {
                self.advance();
                let body = self.parse_block()?;
                end = body.span;
                else_body = Some(body);
                break;
            } else {
                // elseif/else may sit on the next line
                let save = self.pos;
                self.skip_newlines();
                if self.check(&TokenKind::Elseif) || self.check(&TokenKind::Else) {
                    continue;
                }
                self.pos = save;
                break;
            }
        }

        Ok(Stmt::new(StmtKind::If { arms, else_body }, join(start, end)))
    }

    fn parse_switch(&mut self) -> ParseResult<Stmt> {
        let start = self.expect(TokenKind::Switch)?.span;
        let scrutinee = self.parse_expr()?;
        self.expect(TokenKind::LBrace)?;
        self.skip_newlines();

        let mut cases = Vec::new();
        while self.check(&TokenKind::Case) {
            cases.push(self.parse_case()?);
            self.skip_newlines();
        }

        let end = self.expect(TokenKind::RBrace)?.span;
        Ok(Stmt::new(
            StmtKind::Switch { scrutinee, cases },
            join(start, end),
        ))
    }

    fn parse_case(&mut self) -> ParseResult<Case> {
        let start = self.expect(TokenKind::Case)?.span;
        let first = self.parse_expr()?;

        let label = if self.match_token(&TokenKind::RangeDots) {
            let hi = self.parse_expr()?;
            CaseLabel::Range(first, hi)
        } else {
            let mut list = vec![first];
            while self.match_token(&TokenKind::Comma) {
                list.push(self.parse_expr()?);
            }
            CaseLabel::List(list)
        };

        self.expect(TokenKind::Colon)?;
        let body = self.parse_stmt_list(&[TokenKind::Case, TokenKind::RBrace])?;
        Ok(Case {
            label,
            body,
            span: start,
        })
    }

    fn parse_when(&mut self) -> ParseResult<Stmt> {
        let start = self.expect(TokenKind::When)?.span;
        let (flag, _) = self.expect_identifier()?;
        let body = self.parse_block()?;
        let span = join(start, body.span);
        Ok(Stmt::new(StmtKind::When { flag, body }, span))
    }

    fn parse_while(&mut self) -> ParseResult<Stmt> {
        let start = self.expect(TokenKind::While)?.span;
        let cond = self.parse_expr()?;
        let body = self.parse_block()?;
        let span = join(start, body.span);
        Ok(Stmt::new(StmtKind::While { cond, body }, span))
    }

    fn parse_for(&mut self) -> ParseResult<Stmt> {
        let start = self.expect(TokenKind::For)?.span;

        if self.match_token(&TokenKind::Count) {
            let count_start = if self.check(&TokenKind::LBrace) {
                None
            } else {
                Some(self.parse_expr()?)
            };
            let body = self.parse_block()?;
            let span = join(start, body.span);
            return Ok(Stmt::new(
                StmtKind::ForCount {
                    start: count_start,
                    body,
                },
                span,
            ));
        }

        let (var, _) = self.expect_identifier()?;

        if self.match_token(&TokenKind::Comma) {
            // `for key, value in dict { … }`
            let (value, _) = self.expect_identifier()?;
            self.expect(TokenKind::In)?;
            let dict = self.parse_expr()?;
            let body = self.parse_block()?;
            let span = join(start, body.span);
            return Ok(Stmt::new(
                StmtKind::ForInDict {
                    key: var,
                    value,
                    dict,
                    body,
                },
                span,
            ));
        }

        self.expect(TokenKind::In)?;

        if self.check(&TokenKind::Range) {
            self.advance();
            self.expect(TokenKind::LParen)?;
            let range_start = self.parse_expr()?;
            self.expect(TokenKind::Comma)?;
            let range_end = self.parse_expr()?;
            self.expect(TokenKind::RParen)?;
            let body = self.parse_block()?;
            let span = join(start, body.span);
            return Ok(Stmt::new(
                StmtKind::ForRange {
                    var,
                    start: range_start,
                    end: range_end,
                    body,
                },
                span,
            ));
        }

        let array = self.parse_expr()?;
        let body = self.parse_block()?;
        let span = join(start, body.span);
        Ok(Stmt::new(StmtKind::ForInArray { var, array, body }, span))
    }

    // ==================== Expressions ====================

    pub fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.match_token(&TokenKind::Or) {
            let rhs = self.parse_and()?;
            let span = join(lhs.span, rhs.span);
            lhs = Expr::new(
                ExprKind::Binary {
                    op: BinOp::Or,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_not()?;
        while self.match_token(&TokenKind::And) {
            let rhs = self.parse_not()?;
            let span = join(lhs.span, rhs.span);
            lhs = Expr::new(
                ExprKind::Binary {
                    op: BinOp::And,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> ParseResult<Expr> {
        if self.check(&TokenKind::Not) {
            let start = self.advance().span;
            let operand = self.parse_cmp()?;
            let span = join(start, operand.span);
            return Ok(Expr::new(
                ExprKind::Unary {
                    op: UnOp::Not,
                    operand: Box::new(operand),
                },
                span,
            ));
        }
        self.parse_cmp()
    }

    fn parse_cmp(&mut self) -> ParseResult<Expr> {
        let lhs = self.parse_add()?;

        let op = match self.peek().kind {
            TokenKind::Is => Some(BinOp::Is),
            TokenKind::GreaterThan => Some(BinOp::GreaterThan),
            TokenKind::LessThan => Some(BinOp::LessThan),
            TokenKind::LesserThan => {
                let span = self.peek().span;
                let diagnostic =
                    self.error_at(span, "operator `lesser_than` is deprecated, use `less_than`");
                self.diagnostics.push(diagnostic);
                Some(BinOp::LessThan)
            }
            _ => None,
        };

        let Some(op) = op else {
            return Ok(lhs);
        };
        self.advance();
        let rhs = self.parse_add()?;
        let span = join(lhs.span, rhs.span);
        Ok(Expr::new(
            ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            span,
        ))
    }

    fn parse_add(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinOp::Plus,
                TokenKind::Minus => BinOp::Minus,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_mul()?;
            let span = join(lhs.span, rhs.span);
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Times => BinOp::Times,
                TokenKind::Div => BinOp::Div,
                TokenKind::Mod => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            let span = join(lhs.span, rhs.span);
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        if self.check(&TokenKind::Minus) {
            let start = self.advance().span;
            let operand = self.parse_unary()?;
            let span = join(start, operand.span);
            return Ok(Expr::new(
                ExprKind::Unary {
                    op: UnOp::Neg,
                    operand: Box::new(operand),
                },
                span,
            ));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;

        loop {
            if self.match_token(&TokenKind::Dot) {
                let (name, name_span) = self.expect_identifier()?;
                if self.match_token(&TokenKind::LParen) {
                    let args = self.parse_call_args()?;
                    let end = self.tokens[self.pos - 1].span;
                    let span = join(expr.span, end);
                    expr = Expr::new(
                        ExprKind::MethodCall {
                            receiver: Box::new(expr),
                            method: name,
                            args,
                        },
                        span,
                    );
                } else {
                    let span = join(expr.span, name_span);
                    expr = Expr::new(
                        ExprKind::Member {
                            receiver: Box::new(expr),
                            name,
                        },
                        span,
                    );
                }
            } else if self.match_token(&TokenKind::LBracket) {
                let index = self.parse_expr()?;
                let end = self.expect(TokenKind::RBracket)?.span;
                let span = join(expr.span, end);
                expr = Expr::new(
                    ExprKind::Index {
                        receiver: Box::new(expr),
                        index: Box::new(index),
                    },
                    span,
                );
            } else if self.check(&TokenKind::LParen) {
                let ExprKind::Identifier(name) = expr.kind else {
                    let span = self.peek().span;
                    return Err(self.error_at(span, "this expression is not callable"));
                };
                self.advance();
                let args = self.parse_call_args()?;
                let end = self.tokens[self.pos - 1].span;
                let span = join(expr.span, end);
                expr = Expr::new(ExprKind::Call { name, args }, span);
            } else {
                break;
            }
        }

        Ok(expr)
    }

    /// Parse call arguments; the opening paren is already consumed
    fn parse_call_args(&mut self) -> ParseResult<Vec<Expr>> {
        let mut args = Vec::new();
        self.skip_newlines();
        if self.match_token(&TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            self.skip_newlines();
            if self.match_token(&TokenKind::Comma) {
                self.skip_newlines();
                if self.check(&TokenKind::RParen) {
                    break;
                }
            } else {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Number(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::Number(value), token.span))
            }
            TokenKind::Str(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::Str(value), token.span))
            }
            TokenKind::CharLit(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::CharLit(value), token.span))
            }
            TokenKind::Boolean(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::Boolean(value), token.span))
            }
            TokenKind::Ident(name) => {
                if matches!(self.peek_at(1).kind, TokenKind::Arrow) {
                    self.advance();
                    self.advance();
                    let body = self.parse_expr()?;
                    let span = join(token.span, body.span);
                    return Ok(Expr::new(
                        ExprKind::Lambda {
                            param: name,
                            body: Box::new(body),
                        },
                        span,
                    ));
                }
                self.advance();
                Ok(Expr::new(ExprKind::Identifier(name), token.span))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::LBrace => self.parse_dict_literal(),
            _ => Err(self.error_at(
                token.span,
                format!("expected expression, found {}", token.kind),
            )),
        }
    }

    fn parse_array_literal(&mut self) -> ParseResult<Expr> {
        let start = self.expect(TokenKind::LBracket)?.span;
        let mut elems = Vec::new();
        self.skip_newlines();
        if !self.check(&TokenKind::RBracket) {
            loop {
                elems.push(self.parse_expr()?);
                self.skip_newlines();
                if self.match_token(&TokenKind::Comma) {
                    self.skip_newlines();
                    if self.check(&TokenKind::RBracket) {
                        break;
                    }
                } else {
                    break;
                }
            }
        }
        let end = self.expect(TokenKind::RBracket)?.span;
        Ok(Expr::new(ExprKind::ArrayLit(elems), join(start, end)))
    }

    fn parse_dict_literal(&mut self) -> ParseResult<Expr> {
        let start = self.expect(TokenKind::LBrace)?.span;
        let mut entries = Vec::new();
        self.skip_newlines();
        if !self.check(&TokenKind::RBrace) {
            loop {
                let key_token = self.peek().clone();
                let TokenKind::Str(key) = key_token.kind else {
                    return Err(self.error_at(
                        key_token.span,
                        format!("expected string key, found {}", key_token.kind),
                    ));
                };
                self.advance();
                self.expect(TokenKind::Colon)?;
                let value = self.parse_expr()?;
                entries.push((Expr::new(ExprKind::Str(key), key_token.span), value));
                self.skip_newlines();
                if self.match_token(&TokenKind::Comma) {
                    self.skip_newlines();
                    if self.check(&TokenKind::RBrace) {
                        break;
                    }
                } else {
                    break;
                }
            }
        }
        let end = self.expect(TokenKind::RBrace)?.span;
        Ok(Expr::new(ExprKind::DictLit(entries), join(start, end)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::tokenize;

    fn parse_ok(source: &str) -> Module {
        let tokens = tokenize(source);
        let (module, diagnostics) = parse(&tokens);
        assert!(diagnostics.is_empty(), "diagnostics: {:?}", diagnostics);
        module
    }

    fn first_stmt(module: &Module) -> &Stmt {
        for item in &module.items {
            if let Item::Stmt(stmt) = item {
                return stmt;
            }
        }
        panic!("no statement in module");
    }

    #[test]
    fn test_assignment() {
        let module = parse_ok("x = 42\n");
        let stmt = first_stmt(&module);
        assert!(matches!(
            &stmt.kind,
            StmtKind::Assign { target, value }
                if target == "x" && matches!(&value.kind, ExprKind::Number(n) if n == "42")
        ));
    }

    #[test]
    fn test_tuple_assignment() {
        let module = parse_ok("a, b = b, a\n");
        let stmt = first_stmt(&module);
        let StmtKind::TupleAssign { targets, values } = &stmt.kind else {
            panic!("expected tuple assignment, got {:?}", stmt.kind);
        };
        assert_eq!(targets, &["a", "b"]);
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_tuple_assignment_count_mismatch() {
        let tokens = tokenize("a, b = 1\n");
        let (_, diagnostics) = parse(&tokens);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("2 values"));
    }

    #[test]
    fn test_function_declaration() {
        let module = parse_ok("fn add(a: int, b: int): int {\n  return a plus b\n}\n");
        let Item::Decl(Decl::Function(decl)) = &module.items[0] else {
            panic!("expected function");
        };
        assert_eq!(decl.name, "add");
        assert_eq!(decl.params.len(), 2);
        assert_eq!(decl.params[0].ty.as_deref(), Some("int"));
        assert_eq!(decl.return_type.as_deref(), Some("int"));
        assert!(matches!(decl.body.stmts[0].kind, StmtKind::Return(Some(_))));
    }

    #[test]
    fn test_untyped_params() {
        let module = parse_ok("fn greet(name) {\n  print(name)\n}\n");
        let Item::Decl(Decl::Function(decl)) = &module.items[0] else {
            panic!("expected function");
        };
        assert_eq!(decl.params[0].name, "name");
        assert!(decl.params[0].ty.is_none());
        assert!(decl.return_type.is_none());
    }

    #[test]
    fn test_struct_declaration() {
        let module = parse_ok("struct Point {\n  x: int\n  y: int\n}\n");
        let Item::Decl(Decl::Struct(decl)) = &module.items[0] else {
            panic!("expected struct");
        };
        assert_eq!(decl.name, "Point");
        assert_eq!(decl.fields.len(), 2);
        assert_eq!(decl.fields[1].name, "y");
    }

    #[test]
    fn test_enum_declaration() {
        let module = parse_ok("enum Color { Red, Green, Blue }\n");
        let Item::Decl(Decl::Enum(decl)) = &module.items[0] else {
            panic!("expected enum");
        };
        assert_eq!(decl.name, "Color");
        assert_eq!(decl.members, &["Red", "Green", "Blue"]);
    }

    #[test]
    fn test_const_declaration() {
        let module = parse_ok("const MAX = 100\n");
        let Item::Decl(Decl::Const(decl)) = &module.items[0] else {
            panic!("expected const");
        };
        assert_eq!(decl.name, "MAX");
    }

    #[test]
    fn test_program_and_imports() {
        let module = parse_ok("program demo\nimport util\nimport math.vec as v\nimport \"raylib.h\"\n");
        assert!(matches!(&module.items[0], Item::Program(p) if p.name == "demo"));
        let Item::Import(util) = &module.items[1] else {
            panic!()
        };
        assert_eq!(util.path, "util");
        assert!(util.alias.is_none());
        let Item::Import(vec) = &module.items[2] else {
            panic!()
        };
        assert_eq!(vec.path, "math.vec");
        assert_eq!(vec.alias.as_deref(), Some("v"));
        let Item::Import(header) = &module.items[3] else {
            panic!()
        };
        assert!(header.is_header());
    }

    #[test]
    fn test_if_elseif_else() {
        let module = parse_ok("if a { x = 1 } elseif b { x = 2 } else { x = 3 }\n");
        let StmtKind::If { arms, else_body } = &first_stmt(&module).kind else {
            panic!("expected if");
        };
        assert_eq!(arms.len(), 2);
        assert!(else_body.is_some());
    }

    #[test]
    fn test_else_on_next_line() {
        let module = parse_ok("if a {\n  x = 1\n}\nelse {\n  x = 2\n}\n");
        let StmtKind::If { arms, else_body } = &first_stmt(&module).kind else {
            panic!("expected if");
        };
        assert_eq!(arms.len(), 1);
        assert!(else_body.is_some());
    }

    #[test]
    fn test_switch_labels() {
        let module = parse_ok(
            "switch x {\ncase 1, 2:\n  y = 1\ncase 3..9:\n  y = 2\n}\n",
        );
        let StmtKind::Switch { cases, .. } = &first_stmt(&module).kind else {
            panic!("expected switch");
        };
        assert_eq!(cases.len(), 2);
        assert!(matches!(&cases[0].label, CaseLabel::List(l) if l.len() == 2));
        assert!(matches!(cases[1].label, CaseLabel::Range(_, _)));
    }

    #[test]
    fn test_for_variants() {
        let module = parse_ok(
            "for i in range(0, 3) { print(\"%v\", i) }\nfor count { break }\nfor x in xs { print(\"%v\", x) }\nfor k, v in d { print(k) }\n",
        );
        let stmts: Vec<_> = module
            .items
            .iter()
            .filter_map(|i| match i {
                Item::Stmt(s) => Some(s),
                _ => None,
            })
            .collect();
        assert!(matches!(&stmts[0].kind, StmtKind::ForRange { var, .. } if var == "i"));
        assert!(matches!(&stmts[1].kind, StmtKind::ForCount { start: None, .. }));
        assert!(matches!(&stmts[2].kind, StmtKind::ForInArray { var, .. } if var == "x"));
        assert!(
            matches!(&stmts[3].kind, StmtKind::ForInDict { key, value, .. } if key == "k" && value == "v")
        );
    }

    #[test]
    fn test_when_block() {
        let module = parse_ok("when DEBUG {\n  print(\"on\")\n}\n");
        assert!(matches!(
            &first_stmt(&module).kind,
            StmtKind::When { flag, .. } if flag == "DEBUG"
        ));
    }

    #[test]
    fn test_operator_precedence() {
        let module = parse_ok("x = 1 plus 2 times 3\n");
        let StmtKind::Assign { value, .. } = &first_stmt(&module).kind else {
            panic!()
        };
        // plus is the root; times binds tighter
        let ExprKind::Binary { op, rhs, .. } = &value.kind else {
            panic!("expected binary, got {:?}", value.kind);
        };
        assert_eq!(*op, BinOp::Plus);
        assert!(matches!(&rhs.kind, ExprKind::Binary { op: BinOp::Times, .. }));
    }

    #[test]
    fn test_symbolic_operators() {
        let module = parse_ok("x = a * 2 + b % 3\n");
        let StmtKind::Assign { value, .. } = &first_stmt(&module).kind else {
            panic!()
        };
        assert!(matches!(&value.kind, ExprKind::Binary { op: BinOp::Plus, .. }));
    }

    #[test]
    fn test_comparison_and_logic() {
        let module = parse_ok("x = a greater_than 1 and b less_than 2 or not c\n");
        let StmtKind::Assign { value, .. } = &first_stmt(&module).kind else {
            panic!()
        };
        assert!(matches!(&value.kind, ExprKind::Binary { op: BinOp::Or, .. }));
    }

    #[test]
    fn test_lesser_than_diagnostic() {
        let tokens = tokenize("x = a lesser_than b\n");
        let (module, diagnostics) = parse(&tokens);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("less_than"));
        // Still parses as a comparison
        let StmtKind::Assign { value, .. } = &first_stmt(&module).kind else {
            panic!()
        };
        assert!(matches!(&value.kind, ExprKind::Binary { op: BinOp::LessThan, .. }));
    }

    #[test]
    fn test_method_chain() {
        let module = parse_ok("xs = [1, 2, 3, 4].map(x => x times 2).filter(x => x greater_than 4)\n");
        let StmtKind::Assign { value, .. } = &first_stmt(&module).kind else {
            panic!()
        };
        let ExprKind::MethodCall { receiver, method, args } = &value.kind else {
            panic!("expected method call");
        };
        assert_eq!(method, "filter");
        assert!(matches!(&args[0].kind, ExprKind::Lambda { param, .. } if param == "x"));
        assert!(matches!(
            &receiver.kind,
            ExprKind::MethodCall { method, .. } if method == "map"
        ));
    }

    #[test]
    fn test_member_index_call() {
        let module = parse_ok("x = p.y\ny = xs[0]\nz = d[\"key\"]\nw = add(1, 2)\n");
        let stmts: Vec<_> = module
            .items
            .iter()
            .filter_map(|i| match i {
                Item::Stmt(s) => Some(s),
                _ => None,
            })
            .collect();
        let StmtKind::Assign { value, .. } = &stmts[0].kind else { panic!() };
        assert!(matches!(&value.kind, ExprKind::Member { name, .. } if name == "y"));
        let StmtKind::Assign { value, .. } = &stmts[1].kind else { panic!() };
        assert!(matches!(&value.kind, ExprKind::Index { .. }));
        let StmtKind::Assign { value, .. } = &stmts[3].kind else { panic!() };
        assert!(matches!(&value.kind, ExprKind::Call { name, args } if name == "add" && args.len() == 2));
    }

    #[test]
    fn test_dict_literal() {
        let module = parse_ok("d = {\"a\": 1, \"b\": 2}\n");
        let StmtKind::Assign { value, .. } = &first_stmt(&module).kind else {
            panic!()
        };
        let ExprKind::DictLit(entries) = &value.kind else {
            panic!("expected dict literal");
        };
        assert_eq!(entries.len(), 2);
        assert!(matches!(&entries[0].0.kind, ExprKind::Str(k) if k == "a"));
    }

    #[test]
    fn test_unary_minus() {
        let module = parse_ok("x = -5\n");
        let StmtKind::Assign { value, .. } = &first_stmt(&module).kind else {
            panic!()
        };
        assert!(matches!(&value.kind, ExprKind::Unary { op: UnOp::Neg, .. }));
    }

    #[test]
    fn test_recovery_keeps_following_items() {
        let tokens = tokenize("x = $\nfn good() {\n  return 1\n}\n");
        let (module, diagnostics) = parse(&tokens);
        assert!(!diagnostics.is_empty());
        assert!(module
            .items
            .iter()
            .any(|i| matches!(i, Item::Decl(Decl::Function(f)) if f.name == "good")));
    }

    #[test]
    fn test_recovery_inside_block() {
        let tokens = tokenize("fn f() {\n  x = $\n  y = 2\n}\n");
        let (module, diagnostics) = parse(&tokens);
        assert_eq!(diagnostics.len(), 1);
        let Item::Decl(Decl::Function(decl)) = &module.items[0] else {
            panic!()
        };
        assert!(matches!(
            &decl.body.stmts.last().unwrap().kind,
            StmtKind::Assign { target, .. } if target == "y"
        ));
    }

    #[test]
    fn test_unclosed_brace_reported() {
        let tokens = tokenize("fn f() {\n  x = 1\n");
        let (_, diagnostics) = parse(&tokens);
        assert!(!diagnostics.is_empty());
    }

    #[test]
    fn test_diagnostics_carry_positions() {
        let tokens = tokenize("x = 1\ny = $\n");
        let (_, diagnostics) = parse(&tokens);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].span.line, 2);
        assert_eq!(diagnostics[0].span.column, 5);
    }

    #[test]
    fn test_parse_lint_stamps_path() {
        let tokens = tokenize("y = $\n");
        let (_, diagnostics) = parse_lint(&tokens, "demo.ahoy");
        assert_eq!(diagnostics[0].file.as_deref(), Some("demo.ahoy"));
    }

    #[test]
    fn test_semicolon_separated_statements() {
        let module = parse_ok("a = 1; b = 2; a, b = b, a\n");
        let stmts: Vec<_> = module
            .items
            .iter()
            .filter_map(|i| match i {
                Item::Stmt(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(stmts.len(), 3);
        assert!(matches!(&stmts[2].kind, StmtKind::TupleAssign { .. }));
    }
}
