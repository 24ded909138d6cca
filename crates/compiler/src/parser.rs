//! Recursive-descent statement/declaration parser with a Pratt expression
//! parser, per spec §4.2.
//!
//! Concrete syntax note: spec.md describes the grammar at the structural
//! level (block headers end in `:`, bodies are newline-delimited lists
//! ended by `end <keyword>`) without pinning exact punctuation for every
//! clause. This implementation fixes that grammar as: every block header
//! is a sequence of `keyword: value` clauses (`function: name params: ...
//! returns: type body: ... end body end function`), constructors inside a
//! struct use the `init` keyword (already reserved, reused in this
//! position) rather than inventing a new one, and import aliases use the
//! contextual (non-reserved) identifier `as`. These choices are recorded
//! in DESIGN.md.

use crate::ast::*;
use crate::diagnostics::{Diagnostic, DiagnosticBag, DiagnosticKind};
use crate::lexer::{Token, TokenKind};
use crate::types::Type;
use std::path::{Path, PathBuf};

const TOP_LEVEL_SYNC: &[&str] = &["module", "import", "declare", "const", "struct", "function"];

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    file: PathBuf,
    diagnostics: DiagnosticBag,
}

pub fn parse_file(file: &Path, tokens: Vec<Token>) -> (Module, DiagnosticBag) {
    let mut parser = Parser {
        tokens,
        pos: 0,
        file: file.to_path_buf(),
        diagnostics: DiagnosticBag::new(),
    };
    let module = parser.parse_source_file();
    (module, parser.diagnostics)
}

type PResult<T> = Result<T, ()>;

impl Parser {
    fn here(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn loc(&self) -> SourceLocation {
        let t = self.here();
        SourceLocation::new(self.file.clone(), t.line, t.col)
    }

    fn kind(&self) -> &TokenKind {
        &self.here().kind
    }

    fn is_eof(&self) -> bool {
        matches!(self.kind(), TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let t = self.here().clone();
        if !self.is_eof() {
            self.pos += 1;
        }
        t
    }

    fn skip_newlines(&mut self) {
        while matches!(self.kind(), TokenKind::Newline) {
            self.advance();
        }
    }

    fn is_kw(&self, word: &str) -> bool {
        matches!(self.kind(), TokenKind::Keyword) && self.here().lexeme == word
    }

    /// An `as` alias token: "as" is not in the reserved keyword set, so it
    /// lexes as a plain Identifier; we recognize it positionally.
    fn is_soft_kw(&self, word: &str) -> bool {
        matches!(self.kind(), TokenKind::Identifier) && self.here().lexeme == word
    }

    fn error(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        let t = self.here();
        self.diagnostics.push(Diagnostic::new(
            kind,
            self.file.clone(),
            t.line,
            t.col,
            message,
        ));
    }

    fn expect_keyword(&mut self, word: &str) -> PResult<Token> {
        if self.is_kw(word) {
            Ok(self.advance())
        } else {
            self.error(
                DiagnosticKind::ParseErrorMissingToken,
                format!("expected '{}', found '{}'", word, self.here().lexeme),
            );
            Err(())
        }
    }

    fn expect_kind(&mut self, kind: TokenKind, what: &str) -> PResult<Token> {
        if *self.kind() == kind {
            Ok(self.advance())
        } else {
            self.error(
                DiagnosticKind::ParseErrorMissingToken,
                format!("expected {what}, found '{}'", self.here().lexeme),
            );
            Err(())
        }
    }

    fn expect_identifier(&mut self) -> PResult<String> {
        if matches!(self.kind(), TokenKind::Identifier) {
            Ok(self.advance().lexeme)
        } else {
            self.error(
                DiagnosticKind::ParseErrorMissingToken,
                format!("expected identifier, found '{}'", self.here().lexeme),
            );
            Err(())
        }
    }

    /// Accepts an identifier or the `new`/`init` keywords as a name — used
    /// for constructor/method name positions where those reserved words
    /// are meaningful identifiers in context.
    fn expect_name(&mut self) -> PResult<String> {
        if matches!(self.kind(), TokenKind::Identifier) {
            Ok(self.advance().lexeme)
        } else if self.is_kw("init") || self.is_kw("new") {
            Ok(self.advance().lexeme)
        } else {
            self.error(
                DiagnosticKind::ParseErrorMissingToken,
                format!("expected name, found '{}'", self.here().lexeme),
            );
            Err(())
        }
    }

    /// Resynchronize after a parse error: discard tokens up to the next
    /// NEWLINE or the start of a registered top-level keyword (spec §4.2).
    fn synchronize(&mut self) {
        while !self.is_eof() {
            if matches!(self.kind(), TokenKind::Newline) {
                self.advance();
                return;
            }
            if matches!(self.kind(), TokenKind::Keyword)
                && TOP_LEVEL_SYNC.contains(&self.here().lexeme.as_str())
            {
                return;
            }
            self.advance();
        }
    }

    // -------------------------------------------------------------
    // Top level
    // -------------------------------------------------------------

    fn parse_source_file(&mut self) -> Module {
        self.skip_newlines();
        if self.is_kw("module") {
            return self.parse_module();
        }
        // Script-mode fallback (spec §4.2): no recognized top-level
        // `module` keyword. Parse top-level items/statements directly and
        // synthesize a module wrapping a `_start` function from any loose
        // statements.
        let source = self.loc();
        let mut module = Module {
            name: "_script".to_string(),
            imports: Vec::new(),
            globals: Vec::new(),
            structs: Vec::new(),
            functions: Vec::new(),
            source: source.clone(),
        };
        let mut loose_statements = Vec::new();
        while !self.is_eof() {
            self.skip_newlines();
            if self.is_eof() {
                break;
            }
            if self.is_kw("import") {
                if let Ok(import) = self.parse_import() {
                    module.imports.push(import);
                }
            } else if self.is_kw("struct") {
                if let Ok(s) = self.parse_struct() {
                    module.structs.push(s);
                }
            } else if self.is_kw("function") {
                if let Ok(f) = self.parse_function() {
                    module.functions.push(f);
                }
            } else if self.is_kw("declare") || self.is_kw("const") {
                if let Ok(d) = self.parse_declaration() {
                    module.globals.push(d);
                }
            } else {
                match self.parse_statement() {
                    Ok(stmt) => loose_statements.push(stmt),
                    Err(()) => self.synchronize(),
                }
                continue;
            }
            self.skip_newlines();
        }
        if !loose_statements.is_empty() {
            module.functions.push(Function {
                name: "_start".to_string(),
                params: Vec::new(),
                returns: Type::Void,
                body: loose_statements,
                source,
            });
        }
        module
    }

    fn parse_module(&mut self) -> Module {
        let source = self.loc();
        let mut name = String::new();
        if self.expect_keyword("module").is_ok() {
            if self.expect_kind(TokenKind::Colon, "':'").is_ok() {
                name = self.parse_qualified_name().unwrap_or_default();
            }
        }
        let mut module = Module {
            name,
            imports: Vec::new(),
            globals: Vec::new(),
            structs: Vec::new(),
            functions: Vec::new(),
            source,
        };
        loop {
            self.skip_newlines();
            if self.is_eof() || self.is_kw("end") {
                break;
            }
            if self.is_kw("import") {
                match self.parse_import() {
                    Ok(import) => module.imports.push(import),
                    Err(()) => self.synchronize(),
                }
            } else if self.is_kw("struct") {
                match self.parse_struct() {
                    Ok(s) => module.structs.push(s),
                    Err(()) => self.synchronize(),
                }
            } else if self.is_kw("function") {
                match self.parse_function() {
                    Ok(f) => module.functions.push(f),
                    Err(()) => self.synchronize(),
                }
            } else if self.is_kw("declare") || self.is_kw("const") {
                match self.parse_declaration() {
                    Ok(d) => module.globals.push(d),
                    Err(()) => self.synchronize(),
                }
            } else {
                self.error(
                    DiagnosticKind::ParseErrorUnexpectedToken,
                    format!(
                        "unexpected token '{}' inside module body",
                        self.here().lexeme
                    ),
                );
                self.synchronize();
            }
        }
        let _ = self.expect_keyword("end");
        let _ = self.expect_keyword("module");
        module
    }

    fn parse_qualified_name(&mut self) -> PResult<String> {
        let mut name = self.expect_identifier()?;
        while matches!(self.kind(), TokenKind::Dot) {
            self.advance();
            name.push('.');
            name.push_str(&self.expect_identifier()?);
        }
        Ok(name)
    }

    fn parse_import(&mut self) -> PResult<Import> {
        let source = self.loc();
        self.expect_keyword("import")?;
        self.expect_kind(TokenKind::Colon, "':'")?;
        let module = self.parse_qualified_name()?;
        let alias = if self.is_soft_kw("as") {
            self.advance();
            Some(self.expect_identifier()?)
        } else {
            None
        };
        Ok(Import {
            module,
            alias,
            source,
        })
    }

    fn parse_type(&mut self) -> PResult<Type> {
        if matches!(self.kind(), TokenKind::Type) {
            let name = self.advance().lexeme;
            let mut ty = Type::from_keyword(&name).expect("lexer guarantees known type keyword");
            while matches!(self.kind(), TokenKind::LBracket) {
                self.advance();
                self.expect_kind(TokenKind::RBracket, "']'")?;
                ty = Type::Array(Box::new(ty));
            }
            Ok(ty)
        } else if matches!(self.kind(), TokenKind::Identifier) {
            let name = self.advance().lexeme;
            let mut ty = Type::Struct(name);
            while matches!(self.kind(), TokenKind::LBracket) {
                self.advance();
                self.expect_kind(TokenKind::RBracket, "']'")?;
                ty = Type::Array(Box::new(ty));
            }
            Ok(ty)
        } else {
            self.error(
                DiagnosticKind::ParseErrorMissingToken,
                format!("expected type, found '{}'", self.here().lexeme),
            );
            Err(())
        }
    }

    fn parse_declaration(&mut self) -> PResult<Declaration> {
        let source = self.loc();
        let is_const = if self.is_kw("const") {
            self.advance();
            true
        } else {
            false
        };
        self.expect_keyword("declare")?;
        let name = self.expect_identifier()?;
        let ty = if matches!(self.kind(), TokenKind::Colon) {
            self.advance();
            Some(self.parse_type()?)
        } else {
            None
        };
        let initializer = if matches!(self.kind(), TokenKind::Assign) {
            self.advance();
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Declaration {
            name,
            ty,
            is_const,
            initializer,
            source,
        })
    }

    fn parse_param_list(&mut self) -> PResult<Vec<Param>> {
        let mut params = Vec::new();
        loop {
            if !self.is_kw("declare") {
                break;
            }
            let decl = self.parse_declaration()?;
            let ty = decl.ty.ok_or_else(|| {
                self.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::TypeMismatch,
                    self.file.clone(),
                    decl.source.line,
                    decl.source.col,
                    format!("parameter '{}' requires a declared type", decl.name),
                ));
            })?;
            params.push(Param {
                name: decl.name,
                ty,
            });
            if matches!(self.kind(), TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        Ok(params)
    }

    fn parse_struct(&mut self) -> PResult<StructDef> {
        let source = self.loc();
        self.expect_keyword("struct")?;
        self.expect_kind(TokenKind::Colon, "':'")?;
        let name = self.expect_identifier()?;
        let parent = if self.is_kw("extends") {
            self.advance();
            Some(self.expect_identifier()?)
        } else {
            None
        };
        let mut fields = Vec::new();
        if self.is_kw("fields") {
            self.advance();
            self.expect_kind(TokenKind::Colon, "':'")?;
            loop {
                let fname = self.expect_identifier()?;
                self.expect_kind(TokenKind::Colon, "':'")?;
                let fty = self.parse_type()?;
                fields.push(Param {
                    name: fname,
                    ty: fty,
                });
                if matches!(self.kind(), TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        let mut constructors = Vec::new();
        let mut methods = Vec::new();
        loop {
            self.skip_newlines();
            if self.is_kw("init") {
                constructors.push(self.parse_block_function("init")?);
            } else if self.is_kw("function") {
                methods.push(self.parse_function()?);
            } else {
                break;
            }
        }
        self.skip_newlines();
        self.expect_keyword("end")?;
        self.expect_keyword("struct")?;
        Ok(StructDef {
            name,
            parent,
            fields,
            constructors,
            methods,
            source,
        })
    }

    fn parse_function(&mut self) -> PResult<Function> {
        self.parse_block_function("function")
    }

    /// Shared by `function: name ...` and `init: ...` (constructor) bodies,
    /// which have identical `params:/returns:/body:` clause shapes.
    fn parse_block_function(&mut self, opener: &str) -> PResult<Function> {
        let source = self.loc();
        self.expect_keyword(opener)?;
        self.expect_kind(TokenKind::Colon, "':'")?;
        let name = if opener == "init" {
            "init".to_string()
        } else {
            self.expect_name()?
        };
        let mut params = Vec::new();
        if self.is_kw("params") {
            self.advance();
            self.expect_kind(TokenKind::Colon, "':'")?;
            params = self.parse_param_list()?;
        }
        let mut returns = Type::Void;
        if self.is_kw("returns") {
            self.advance();
            self.expect_kind(TokenKind::Colon, "':'")?;
            returns = self.parse_type()?;
        }
        self.expect_keyword("body")?;
        self.expect_kind(TokenKind::Colon, "':'")?;
        let body = self.parse_statement_list(&["body"])?;
        self.expect_keyword("end")?;
        self.expect_keyword("body")?;
        self.expect_keyword("end")?;
        self.expect_keyword(opener)?;
        Ok(Function {
            name,
            params,
            returns,
            body,
            source,
        })
    }

    // -------------------------------------------------------------
    // Statements
    // -------------------------------------------------------------

    /// Parses statements until the next token is `end <one of closers>`.
    fn parse_statement_list(&mut self, _closers: &[&str]) -> PResult<Vec<Statement>> {
        let mut stmts = Vec::new();
        loop {
            self.skip_newlines();
            if self.is_eof() || self.is_kw("end") {
                break;
            }
            match self.parse_statement() {
                Ok(s) => stmts.push(s),
                Err(()) => {
                    self.synchronize();
                    if self.is_eof() {
                        break;
                    }
                }
            }
        }
        Ok(stmts)
    }

    fn parse_statement(&mut self) -> PResult<Statement> {
        let source = self.loc();
        if self.is_kw("declare") || self.is_kw("const") {
            return Ok(Statement::Declare(self.parse_declaration()?));
        }
        if self.is_kw("if") {
            return Ok(Statement::If(self.parse_if()?));
        }
        if self.is_kw("loop") {
            return Ok(Statement::Loop(self.parse_loop()?));
        }
        if self.is_kw("break") {
            self.advance();
            return Ok(Statement::Break(source));
        }
        if self.is_kw("continue") {
            self.advance();
            return Ok(Statement::Continue(source));
        }
        if self.is_kw("return") {
            self.advance();
            let value = if matches!(self.kind(), TokenKind::Newline)
                || self.is_eof()
                || self.is_kw("end")
            {
                None
            } else {
                Some(self.parse_expr()?)
            };
            return Ok(Statement::Return { value, source });
        }
        // Assignment / index-assignment / bare expression statement: all
        // start with an expression; disambiguate on what follows.
        let expr = self.parse_expr()?;
        if matches!(self.kind(), TokenKind::Assign) {
            self.advance();
            let value = self.parse_expr()?;
            return match expr {
                Expr::Identifier(name, _) => Ok(Statement::Assignment {
                    name,
                    value,
                    source,
                }),
                Expr::Index { receiver, index, .. } => {
                    let mut indices = vec![*index];
                    let mut target = *receiver;
                    while let Expr::Index {
                        receiver: inner_recv,
                        index: inner_idx,
                        ..
                    } = target
                    {
                        indices.insert(0, *inner_idx);
                        target = *inner_recv;
                    }
                    Ok(Statement::IndexAssignment {
                        target,
                        indices,
                        value,
                        source,
                    })
                }
                Expr::Member { receiver, name, .. } => Ok(Statement::MemberAssignment {
                    receiver: *receiver,
                    field: name,
                    value,
                    source,
                }),
                _ => {
                    self.error(
                        DiagnosticKind::ParseErrorUnsupportedFeature,
                        "left-hand side of assignment must be an identifier, index, or field expression",
                    );
                    Err(())
                }
            };
        }
        Ok(Statement::ExprStmt(expr))
    }

    fn parse_if(&mut self) -> PResult<IfStmt> {
        let source = self.loc();
        self.expect_keyword("if")?;
        self.expect_kind(TokenKind::Colon, "':'")?;
        let condition = self.parse_expr()?;
        self.expect_keyword("then")?;
        self.expect_kind(TokenKind::Colon, "':'")?;
        let then_branch = self.parse_statement_list(&["if"])?;
        let else_branch = if self.is_kw("else") {
            self.advance();
            self.expect_kind(TokenKind::Colon, "':'")?;
            Some(self.parse_statement_list(&["if"])?)
        } else {
            None
        };
        self.expect_keyword("end")?;
        self.expect_keyword("if")?;
        Ok(IfStmt {
            condition,
            then_branch,
            else_branch,
            source,
        })
    }

    fn parse_loop(&mut self) -> PResult<LoopStmt> {
        let source = self.loc();
        self.expect_keyword("loop")?;
        self.expect_kind(TokenKind::Colon, "':'")?;
        let mut init = None;
        if self.is_kw("init") {
            self.advance();
            self.expect_kind(TokenKind::Colon, "':'")?;
            if !self.is_kw("cond") && !self.is_kw("step") && !self.is_kw("body") {
                init = Some(Box::new(self.parse_statement()?));
            }
        }
        let mut cond = None;
        if self.is_kw("cond") {
            self.advance();
            self.expect_kind(TokenKind::Colon, "':'")?;
            cond = Some(self.parse_expr()?);
        }
        let mut step = None;
        if self.is_kw("step") {
            self.advance();
            self.expect_kind(TokenKind::Colon, "':'")?;
            if !self.is_kw("body") {
                step = Some(Box::new(self.parse_statement()?));
            }
        }
        self.expect_keyword("body")?;
        self.expect_kind(TokenKind::Colon, "':'")?;
        let body = self.parse_statement_list(&["loop"])?;
        self.expect_keyword("end")?;
        self.expect_keyword("body")?;
        self.expect_keyword("end")?;
        self.expect_keyword("loop")?;
        Ok(LoopStmt {
            init,
            cond,
            step,
            body,
            source,
        })
    }

    // -------------------------------------------------------------
    // Pratt expression parser (spec §4.2 precedence table)
    // -------------------------------------------------------------

    fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_and()?;
        while matches!(self.kind(), TokenKind::OrOr) {
            let source = self.loc();
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Binary {
                op: BinaryOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                source,
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_equality()?;
        while matches!(self.kind(), TokenKind::AndAnd) {
            let source = self.loc();
            self.advance();
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary {
                op: BinaryOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                source,
            };
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.kind() {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::NotEq,
                _ => break,
            };
            let source = self.loc();
            self.advance();
            let rhs = self.parse_relational()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                source,
            };
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.kind() {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Ge => BinaryOp::Ge,
                _ => break,
            };
            let source = self.loc();
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                source,
            };
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            let source = self.loc();
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                source,
            };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            let source = self.loc();
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                source,
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let source = self.loc();
        if matches!(self.kind(), TokenKind::Minus) {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
                source,
            });
        }
        if matches!(self.kind(), TokenKind::Bang) {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
                source,
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.kind() {
                TokenKind::Dot => {
                    let source = self.loc();
                    self.advance();
                    let name = self.expect_identifier()?;
                    if matches!(self.kind(), TokenKind::LParen) {
                        self.advance();
                        let args = self.parse_args()?;
                        expr = Expr::Call {
                            callee: Box::new(Expr::Member {
                                receiver: Box::new(expr),
                                name,
                                source: source.clone(),
                            }),
                            args,
                            source,
                        };
                    } else {
                        expr = Expr::Member {
                            receiver: Box::new(expr),
                            name,
                            source,
                        };
                    }
                }
                TokenKind::LBracket => {
                    let source = self.loc();
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect_kind(TokenKind::RBracket, "']'")?;
                    expr = Expr::Index {
                        receiver: Box::new(expr),
                        index: Box::new(index),
                        source,
                    };
                }
                TokenKind::LParen => {
                    let source = self.loc();
                    self.advance();
                    let args = self.parse_args()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        source,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_args(&mut self) -> PResult<Vec<Expr>> {
        let mut args = Vec::new();
        if !matches!(self.kind(), TokenKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if matches!(self.kind(), TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect_kind(TokenKind::RParen, "')'")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let source = self.loc();
        match self.kind().clone() {
            TokenKind::Number {
                width,
                is_float_form,
            } => {
                let text = self.advance().lexeme;
                Ok(Expr::Number {
                    text,
                    width,
                    is_float_form,
                    source,
                })
            }
            TokenKind::Bool(b) => {
                self.advance();
                Ok(Expr::Bool(b, source))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::Str(s, source))
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                if !matches!(self.kind(), TokenKind::RBracket) {
                    loop {
                        items.push(self.parse_expr()?);
                        if matches!(self.kind(), TokenKind::Comma) {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
                self.expect_kind(TokenKind::RBracket, "']'")?;
                Ok(Expr::Array(items, source))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect_kind(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Keyword if self.here().lexeme == "new" => {
                self.advance();
                let type_name = self.expect_identifier()?;
                self.expect_kind(TokenKind::LParen, "'('")?;
                let args = self.parse_args()?;
                Ok(Expr::New {
                    type_name,
                    args,
                    source,
                })
            }
            TokenKind::Keyword
                if self.here().lexeme == "this"
                    || self.here().lexeme == "self"
                    || self.here().lexeme == "super" =>
            {
                let name = self.advance().lexeme;
                Ok(Expr::Identifier(name, source))
            }
            TokenKind::Identifier => {
                let name = self.advance().lexeme;
                Ok(Expr::Identifier(name, source))
            }
            _ => {
                self.error(
                    DiagnosticKind::ParseErrorUnexpectedToken,
                    format!("unexpected token '{}' in expression", self.here().lexeme),
                );
                Err(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse(src: &str) -> (Module, DiagnosticBag) {
        let (tokens, lex_diags) = tokenize(Path::new("t.snow"), src);
        assert!(lex_diags.is_empty());
        parse_file(Path::new("t.snow"), tokens)
    }

    #[test]
    fn scenario_one_inline_module() {
        let (module, diags) = parse(
            "module: M  function: main returns: int  body: return 1+2  end body end function end module",
        );
        assert!(diags.is_empty(), "{:?}", diags.into_vec());
        assert_eq!(module.name, "M");
        assert_eq!(module.functions.len(), 1);
        assert_eq!(module.functions[0].name, "main");
    }

    #[test]
    fn factorial_module_parses() {
        let src = r#"
module: Math
  function: fact params: declare n:int returns: int
    body: declare r:int=1
      loop: init: declare i:int=1 cond: i<=n step: i=i+1
        body: r=r*i end body
      end loop
      return r
    end body
  end function
end module
"#;
        let (module, diags) = parse(src);
        assert!(diags.is_empty(), "{:?}", diags.into_vec());
        let f = &module.functions[0];
        assert_eq!(f.name, "fact");
        assert_eq!(f.params[0].name, "n");
        assert_eq!(f.body.len(), 3);
    }

    #[test]
    fn struct_inheritance_parses() {
        let src = "struct: Animal function: speak returns: int body: return 1 end body end function end struct\n\
struct: Dog extends Animal function: speak returns: int body: return 2 end body end function end struct";
        let (module, diags) = parse(src);
        assert!(diags.is_empty(), "{:?}", diags.into_vec());
        assert_eq!(module.structs.len(), 2);
        assert_eq!(module.structs[1].parent.as_deref(), Some("Animal"));
    }

    #[test]
    fn break_outside_loop_is_just_parsed_here() {
        // Parser accepts `break` anywhere; the IR builder rejects it
        // outside a loop (spec §4.3, §8).
        let (module, diags) = parse("function: f returns: void body: break end body end function");
        assert!(diags.is_empty());
        assert_eq!(module.functions[0].body.len(), 1);
    }

    #[test]
    fn duplicate_syntax_errors_are_aggregated() {
        let src = "function: f returns: int body: return 1 ++ end body end function";
        let (_module, diags) = parse(src);
        assert!(!diags.is_empty());
    }

    #[test]
    fn constructor_overload_parses() {
        let src = "struct: Point fields: x:int, y:int \
            init: params: declare x:int, declare y:int body: return end body end init \
            init: params: declare xy:int body: return end body end init \
            end struct";
        let (module, diags) = parse(src);
        assert!(diags.is_empty(), "{:?}", diags.into_vec());
        assert_eq!(module.structs[0].constructors.len(), 2);
    }
}
