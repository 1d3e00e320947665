//! Single-pass compiler: a Pratt parser that emits bytecode as it goes.
//!
//! There is no syntax tree. Each token kind maps to a row in a rule table
//! (prefix handler, infix handler, infix precedence) and the handlers write
//! straight into the chunk under construction.

use std::fmt::{Display, Formatter, Result as FmtResult};

use thiserror::Error;

use crate::scanner::{Scanner, Token, TokenKind, TOKEN_KIND_COUNT};

use super::chunk::{Chunk, OpCode};
use super::table::Table;
use super::value::Value;

/// A diagnostic recorded during compilation, rendered as
/// `[line L] Error at 'lexeme': message`.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("[line {line}] Error{location}: {message}")]
pub struct CompileError {
    pub line: usize,
    pub location: ErrorLocation,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ErrorLocation {
    /// The offending lexeme.
    At(String),
    /// The error was reported against the end of the source.
    AtEnd,
    /// Scan errors carry their diagnostic as the lexeme, so there is no
    /// separate location to show.
    Bare,
}

impl Display for ErrorLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ErrorLocation::At(lexeme) => write!(f, " at '{}'", lexeme),
            ErrorLocation::AtEnd => write!(f, " at end"),
            ErrorLocation::Bare => Ok(()),
        }
    }
}

/// Infix binding power, low to high. `parse_precedence(p)` keeps consuming
/// infix operators while their precedence is at least `p`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
enum Precedence {
    None,
    Assignment, // =
    Or,         // or
    And,        // and
    Equality,   // == !=
    Comparison, // < > <= >=
    Term,       // + -
    Factor,     // * /
    Unary,      // ! -
    Call,       // . ()
    Primary,
}

impl Precedence {
    fn next(self) -> Precedence {
        use Precedence::*;
        match self {
            None => Assignment,
            Assignment => Or,
            Or => And,
            And => Equality,
            Equality => Comparison,
            Comparison => Term,
            Term => Factor,
            Factor => Unary,
            Unary => Call,
            Call | Primary => Primary,
        }
    }
}

type ParseFn<'src, 'heap> = fn(&mut Compiler<'src, 'heap>, bool);

#[derive(Clone, Copy)]
struct Rule<'src, 'heap>(
    Option<ParseFn<'src, 'heap>>,
    Option<ParseFn<'src, 'heap>>,
    Precedence,
);

impl<'src, 'heap> Rule<'src, 'heap> {
    fn prefix(&self) -> Option<ParseFn<'src, 'heap>> {
        self.0
    }

    fn infix(&self) -> Option<ParseFn<'src, 'heap>> {
        self.1
    }

    fn precedence(&self) -> Precedence {
        self.2
    }
}

fn rule<'src, 'heap>(kind: TokenKind) -> Rule<'src, 'heap> {
    #[rustfmt::skip]
    let rules: &[Rule<'src, 'heap>; TOKEN_KIND_COUNT] = {
        use crate::vm::compiler::Compiler as C;
        use std::option::Option::{None as N, Some as S};
        use Precedence as P;
        &[
            // Single-character tokens.
            Rule(S(C::grouping), N,            P::None),       // LeftParen
            Rule(N,              N,            P::None),       // RightParen
            Rule(N,              N,            P::None),       // LeftBrace
            Rule(N,              N,            P::None),       // RightBrace
            Rule(N,              N,            P::None),       // Comma
            Rule(N,              N,            P::None),       // Dot
            Rule(S(C::unary),    S(C::binary), P::Term),       // Minus
            Rule(N,              S(C::binary), P::Term),       // Plus
            Rule(N,              N,            P::None),       // Semicolon
            Rule(N,              S(C::binary), P::Factor),     // Slash
            Rule(N,              S(C::binary), P::Factor),     // Star
            // One or two character tokens.
            Rule(S(C::unary),    N,            P::None),       // Bang
            Rule(N,              S(C::binary), P::Equality),   // BangEqual
            Rule(N,              N,            P::None),       // Equal
            Rule(N,              S(C::binary), P::Equality),   // EqualEqual
            Rule(N,              S(C::binary), P::Comparison), // Greater
            Rule(N,              S(C::binary), P::Comparison), // GreaterEqual
            Rule(N,              S(C::binary), P::Comparison), // Less
            Rule(N,              S(C::binary), P::Comparison), // LessEqual
            // Literals.
            Rule(S(C::variable), N,            P::None),       // Identifier
            Rule(S(C::string),   N,            P::None),       // String
            Rule(S(C::number),   N,            P::None),       // Number
            // Keywords. The empty rows double as extension points: `and`,
            // `or` and the control-flow keywords join the table once the
            // jump opcodes exist.
            Rule(N,              N,            P::None),       // And
            Rule(N,              N,            P::None),       // Class
            Rule(N,              N,            P::None),       // Else
            Rule(S(C::literal),  N,            P::None),       // False
            Rule(N,              N,            P::None),       // For
            Rule(N,              N,            P::None),       // Fun
            Rule(N,              N,            P::None),       // If
            Rule(S(C::literal),  N,            P::None),       // Nil
            Rule(N,              N,            P::None),       // Or
            Rule(N,              N,            P::None),       // Print
            Rule(N,              N,            P::None),       // Return
            Rule(N,              N,            P::None),       // Super
            Rule(N,              N,            P::None),       // This
            Rule(S(C::literal),  N,            P::None),       // True
            Rule(N,              N,            P::None),       // Var
            Rule(N,              N,            P::None),       // While
            // Special tokens.
            Rule(N,              N,            P::None),       // Error
            Rule(N,              N,            P::None),       // Eof
        ]
    };
    rules[kind as usize]
}

const LOCALS_MAX: usize = 256;
const UNINITIALIZED: isize = -1;

#[derive(Debug)]
struct Local {
    name: String,
    /// Scope depth at declaration, or `UNINITIALIZED` between the
    /// declaration and the end of its initializer.
    depth: isize,
}

pub struct Compiler<'src, 'heap> {
    scanner: Scanner<'src>,
    current: Token,
    previous: Token,
    had_error: bool,
    panic_mode: bool,
    errors: Vec<CompileError>,
    chunk: Chunk,
    strings: &'heap mut Table,
    locals: Vec<Local>,
    scope_depth: isize,
}

/// Compiles `source` into a chunk, interning every string and identifier
/// constant in `strings`. All diagnostics are collected; the chunk is only
/// returned when there were none.
pub fn compile(source: &str, strings: &mut Table) -> Result<Chunk, Vec<CompileError>> {
    let mut compiler = Compiler {
        scanner: Scanner::new(source),
        current: Token::empty(),
        previous: Token::empty(),
        had_error: false,
        panic_mode: false,
        errors: Vec::new(),
        chunk: Chunk::new(),
        strings,
        locals: Vec::new(),
        scope_depth: 0,
    };

    compiler.advance();
    while !compiler.matches(TokenKind::Eof) {
        compiler.declaration();
    }
    compiler.emit_byte(OpCode::Return);

    if compiler.had_error {
        Err(compiler.errors)
    } else {
        Ok(compiler.chunk)
    }
}

// Token plumbing and error reporting.
impl<'src, 'heap> Compiler<'src, 'heap> {
    fn advance(&mut self) {
        self.previous = std::mem::replace(&mut self.current, Token::empty());
        loop {
            self.current = self.scanner.scan_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            let message = self.current.lexeme.clone();
            self.error_at_current(&message);
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
        } else {
            self.error_at_current(message);
        }
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn error(&mut self, message: &str) {
        let token = self.previous.clone();
        self.error_at(&token, message);
    }

    fn error_at_current(&mut self, message: &str) {
        let token = self.current.clone();
        self.error_at(&token, message);
    }

    /// Records a diagnostic and enters panic mode; while panicking, further
    /// diagnostics are swallowed until `synchronize` runs.
    fn error_at(&mut self, token: &Token, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        let location = match token.kind {
            TokenKind::Eof => ErrorLocation::AtEnd,
            TokenKind::Error => ErrorLocation::Bare,
            _ => ErrorLocation::At(token.lexeme.clone()),
        };
        self.errors.push(CompileError {
            line: token.line,
            location,
            message: message.to_string(),
        });
    }

    /// Skips tokens until a statement boundary so one mistake produces one
    /// diagnostic instead of a cascade.
    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Fun
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => self.advance(),
            }
        }
    }
}

// Bytecode emission.
impl<'src, 'heap> Compiler<'src, 'heap> {
    fn emit_byte(&mut self, byte: impl Into<u8>) {
        let line = self.previous.line;
        self.chunk.write(byte, line);
    }

    fn emit_bytes(&mut self, first: impl Into<u8>, second: impl Into<u8>) {
        self.emit_byte(first);
        self.emit_byte(second);
    }

    fn emit_constant(&mut self, value: Value) {
        let index = self.make_constant(value);
        self.emit_bytes(OpCode::Constant, index);
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        let index = self.chunk.add_constant(value);
        if index > u8::MAX as usize {
            self.error("Too many constants in one chunk.");
            return 0;
        }
        index as u8
    }

    fn identifier_constant(&mut self, name: &str) -> u8 {
        let obj = self.strings.intern(name.to_string());
        self.make_constant(Value::Obj(obj))
    }
}

// Declarations and statements.
impl<'src, 'heap> Compiler<'src, 'heap> {
    fn declaration(&mut self) {
        if self.matches(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }
        if self.panic_mode {
            self.synchronize();
        }
    }

    fn statement(&mut self) {
        if self.matches(TokenKind::Print) {
            self.print_statement();
        } else if self.matches(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");

        if self.matches(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit_byte(OpCode::Nil);
        }
        self.consume(
            TokenKind::Semicolon,
            "Expect ';' after variable declaration.",
        );

        self.define_variable(global);
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after value.");
        self.emit_byte(OpCode::Print);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        self.emit_byte(OpCode::Pop);
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.");
    }

    fn begin_scope(&mut self) {
        self.scope_depth += 1;
    }

    /// Closing a block discards its locals from the runtime stack, so the
    /// stack height on exit matches the height on entry.
    fn end_scope(&mut self) {
        self.scope_depth -= 1;
        while self
            .locals
            .last()
            .is_some_and(|local| local.depth > self.scope_depth)
        {
            self.emit_byte(OpCode::Pop);
            self.locals.pop();
        }
    }
}

// Variable handling.
impl<'src, 'heap> Compiler<'src, 'heap> {
    /// Consumes the name. For globals, returns the constant-pool index of
    /// the interned name; for locals, records the declaration and returns a
    /// dummy, since locals are addressed by stack slot.
    fn parse_variable(&mut self, error_message: &str) -> u8 {
        self.consume(TokenKind::Identifier, error_message);

        self.declare_variable();
        if self.scope_depth > 0 {
            return 0;
        }

        let name = self.previous.lexeme.clone();
        self.identifier_constant(&name)
    }

    fn declare_variable(&mut self) {
        if self.scope_depth == 0 {
            return;
        }
        let name = self.previous.lexeme.clone();

        let mut duplicate = false;
        for local in self.locals.iter().rev() {
            if local.depth != UNINITIALIZED && local.depth < self.scope_depth {
                break;
            }
            if local.name == name {
                duplicate = true;
                break;
            }
        }
        if duplicate {
            self.error("Already a variable with this name in this scope.");
        }

        self.add_local(name);
    }

    fn add_local(&mut self, name: String) {
        if self.locals.len() == LOCALS_MAX {
            self.error("Too many local variables in function.");
            return;
        }
        self.locals.push(Local {
            name,
            depth: UNINITIALIZED,
        });
    }

    fn define_variable(&mut self, global: u8) {
        if self.scope_depth > 0 {
            // The initializer's value is already sitting in the local's
            // stack slot; it just becomes readable now.
            self.mark_initialized();
            return;
        }
        self.emit_bytes(OpCode::DefineGlobal, global);
    }

    fn mark_initialized(&mut self) {
        if let Some(local) = self.locals.last_mut() {
            local.depth = self.scope_depth;
        }
    }

    /// Walks the locals top-down so shadowing declarations win. `None`
    /// means the name resolves as a global.
    fn resolve_local(&mut self, name: &str) -> Option<u8> {
        let mut hit = None;
        for (slot, local) in self.locals.iter().enumerate().rev() {
            if local.name == name {
                hit = Some((slot, local.depth == UNINITIALIZED));
                break;
            }
        }
        let (slot, uninitialized) = hit?;
        if uninitialized {
            self.error("Cannot read local variable in its own initializer.");
        }
        Some(slot as u8)
    }

    fn named_variable(&mut self, name: &str, can_assign: bool) {
        let (get_op, set_op, arg) = match self.resolve_local(name) {
            Some(slot) => (OpCode::GetLocal, OpCode::SetLocal, slot),
            None => {
                let index = self.identifier_constant(name);
                (OpCode::GetGlobal, OpCode::SetGlobal, index)
            }
        };

        if can_assign && self.matches(TokenKind::Equal) {
            self.expression();
            self.emit_bytes(set_op, arg);
        } else {
            self.emit_bytes(get_op, arg);
        }
    }
}

// Expressions.
impl<'src, 'heap> Compiler<'src, 'heap> {
    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let Some(prefix) = rule(self.previous.kind).prefix() else {
            self.error("Expect expression.");
            return;
        };

        let can_assign = precedence <= Precedence::Assignment;
        prefix(self, can_assign);

        while precedence <= rule(self.current.kind).precedence() {
            self.advance();
            if let Some(infix) = rule(self.previous.kind).infix() {
                infix(self, can_assign);
            }
        }

        // A leftover `=` here means the prefix expression was not a valid
        // assignment target (or assignment is not allowed at this level).
        if can_assign && self.matches(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    fn number(&mut self, _can_assign: bool) {
        let value: f64 = self
            .previous
            .lexeme
            .parse()
            .expect("scanner admits only valid number literals");
        self.emit_constant(Value::Number(value));
    }

    fn string(&mut self, _can_assign: bool) {
        let lexeme = &self.previous.lexeme;
        let text = lexeme[1..lexeme.len() - 1].to_string();
        let obj = self.strings.intern(text);
        self.emit_constant(Value::Obj(obj));
    }

    fn literal(&mut self, _can_assign: bool) {
        match self.previous.kind {
            TokenKind::Nil => self.emit_byte(OpCode::Nil),
            TokenKind::True => self.emit_byte(OpCode::True),
            TokenKind::False => self.emit_byte(OpCode::False),
            _ => unreachable!("literal rule on non-literal token"),
        }
    }

    fn variable(&mut self, can_assign: bool) {
        let name = self.previous.lexeme.clone();
        self.named_variable(&name, can_assign);
    }

    fn grouping(&mut self, _can_assign: bool) {
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after expression.");
    }

    fn unary(&mut self, _can_assign: bool) {
        let operator = self.previous.kind;

        self.parse_precedence(Precedence::Unary);

        match operator {
            TokenKind::Bang => self.emit_byte(OpCode::Not),
            TokenKind::Minus => self.emit_byte(OpCode::Negate),
            _ => unreachable!("unary rule on non-operator token"),
        }
    }

    /// The left operand is already compiled; compile the right operand one
    /// precedence level up (left associativity), then emit the operator.
    fn binary(&mut self, _can_assign: bool) {
        let operator = self.previous.kind;

        self.parse_precedence(rule(operator).precedence().next());

        match operator {
            TokenKind::BangEqual => self.emit_bytes(OpCode::Equal, OpCode::Not),
            TokenKind::EqualEqual => self.emit_byte(OpCode::Equal),
            TokenKind::Greater => self.emit_byte(OpCode::Greater),
            TokenKind::GreaterEqual => self.emit_bytes(OpCode::Less, OpCode::Not),
            TokenKind::Less => self.emit_byte(OpCode::Less),
            TokenKind::LessEqual => self.emit_bytes(OpCode::Greater, OpCode::Not),
            TokenKind::Plus => self.emit_byte(OpCode::Add),
            TokenKind::Minus => self.emit_byte(OpCode::Subtract),
            TokenKind::Star => self.emit_byte(OpCode::Multiply),
            TokenKind::Slash => self.emit_byte(OpCode::Divide),
            _ => unreachable!("binary rule on non-operator token"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_ok(source: &str) -> Chunk {
        let mut strings = Table::new();
        compile(source, &mut strings).expect("source should compile")
    }

    fn compile_err(source: &str) -> Vec<CompileError> {
        let mut strings = Table::new();
        compile(source, &mut strings).expect_err("source should not compile")
    }

    fn op(code: OpCode) -> u8 {
        code as u8
    }

    #[test]
    fn arithmetic_respects_precedence() {
        // 1 + 2 * 3 compiles the multiplication first.
        let chunk = compile_ok("1 + 2 * 3;");
        assert_eq!(
            chunk.code,
            vec![
                op(OpCode::Constant), 0,
                op(OpCode::Constant), 1,
                op(OpCode::Constant), 2,
                op(OpCode::Multiply),
                op(OpCode::Add),
                op(OpCode::Pop),
                op(OpCode::Return),
            ]
        );
        assert_eq!(chunk.constants.len(), 3);
    }

    #[test]
    fn grouping_overrides_precedence() {
        let chunk = compile_ok("(1 + 2) * 3;");
        assert_eq!(
            chunk.code,
            vec![
                op(OpCode::Constant), 0,
                op(OpCode::Constant), 1,
                op(OpCode::Add),
                op(OpCode::Constant), 2,
                op(OpCode::Multiply),
                op(OpCode::Pop),
                op(OpCode::Return),
            ]
        );
    }

    #[test]
    fn desugared_comparisons_emit_two_opcodes() {
        let chunk = compile_ok("1 <= 2;");
        assert_eq!(
            chunk.code,
            vec![
                op(OpCode::Constant), 0,
                op(OpCode::Constant), 1,
                op(OpCode::Greater),
                op(OpCode::Not),
                op(OpCode::Pop),
                op(OpCode::Return),
            ]
        );
        let chunk = compile_ok("1 != 2;");
        assert!(chunk.code.ends_with(&[
            op(OpCode::Equal),
            op(OpCode::Not),
            op(OpCode::Pop),
            op(OpCode::Return)
        ]));
    }

    #[test]
    fn unary_binds_tighter_than_binary() {
        // -1 - 2 is (-1) - 2.
        let chunk = compile_ok("-1 - 2;");
        assert_eq!(
            chunk.code,
            vec![
                op(OpCode::Constant), 0,
                op(OpCode::Negate),
                op(OpCode::Constant), 1,
                op(OpCode::Subtract),
                op(OpCode::Pop),
                op(OpCode::Return),
            ]
        );
    }

    #[test]
    fn global_declaration_without_initializer_defaults_to_nil() {
        let chunk = compile_ok("var a;");
        assert_eq!(
            chunk.code,
            vec![
                op(OpCode::Nil),
                op(OpCode::DefineGlobal), 0,
                op(OpCode::Return),
            ]
        );
        assert_eq!(chunk.constants.len(), 1);
    }

    #[test]
    fn local_declaration_emits_no_define() {
        let chunk = compile_ok("{ var a = 1; print a; }");
        assert_eq!(
            chunk.code,
            vec![
                op(OpCode::Constant), 0,   // initializer stays in slot 0
                op(OpCode::GetLocal), 0,
                op(OpCode::Print),
                op(OpCode::Pop),           // scope exit discards the local
                op(OpCode::Return),
            ]
        );
    }

    #[test]
    fn shadowed_local_resolves_to_innermost_slot() {
        let chunk = compile_ok("{ var a = 1; { var a = 2; print a; } }");
        let code = chunk.code;
        // The inner print reads slot 1, not slot 0.
        let print_at = code
            .iter()
            .position(|&b| b == op(OpCode::Print))
            .expect("print emitted");
        assert_eq!(code[print_at - 2], op(OpCode::GetLocal));
        assert_eq!(code[print_at - 1], 1);
    }

    #[test]
    fn assignment_leaves_value_for_enclosing_expression() {
        // The assigned value is left on the stack and discarded by the
        // statement's own Pop; SetGlobal itself pops nothing.
        let chunk = compile_ok("var a; a = 2;");
        assert!(chunk.code.ends_with(&[
            op(OpCode::Constant), 2,
            op(OpCode::SetGlobal), 1,
            op(OpCode::Pop),
            op(OpCode::Return),
        ]));
    }

    #[test]
    fn identifier_names_are_interned_across_mentions() {
        let mut strings = Table::new();
        let chunk = compile("var a = 1; a = a + 1;", &mut strings).expect("compiles");
        let handles: Vec<_> = chunk
            .constants
            .iter()
            .filter_map(|c| match c {
                Value::Obj(obj) => Some(std::rc::Rc::clone(obj)),
                _ => None,
            })
            .collect();
        assert!(handles.len() >= 2);
        for pair in handles.windows(2) {
            assert!(std::rc::Rc::ptr_eq(&pair[0], &pair[1]));
        }
    }

    #[test]
    fn line_table_tracks_source_lines() {
        let chunk = compile_ok("1;\n2;");
        assert_eq!(chunk.code.len(), chunk.lines.len());
        assert_eq!(chunk.lines[0], 1);
        let second_constant = 3; // Constant, index, Pop, Constant
        assert_eq!(chunk.lines[second_constant], 2);
    }

    #[test]
    fn missing_expression() {
        let errors = compile_err("print ;");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Expect expression.");
        assert_eq!(errors[0].to_string(), "[line 1] Error at ';': Expect expression.");
    }

    #[test]
    fn error_at_end_of_source() {
        let errors = compile_err("print 1");
        assert_eq!(errors[0].to_string(), "[line 1] Error at end: Expect ';' after value.");
    }

    #[test]
    fn invalid_assignment_target() {
        let errors = compile_err("1 + 2 = 3;");
        assert_eq!(errors[0].message, "Invalid assignment target.");
    }

    #[test]
    fn duplicate_local_in_same_scope() {
        let errors = compile_err("{ var a = 1; var a = 2; }");
        assert_eq!(
            errors[0].message,
            "Already a variable with this name in this scope."
        );
    }

    #[test]
    fn local_read_in_its_own_initializer() {
        let errors = compile_err("{ var a = a; }");
        assert_eq!(
            errors[0].message,
            "Cannot read local variable in its own initializer."
        );
    }

    #[test]
    fn top_level_self_reference_compiles_to_global_lookup() {
        // At depth 0 the name is not a local, so `var x = x;` defers to the
        // runtime undefined-variable check.
        let chunk = compile_ok("var x = x;");
        assert_eq!(chunk.code[0], op(OpCode::GetGlobal));
    }

    #[test]
    fn scan_error_becomes_compile_error_without_location() {
        let errors = compile_err("var a = @;");
        assert_eq!(
            errors[0].to_string(),
            "[line 1] Error: Unexpected character: '@'"
        );
    }

    #[test]
    fn unterminated_string_reports_its_line() {
        let errors = compile_err("print 1;\nprint \"broken;");
        assert_eq!(errors[0].line, 2);
        assert_eq!(errors[0].message, "Unterminated string.");
    }

    #[test]
    fn panic_mode_recovers_at_statement_boundaries() {
        // One diagnostic per broken statement, not a cascade from the first.
        let errors = compile_err("print ;\nprint ;\nvar 1;");
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].line, 1);
        assert_eq!(errors[1].line, 2);
        assert_eq!(errors[2].message, "Expect variable name.");
    }

    #[test]
    fn too_many_constants_in_one_chunk() {
        let mut source = String::new();
        for i in 0..300 {
            source.push_str(&format!("{};", i));
        }
        let errors = compile_err(&source);
        assert!(errors
            .iter()
            .any(|e| e.message == "Too many constants in one chunk."));
    }

    #[test]
    fn too_many_locals_in_one_scope() {
        // Bare declarations emit Nil instead of a constant, so the locals
        // limit is reachable without first exhausting the constant pool.
        let mut source = String::from("{");
        for i in 0..=LOCALS_MAX {
            source.push_str(&format!(" var l{};", i));
        }
        source.push('}');
        let errors = compile_err(&source);
        assert!(errors
            .iter()
            .any(|e| e.message == "Too many local variables in function."));
    }

    #[test]
    fn block_scoped_locals_do_not_leak() {
        let chunk = compile_ok("{ var a = 1; } { var b = 2; print b; }");
        // Both blocks use slot 0; `a` was popped before `b` was declared.
        let gets: Vec<usize> = chunk
            .code
            .iter()
            .enumerate()
            .filter(|(_, &b)| b == op(OpCode::GetLocal))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(gets.len(), 1);
        assert_eq!(chunk.code[gets[0] + 1], 0);
    }
}
