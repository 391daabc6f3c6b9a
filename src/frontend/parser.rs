use thiserror::Error;

use super::{
    SourceFile,
    ast::{
        BinaryOperator, BinaryOperatorKind, Block, Expression, ExpressionKind, ForInitializer,
        ForStatement, FunctionDecl, Identifier, IfStatement, Item, ItemKind, Literal, LiteralKind,
        Parameter, PrintStatement, Program, Statement, StatementKind, TypeAnnotation,
        TypeAnnotationKind, UnaryOperator, UnaryOperatorKind, VariableDecl, WhileStatement,
    },
    intern::InternedSymbol,
    lexer::{Keyword, Span, Token, TokenKind},
};

/// Single-pass recursive descent over a complete token list. The first
/// structural violation aborts the parse; there is no recovery or
/// resynchronization.
#[derive(Debug)]
pub struct Parser<'source> {
    source: &'source SourceFile,
    tokens: Vec<Token>,
    position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}:{column}: expected {expected} but found `{found}`")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    /// Lexeme of the offending token (`end of input` at EOF)
    pub found: String,
    /// Human description of the construct that was required
    pub expected: String,
}

impl<'source> Parser<'source> {
    /// Parses a whole program, consuming every token up to `Eof`.
    pub fn parse(source: &'source SourceFile, tokens: Vec<Token>) -> Result<Program, ParseError> {
        let mut parser = Self {
            source,
            tokens,
            position: 0,
        };

        let mut items = Vec::new();

        while parser.peek().kind != TokenKind::Eof {
            items.push(parser.parse_item()?);
        }

        Ok(Program { items })
    }

    fn peek(&self) -> Token {
        self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn peek_nth(&self, n: usize) -> Token {
        self.tokens[(self.position + n).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek();

        if token.kind != TokenKind::Eof {
            self.position += 1;
        }

        token
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    /// End offset of the most recently consumed token, used to stitch spans
    fn previous_end(&self) -> usize {
        self.tokens[self.position.saturating_sub(1)].span.end
    }

    fn lexeme_of(&self, token: Token) -> String {
        if token.kind == TokenKind::Eof {
            "end of input".to_owned()
        } else {
            self.source.value_of_span(token.span).to_owned()
        }
    }

    fn error(&self, token: Token, expected: impl Into<String>) -> ParseError {
        ParseError {
            line: token.line,
            column: token.column,
            found: self.lexeme_of(token),
            expected: expected.into(),
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(self.peek(), expected))
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword, expected: &str) -> Result<Token, ParseError> {
        self.expect(TokenKind::Keyword(keyword), expected)
    }

    fn parse_item(&mut self) -> Result<Item, ParseError> {
        let start = self.peek().span.start;

        let kind = match self.peek().kind {
            TokenKind::Keyword(Keyword::Import) => {
                self.advance();
                let name = self.parse_identifier()?;
                self.expect(TokenKind::Semicolon, "`;` after import")?;

                ItemKind::Import(name)
            }
            TokenKind::Keyword(Keyword::Fun) => {
                ItemKind::Function(Box::new(self.parse_function_decl()?))
            }
            TokenKind::Keyword(Keyword::Var | Keyword::Val) => {
                ItemKind::Variable(Box::new(self.parse_variable_decl()?))
            }
            _ => ItemKind::Statement(self.parse_statement()?),
        };

        Ok(Item {
            span: Span::new(start, self.previous_end()),
            kind,
        })
    }

    /// fun name(param: ty, ...): return_type { ... }
    fn parse_function_decl(&mut self) -> Result<FunctionDecl, ParseError> {
        let fun_keyword = self.expect_keyword(Keyword::Fun, "`fun`")?;

        let name = self.parse_identifier()?;

        self.expect(TokenKind::OpenParen, "`(` after the function name")?;

        let mut parameters = Vec::new();

        if !self.check(TokenKind::CloseParen) {
            parameters.push(self.parse_parameter()?);

            while self.check(TokenKind::Comma) {
                self.advance();
                parameters.push(self.parse_parameter()?);
            }
        }

        self.expect(TokenKind::CloseParen, "`)` after the parameter list")?;

        let return_type = if self.check(TokenKind::Colon) {
            self.advance();
            Some(self.parse_type()?)
        } else {
            None
        };

        let body = self.parse_block()?;

        Ok(FunctionDecl {
            span: Span::new(fun_keyword.span.start, body.span.end),
            name,
            parameters,
            return_type,
            body,
        })
    }

    fn parse_parameter(&mut self) -> Result<Parameter, ParseError> {
        let name = self.parse_identifier()?;
        self.expect(TokenKind::Colon, "`:` after the parameter name")?;
        let ty = self.parse_type()?;

        Ok(Parameter {
            span: Span::new(name.span.start, ty.span.end),
            name,
            ty,
        })
    }

    /// ("var" | "val") name (":" type)? ("=" initializer)? ";"
    fn parse_variable_decl(&mut self) -> Result<VariableDecl, ParseError> {
        let binding = self.advance();
        let is_constant = binding.kind == TokenKind::Keyword(Keyword::Val);

        let name = self.parse_identifier()?;

        let ty = if self.check(TokenKind::Colon) {
            self.advance();
            Some(self.parse_type()?)
        } else {
            None
        };

        let initializer = if self.check(TokenKind::Equals) {
            self.advance();
            Some(self.parse_expression()?)
        } else {
            None
        };

        self.expect(TokenKind::Semicolon, "`;` after the variable declaration")?;

        Ok(VariableDecl {
            span: Span::new(binding.span.start, self.previous_end()),
            is_constant,
            name,
            ty,
            initializer,
        })
    }

    fn parse_type(&mut self) -> Result<TypeAnnotation, ParseError> {
        let token = self.peek();

        let kind = match token.kind {
            TokenKind::Keyword(Keyword::Int) => TypeAnnotationKind::Int,
            TokenKind::Keyword(Keyword::Str) => TypeAnnotationKind::Str,
            TokenKind::Keyword(Keyword::Bool) => TypeAnnotationKind::Bool,
            TokenKind::Identifier => {
                TypeAnnotationKind::Named(InternedSymbol::new(self.source.value_of_span(token.span)))
            }
            _ => return Err(self.error(token, "a type name")),
        };

        self.advance();

        Ok(TypeAnnotation {
            span: token.span,
            kind,
        })
    }

    fn parse_identifier(&mut self) -> Result<Identifier, ParseError> {
        let token = self.expect(TokenKind::Identifier, "an identifier")?;

        Ok(Identifier {
            span: token.span,
            symbol: InternedSymbol::new(self.source.value_of_span(token.span)),
        })
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let start = self.peek().span.start;

        let kind = match self.peek().kind {
            TokenKind::Keyword(Keyword::Print | Keyword::Println) => {
                StatementKind::Print(Box::new(self.parse_print_statement()?))
            }
            TokenKind::Keyword(Keyword::If) => StatementKind::If(Box::new(self.parse_if_statement()?)),
            TokenKind::Keyword(Keyword::For) => {
                StatementKind::For(Box::new(self.parse_for_statement()?))
            }
            TokenKind::Keyword(Keyword::While) => {
                StatementKind::While(Box::new(self.parse_while_statement()?))
            }
            TokenKind::Keyword(Keyword::Return) => {
                self.advance();

                let value = if self.check(TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };

                self.expect(TokenKind::Semicolon, "`;` after return")?;

                StatementKind::Return(value)
            }
            TokenKind::Keyword(Keyword::Var | Keyword::Val) => {
                StatementKind::Variable(Box::new(self.parse_variable_decl()?))
            }
            TokenKind::OpenBrace => StatementKind::Block(Box::new(self.parse_block()?)),
            _ => {
                let expression = self.parse_expression()?;
                self.expect(TokenKind::Semicolon, "`;` after the expression")?;

                StatementKind::Expression(expression)
            }
        };

        Ok(Statement {
            span: Span::new(start, self.previous_end()),
            kind,
        })
    }

    /// ("print" | "println") "(" value? ")" ";"
    fn parse_print_statement(&mut self) -> Result<PrintStatement, ParseError> {
        let keyword = self.advance();
        let newline = keyword.kind == TokenKind::Keyword(Keyword::Println);

        self.expect(TokenKind::OpenParen, "`(` after print")?;

        let value = if self.check(TokenKind::CloseParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };

        self.expect(TokenKind::CloseParen, "`)` after the print argument")?;
        self.expect(TokenKind::Semicolon, "`;` after print")?;

        Ok(PrintStatement { newline, value })
    }

    fn parse_if_statement(&mut self) -> Result<IfStatement, ParseError> {
        self.expect_keyword(Keyword::If, "`if`")?;
        self.expect(TokenKind::OpenParen, "`(` after if")?;

        let condition = self.parse_expression()?;

        self.expect(TokenKind::CloseParen, "`)` after the if condition")?;

        let then_block = self.parse_block()?;

        let else_block = if self.check(TokenKind::Keyword(Keyword::Else)) {
            self.advance();
            Some(self.parse_block()?)
        } else {
            None
        };

        Ok(IfStatement {
            condition,
            then_block,
            else_block,
        })
    }

    /// for "(" init? ";" condition? ";" increment? ")" { ... }
    ///
    /// A declaration initializer supplies its own `;`; an expression
    /// initializer (or an empty one) is terminated by the explicit `;`.
    fn parse_for_statement(&mut self) -> Result<ForStatement, ParseError> {
        self.expect_keyword(Keyword::For, "`for`")?;
        self.expect(TokenKind::OpenParen, "`(` after for")?;

        let initializer = match self.peek().kind {
            TokenKind::Semicolon => {
                self.advance();
                None
            }
            TokenKind::Keyword(Keyword::Var | Keyword::Val) => Some(ForInitializer::Variable(
                Box::new(self.parse_variable_decl()?),
            )),
            _ => {
                let expression = self.parse_expression()?;
                self.expect(TokenKind::Semicolon, "`;` after the for initializer")?;

                Some(ForInitializer::Expression(expression))
            }
        };

        let condition = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };

        self.expect(TokenKind::Semicolon, "`;` after the for condition")?;

        let increment = if self.check(TokenKind::CloseParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };

        self.expect(TokenKind::CloseParen, "`)` after the for clauses")?;

        let body = self.parse_block()?;

        Ok(ForStatement {
            initializer,
            condition,
            increment,
            body,
        })
    }

    fn parse_while_statement(&mut self) -> Result<WhileStatement, ParseError> {
        self.expect_keyword(Keyword::While, "`while`")?;
        self.expect(TokenKind::OpenParen, "`(` after while")?;

        let condition = self.parse_expression()?;

        self.expect(TokenKind::CloseParen, "`)` after the while condition")?;

        let body = self.parse_block()?;

        Ok(WhileStatement { condition, body })
    }

    fn parse_block(&mut self) -> Result<Block, ParseError> {
        let open = self.expect(TokenKind::OpenBrace, "`{` to open a block")?;

        let mut statements = Vec::new();

        while !self.check(TokenKind::CloseBrace) && !self.check(TokenKind::Eof) {
            statements.push(self.parse_statement()?);
        }

        self.expect(TokenKind::CloseBrace, "`}` to close the block")?;

        Ok(Block {
            span: Span::new(open.span.start, self.previous_end()),
            statements,
        })
    }

    fn parse_expression(&mut self) -> Result<Expression, ParseError> {
        // `name = ...` is an assignment; `name ==` and every other identifier
        // use falls through to the operator levels
        if self.check(TokenKind::Identifier) && self.peek_nth(1).kind == TokenKind::Equals {
            let target = self.parse_identifier()?;
            self.advance(); // `=`
            let value = self.parse_expression()?;

            return Ok(Expression {
                span: Span::new(target.span.start, value.span.end),
                kind: ExpressionKind::Assignment {
                    target,
                    value: Box::new(value),
                },
            });
        }

        self.parse_logic_or()
    }

    fn new_binary(
        &self,
        lhs: Expression,
        operator_span: Span,
        kind: BinaryOperatorKind,
        rhs: Expression,
    ) -> Expression {
        Expression {
            span: Span::new(lhs.span.start, rhs.span.end),
            kind: ExpressionKind::Binary {
                lhs: Box::new(lhs),
                operator: BinaryOperator {
                    span: operator_span,
                    kind,
                },
                rhs: Box::new(rhs),
            },
        }
    }

    fn parse_logic_or(&mut self) -> Result<Expression, ParseError> {
        let mut expression = self.parse_logic_and()?;

        while self.check(TokenKind::Keyword(Keyword::Or)) {
            let operator = self.advance();
            let rhs = self.parse_logic_and()?;
            expression = self.new_binary(expression, operator.span, BinaryOperatorKind::Or, rhs);
        }

        Ok(expression)
    }

    fn parse_logic_and(&mut self) -> Result<Expression, ParseError> {
        let mut expression = self.parse_equality()?;

        while self.check(TokenKind::Keyword(Keyword::And)) {
            let operator = self.advance();
            let rhs = self.parse_equality()?;
            expression = self.new_binary(expression, operator.span, BinaryOperatorKind::And, rhs);
        }

        Ok(expression)
    }

    fn parse_equality(&mut self) -> Result<Expression, ParseError> {
        let mut expression = self.parse_comparison()?;

        while self.peek().kind.is_equality_operator() {
            let operator = self.advance();
            let kind = match operator.kind {
                TokenKind::DoubleEquals => BinaryOperatorKind::Equals,
                _ => BinaryOperatorKind::NotEquals,
            };

            let rhs = self.parse_comparison()?;
            expression = self.new_binary(expression, operator.span, kind, rhs);
        }

        Ok(expression)
    }

    fn parse_comparison(&mut self) -> Result<Expression, ParseError> {
        let mut expression = self.parse_additive()?;

        while self.peek().kind.is_comparison_operator() {
            let operator = self.advance();
            let kind = match operator.kind {
                TokenKind::LessThan => BinaryOperatorKind::LessThan,
                TokenKind::GreaterThan => BinaryOperatorKind::GreaterThan,
                TokenKind::LessThanOrEqualTo => BinaryOperatorKind::LessThanOrEqualTo,
                _ => BinaryOperatorKind::GreaterThanOrEqualTo,
            };

            let rhs = self.parse_additive()?;
            expression = self.new_binary(expression, operator.span, kind, rhs);
        }

        Ok(expression)
    }

    fn parse_additive(&mut self) -> Result<Expression, ParseError> {
        let mut expression = self.parse_multiplicative()?;

        while self.peek().kind.is_additive_operator() {
            let operator = self.advance();
            let kind = match operator.kind {
                TokenKind::Plus => BinaryOperatorKind::Add,
                _ => BinaryOperatorKind::Subtract,
            };

            let rhs = self.parse_multiplicative()?;
            expression = self.new_binary(expression, operator.span, kind, rhs);
        }

        Ok(expression)
    }

    fn parse_multiplicative(&mut self) -> Result<Expression, ParseError> {
        let mut expression = self.parse_unary()?;

        while self.peek().kind.is_multiplicative_operator() {
            let operator = self.advance();
            let kind = match operator.kind {
                TokenKind::Asterisk => BinaryOperatorKind::Multiply,
                _ => BinaryOperatorKind::Divide,
            };

            let rhs = self.parse_unary()?;
            expression = self.new_binary(expression, operator.span, kind, rhs);
        }

        Ok(expression)
    }

    /// ("not" | "-") primary | primary
    fn parse_unary(&mut self) -> Result<Expression, ParseError> {
        let kind = match self.peek().kind {
            TokenKind::Keyword(Keyword::Not) => Some(UnaryOperatorKind::Not),
            TokenKind::Minus => Some(UnaryOperatorKind::Negate),
            _ => None,
        };

        let Some(kind) = kind else {
            return self.parse_primary();
        };

        let operator = self.advance();
        let operand = self.parse_primary()?;

        Ok(Expression {
            span: Span::new(operator.span.start, operand.span.end),
            kind: ExpressionKind::Unary {
                operator: UnaryOperator {
                    span: operator.span,
                    kind,
                },
                operand: Box::new(operand),
            },
        })
    }

    fn parse_primary(&mut self) -> Result<Expression, ParseError> {
        let token = self.peek();

        match token.kind {
            TokenKind::NumberLiteral => Ok(self.literal_expression(LiteralKind::Number)),
            TokenKind::StringLiteral => Ok(self.literal_expression(LiteralKind::String)),
            TokenKind::Keyword(Keyword::True | Keyword::False) => {
                Ok(self.literal_expression(LiteralKind::Boolean))
            }
            TokenKind::OpenParen => {
                let open = self.advance();
                let inner = self.parse_expression()?;
                self.expect(TokenKind::CloseParen, "`)` after the expression")?;

                Ok(Expression {
                    span: Span::new(open.span.start, self.previous_end()),
                    kind: ExpressionKind::Grouping(Box::new(inner)),
                })
            }
            TokenKind::Identifier if self.peek_nth(1).kind == TokenKind::OpenParen => {
                self.parse_function_call()
            }
            TokenKind::Identifier => {
                let identifier = self.parse_identifier()?;

                Ok(Expression {
                    span: identifier.span,
                    kind: ExpressionKind::Identifier(identifier),
                })
            }
            _ => Err(self.error(token, "an expression")),
        }
    }

    fn literal_expression(&mut self, kind: LiteralKind) -> Expression {
        let token = self.advance();

        Expression {
            span: token.span,
            kind: ExpressionKind::Literal(Box::new(Literal {
                span: token.span,
                kind,
                symbol: InternedSymbol::new(self.source.value_of_span(token.span)),
            })),
        }
    }

    fn parse_function_call(&mut self) -> Result<Expression, ParseError> {
        let callee = self.parse_identifier()?;

        self.expect(TokenKind::OpenParen, "`(` after the function name")?;

        let mut arguments = Vec::new();

        if !self.check(TokenKind::CloseParen) {
            arguments.push(self.parse_expression()?);

            while self.check(TokenKind::Comma) {
                self.advance();
                arguments.push(self.parse_expression()?);
            }
        }

        self.expect(TokenKind::CloseParen, "`)` after the argument list")?;

        Ok(Expression {
            span: Span::new(callee.span.start, self.previous_end()),
            kind: ExpressionKind::FunctionCall { callee, arguments },
        })
    }
}
