//! Sirius Semantic Analyzer
//!
//! A single depth-first walk over the syntax tree with an explicit scope
//! stack: scopes are pushed on entering function, `if`, `for`, `while`, and
//! bare block bodies and popped on leaving, in strict LIFO order. Unlike the
//! parser, the analyzer never stops at the first problem — every violation is
//! appended to an error list and the walk continues, so one run surfaces
//! every error in the program.
//!
//! Each expression's type is inferred bottom-up. An operand that already
//! failed types as [`Ty::Error`], which suppresses any further checks at the
//! enclosing node so a single mistake is reported exactly once.

use std::collections::{BTreeMap, VecDeque};

use tracing::{debug, trace};

use crate::{
    frontend::{
        SourceFile,
        ast::{
            BinaryOperatorClass, Block, Expression, ExpressionKind, ForInitializer, FunctionDecl,
            Item, ItemKind, LiteralKind, Program, Statement, StatementKind, UnaryOperatorKind,
            VariableDecl,
        },
        intern::InternedSymbol,
        lexer::Span,
    },
    middle::ty::Ty,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemanticError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl core::fmt::Display for SemanticError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}:{}: {}", self.line, self.column, self.message)
    }
}

/// What the analyzer knows about a declared variable
#[derive(Debug, Clone, Copy)]
pub struct SymbolInfo {
    pub ty: Ty,
    pub is_constant: bool,
    pub is_initialized: bool,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub return_type: Ty,
    pub parameters: Vec<ParameterInfo>,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct ParameterInfo {
    pub name: InternedSymbol,
    pub ty: Ty,
}

#[derive(Debug)]
pub struct SemanticAnalyzer<'source> {
    source: &'source SourceFile,
    scopes: ScopeStack,
    functions: BTreeMap<InternedSymbol, FunctionInfo>,
    /// Return type of the function whose body is being walked, if any.
    /// Functions cannot nest, so a plain `Option` suffices.
    current_return_type: Option<Ty>,
    /// Reset when entering a function body; a non-void function whose body
    /// never set it is missing a return statement
    saw_return: bool,
    errors: Vec<SemanticError>,
}

impl<'source> SemanticAnalyzer<'source> {
    /// Walks the whole tree and returns every semantic violation found.
    /// An empty list is the precondition for TAC generation.
    pub fn analyze(source: &'source SourceFile, program: &Program) -> Vec<SemanticError> {
        debug!(origin = %source.origin, "running semantic analysis");

        let mut analyzer = Self {
            source,
            scopes: ScopeStack::new(),
            functions: BTreeMap::new(),
            current_return_type: None,
            saw_return: false,
            errors: Vec::new(),
        };

        for item in &program.items {
            analyzer.visit_item(item);
        }

        debug!(errors = analyzer.errors.len(), "semantic analysis finished");

        analyzer.errors
    }

    fn report(&mut self, span: Span, message: String) {
        let error = SemanticError {
            line: self.source.row_for_position(span.start),
            column: self.source.column_for_position(span.start),
            message,
        };

        trace!(%error, "recorded semantic error");
        self.errors.push(error);
    }

    fn visit_item(&mut self, item: &Item) {
        match &item.kind {
            // Imports are accepted but carry no semantics yet
            ItemKind::Import(_) => {}
            ItemKind::Function(function) => self.visit_function_decl(function),
            ItemKind::Variable(decl) => self.visit_variable_decl(decl),
            ItemKind::Statement(statement) => self.visit_statement(statement),
        }
    }

    fn visit_variable_decl(&mut self, decl: &VariableDecl) {
        // A name may shadow an outer scope but not be declared twice in the
        // same scope. The duplicate's initializer is not walked.
        if self.scopes.is_declared_in_current_scope(decl.name.symbol) {
            self.report(
                decl.name.span,
                format!(
                    "variable `{}` was already declared in this scope",
                    decl.name.symbol
                ),
            );
            return;
        }

        let declared = decl.ty.as_ref().map(Ty::from_annotation);
        let inferred = decl
            .initializer
            .as_ref()
            .map(|initializer| self.type_of_expression(initializer));

        let ty = match (declared, inferred) {
            (Some(declared), Some(inferred)) => {
                if !inferred.is_error() && declared != inferred {
                    self.report(
                        decl.ty.as_ref().unwrap().span,
                        format!(
                            "declared type `{declared}` does not match initializer type `{inferred}`"
                        ),
                    );
                }

                // The declaration wins so later uses don't cascade
                declared
            }
            (Some(declared), None) => declared,
            (None, Some(inferred)) => inferred,
            (None, None) => {
                self.report(
                    decl.name.span,
                    format!(
                        "cannot infer a type for `{}` without a type annotation or initializer",
                        decl.name.symbol
                    ),
                );

                Ty::Error
            }
        };

        self.scopes.declare(
            decl.name.symbol,
            SymbolInfo {
                ty,
                is_constant: decl.is_constant,
                is_initialized: decl.initializer.is_some(),
                line: self.source.row_for_position(decl.span.start),
                column: self.source.column_for_position(decl.span.start),
            },
        );
    }

    fn visit_function_decl(&mut self, function: &FunctionDecl) {
        let name = function.name.symbol;

        if self.functions.contains_key(&name) {
            self.report(
                function.name.span,
                format!("function `{name}` was already declared"),
            );
            return;
        }

        let return_type = function
            .return_type
            .as_ref()
            .map(Ty::from_annotation)
            .unwrap_or(Ty::Void);

        let mut parameters: Vec<(InternedSymbol, Ty, Span)> = Vec::new();

        for parameter in &function.parameters {
            let symbol = parameter.name.symbol;

            if parameters.iter().any(|(name, _, _)| *name == symbol) {
                self.report(
                    parameter.name.span,
                    format!("duplicate parameter `{symbol}`"),
                );
                continue;
            }

            parameters.push((symbol, Ty::from_annotation(&parameter.ty), parameter.name.span));
        }

        // Registered before the body is walked so direct recursion resolves
        self.functions.insert(
            name,
            FunctionInfo {
                return_type,
                parameters: parameters
                    .iter()
                    .map(|(name, ty, _)| ParameterInfo {
                        name: *name,
                        ty: *ty,
                    })
                    .collect(),
                line: self.source.row_for_position(function.span.start),
                column: self.source.column_for_position(function.span.start),
            },
        );

        // Parameters and body statements share the function's scope, so a
        // body declaration reusing a parameter name is a redeclaration
        self.scopes.push_scope();
        self.current_return_type = Some(return_type);
        self.saw_return = false;

        for (symbol, ty, span) in parameters {
            self.scopes.declare(
                symbol,
                SymbolInfo {
                    ty,
                    is_constant: false,
                    is_initialized: true,
                    line: self.source.row_for_position(span.start),
                    column: self.source.column_for_position(span.start),
                },
            );
        }

        for statement in &function.body.statements {
            self.visit_statement(statement);
        }

        if return_type != Ty::Void && !self.saw_return {
            self.report(
                function.name.span,
                format!("function `{name}` must return a value of type `{return_type}`"),
            );
        }

        self.scopes.pop_scope();
        self.current_return_type = None;
        self.saw_return = false;
    }

    fn visit_statement(&mut self, statement: &Statement) {
        match &statement.kind {
            StatementKind::Print(print) => {
                if let Some(value) = &print.value {
                    self.type_of_expression(value);
                }
            }
            StatementKind::If(if_statement) => {
                let condition_ty = self.type_of_expression(&if_statement.condition);

                if !condition_ty.is_error() && !condition_ty.is_bool() {
                    self.report(
                        if_statement.condition.span,
                        format!("if condition must be a `bool`, found `{condition_ty}`"),
                    );
                }

                self.visit_scoped_block(&if_statement.then_block);

                if let Some(else_block) = &if_statement.else_block {
                    self.visit_scoped_block(else_block);
                }
            }
            StatementKind::While(while_statement) => {
                let condition_ty = self.type_of_expression(&while_statement.condition);

                if !condition_ty.is_error() && !condition_ty.is_bool() {
                    self.report(
                        while_statement.condition.span,
                        format!("while condition must be a `bool`, found `{condition_ty}`"),
                    );
                }

                self.visit_scoped_block(&while_statement.body);
            }
            StatementKind::For(for_statement) => {
                // The header clauses and the body share one scope, so a
                // loop variable is visible to all three clauses
                self.scopes.push_scope();

                match &for_statement.initializer {
                    Some(ForInitializer::Variable(decl)) => self.visit_variable_decl(decl),
                    Some(ForInitializer::Expression(expression)) => {
                        self.type_of_expression(expression);
                    }
                    None => {}
                }

                // An omitted condition defaults to always-true
                if let Some(condition) = &for_statement.condition {
                    let condition_ty = self.type_of_expression(condition);

                    if !condition_ty.is_error() && !condition_ty.is_bool() {
                        self.report(
                            condition.span,
                            format!("for condition must be a `bool`, found `{condition_ty}`"),
                        );
                    }
                }

                if let Some(increment) = &for_statement.increment {
                    self.type_of_expression(increment);
                }

                for body_statement in &for_statement.body.statements {
                    self.visit_statement(body_statement);
                }

                self.scopes.pop_scope();
            }
            StatementKind::Return(value) => self.visit_return(statement.span, value.as_ref()),
            StatementKind::Variable(decl) => self.visit_variable_decl(decl),
            StatementKind::Block(block) => self.visit_scoped_block(block),
            StatementKind::Expression(expression) => {
                self.type_of_expression(expression);
            }
        }
    }

    fn visit_scoped_block(&mut self, block: &Block) {
        self.scopes.push_scope();

        for statement in &block.statements {
            self.visit_statement(statement);
        }

        self.scopes.pop_scope();
    }

    fn visit_return(&mut self, span: Span, value: Option<&Expression>) {
        self.saw_return = true;

        let Some(expected) = self.current_return_type else {
            self.report(span, "return statement outside of a function".to_owned());
            return;
        };

        match value {
            None => {
                if expected != Ty::Void {
                    self.report(
                        span,
                        format!("expected a return value of type `{expected}`"),
                    );
                }
            }
            Some(value) => {
                let actual = self.type_of_expression(value);

                if expected == Ty::Void {
                    self.report(
                        span,
                        "cannot return a value from a function without a return type".to_owned(),
                    );
                } else if !actual.is_error() && actual != expected {
                    self.report(
                        value.span,
                        format!("return type mismatch: expected `{expected}` but found `{actual}`"),
                    );
                }
            }
        }
    }

    fn type_of_expression(&mut self, expression: &Expression) -> Ty {
        match &expression.kind {
            ExpressionKind::Literal(literal) => match literal.kind {
                LiteralKind::Number => {
                    if literal.symbol.value().contains('.') {
                        Ty::Float
                    } else {
                        Ty::Int
                    }
                }
                LiteralKind::String => Ty::Str,
                LiteralKind::Boolean => Ty::Bool,
            },
            ExpressionKind::Identifier(identifier) => {
                match self.scopes.lookup(identifier.symbol) {
                    Some(info) => info.ty,
                    None => {
                        self.report(
                            identifier.span,
                            format!("variable `{}` has not been declared", identifier.symbol),
                        );

                        Ty::Error
                    }
                }
            }
            ExpressionKind::Grouping(inner) => self.type_of_expression(inner),
            ExpressionKind::Assignment { target, value } => {
                let Some(info) = self.scopes.lookup(target.symbol) else {
                    self.report(
                        target.span,
                        format!("variable `{}` has not been declared", target.symbol),
                    );

                    return Ty::Error;
                };

                let (ty, is_constant) = (info.ty, info.is_constant);

                if is_constant {
                    self.report(
                        target.span,
                        format!("cannot reassign the constant `{}`", target.symbol),
                    );

                    return Ty::Error;
                }

                let value_ty = self.type_of_expression(value);

                if !value_ty.is_error() && !ty.is_error() && value_ty != ty {
                    self.report(
                        expression.span,
                        format!("cannot assign `{value_ty}` to a variable of type `{ty}`"),
                    );

                    return Ty::Error;
                }

                ty
            }
            ExpressionKind::Unary { operator, operand } => {
                let operand_ty = self.type_of_expression(operand);

                if operand_ty.is_error() {
                    return Ty::Error;
                }

                match operator.kind {
                    UnaryOperatorKind::Not => {
                        if !operand_ty.is_bool() {
                            self.report(
                                expression.span,
                                format!("operator `not` requires a `bool` operand, found `{operand_ty}`"),
                            );

                            return Ty::Error;
                        }

                        Ty::Bool
                    }
                    UnaryOperatorKind::Negate => {
                        if !operand_ty.is_numeric() {
                            self.report(
                                expression.span,
                                format!("unary `-` requires a numeric operand, found `{operand_ty}`"),
                            );

                            return Ty::Error;
                        }

                        // Negation preserves the operand's type
                        operand_ty
                    }
                }
            }
            ExpressionKind::Binary { lhs, operator, rhs } => {
                let lhs_ty = self.type_of_expression(lhs);
                let rhs_ty = self.type_of_expression(rhs);

                if lhs_ty.is_error() || rhs_ty.is_error() {
                    return Ty::Error;
                }

                match operator.kind.class() {
                    BinaryOperatorClass::Logical => {
                        if !lhs_ty.is_bool() || !rhs_ty.is_bool() {
                            self.report(
                                expression.span,
                                format!("operands of `{}` must both be `bool`", operator.kind),
                            );

                            return Ty::Error;
                        }

                        Ty::Bool
                    }
                    BinaryOperatorClass::Equality => {
                        if lhs_ty != rhs_ty {
                            self.report(
                                expression.span,
                                format!("cannot compare values of type `{lhs_ty}` and `{rhs_ty}`"),
                            );

                            return Ty::Error;
                        }

                        Ty::Bool
                    }
                    BinaryOperatorClass::Comparison => {
                        if !lhs_ty.is_numeric() || !rhs_ty.is_numeric() {
                            self.report(
                                expression.span,
                                format!(
                                    "comparison operators require numeric operands, found `{lhs_ty}` and `{rhs_ty}`"
                                ),
                            );

                            return Ty::Error;
                        }

                        Ty::Bool
                    }
                    BinaryOperatorClass::Additive => {
                        if lhs_ty != rhs_ty || !matches!(lhs_ty, Ty::Int | Ty::Float | Ty::Str) {
                            self.report(
                                expression.span,
                                format!(
                                    "operator `{}` is not valid between `{lhs_ty}` and `{rhs_ty}`",
                                    operator.kind
                                ),
                            );

                            return Ty::Error;
                        }

                        lhs_ty
                    }
                    BinaryOperatorClass::Multiplicative => {
                        if !lhs_ty.is_numeric() || !rhs_ty.is_numeric() {
                            self.report(
                                expression.span,
                                format!(
                                    "operator `{}` requires numeric operands, found `{lhs_ty}` and `{rhs_ty}`",
                                    operator.kind
                                ),
                            );

                            return Ty::Error;
                        }

                        if lhs_ty == Ty::Float || rhs_ty == Ty::Float {
                            Ty::Float
                        } else {
                            Ty::Int
                        }
                    }
                }
            }
            ExpressionKind::FunctionCall { callee, arguments } => {
                let Some(function) = self.functions.get(&callee.symbol) else {
                    self.report(
                        callee.span,
                        format!("function `{}` has not been declared", callee.symbol),
                    );

                    return Ty::Error;
                };

                let return_type = function.return_type;
                let expected: Vec<Ty> = function.parameters.iter().map(|p| p.ty).collect();

                if arguments.len() != expected.len() {
                    self.report(
                        expression.span,
                        format!(
                            "function `{}` expects {} arguments but received {}",
                            callee.symbol,
                            expected.len(),
                            arguments.len()
                        ),
                    );

                    return Ty::Error;
                }

                for (index, (argument, expected_ty)) in
                    arguments.iter().zip(expected).enumerate()
                {
                    let actual = self.type_of_expression(argument);

                    if !actual.is_error() && actual != expected_ty {
                        self.report(
                            argument.span,
                            format!(
                                "argument {}: expected `{expected_ty}` but received `{actual}`",
                                index + 1
                            ),
                        );
                    }
                }

                // Even with bad arguments the call has the declared return
                // type, so the caller doesn't cascade
                return_type
            }
        }
    }
}

/// A stack of lexical scopes over the outermost (global) scope
#[derive(Debug)]
struct ScopeStack {
    global_scope: BTreeMap<InternedSymbol, SymbolInfo>,
    stack: VecDeque<BTreeMap<InternedSymbol, SymbolInfo>>,
}

impl ScopeStack {
    fn new() -> Self {
        Self {
            global_scope: BTreeMap::new(),
            stack: VecDeque::new(),
        }
    }

    fn push_scope(&mut self) {
        self.stack.push_back(BTreeMap::new());
    }

    fn pop_scope(&mut self) {
        assert!(
            self.stack.pop_back().is_some(),
            "Attempted to pop the global scope"
        );
    }

    fn is_declared_in_current_scope(&self, symbol: InternedSymbol) -> bool {
        self.stack
            .back()
            .unwrap_or(&self.global_scope)
            .contains_key(&symbol)
    }

    fn declare(&mut self, symbol: InternedSymbol, info: SymbolInfo) {
        let current = self.stack.back_mut().unwrap_or(&mut self.global_scope);

        current.insert(symbol, info);
    }

    /// Traverses the scope stack from innermost to outermost before falling
    /// back to the global scope
    fn lookup(&self, symbol: InternedSymbol) -> Option<&SymbolInfo> {
        for scope in self.stack.iter().rev() {
            if let Some(info) = scope.get(&symbol) {
                return Some(info);
            }
        }

        self.global_scope.get(&symbol)
    }
}
