//! AST → TAC lowering.
//!
//! A [`TacGenerator`] is one generation run: its temporary and label
//! counters, instruction list, and expression cache live exactly as long as
//! the run and are never shared or reset — a second run means a second
//! generator. Counters are global to the run (functions do not get their own
//! temporary or label namespace).
//!
//! Only invoked on trees the semantic analyzer accepted with zero errors;
//! handing it anything else is a programmer error, not a recoverable one.

use hashbrown::HashMap;
use itertools::Itertools;
use tracing::{debug, trace};

use super::Instruction;
use crate::{
    frontend::{
        ast::{
            BinaryOperatorKind, Expression, ExpressionKind, ForInitializer, FunctionDecl, Item,
            ItemKind, LiteralKind, Program, Statement, StatementKind, TypeAnnotation,
            UnaryOperatorKind, VariableDecl,
        },
        intern::InternedSymbol,
    },
    middle::ty::Ty,
};

#[derive(Debug)]
pub struct TacGenerator {
    temp_counter: usize,
    label_counter: usize,
    instructions: Vec<Instruction>,
    /// Maps an expression's exact textual rendering to the operand that
    /// already holds its value, so textually identical sub-expressions are
    /// not regenerated — even across statements.
    expression_temps: HashMap<String, String>,
    current_function: Option<InternedSymbol>,
}

impl TacGenerator {
    /// Lowers a validated tree to an ordered TAC instruction sequence.
    ///
    /// Precondition: the semantic analyzer reported zero errors for this
    /// tree.
    pub fn generate(program: &Program) -> Vec<Instruction> {
        let mut generator = Self {
            temp_counter: 0,
            label_counter: 0,
            instructions: Vec::new(),
            expression_temps: HashMap::new(),
            current_function: None,
        };

        for item in &program.items {
            generator.lower_item(item);
        }

        debug!(
            instructions = generator.instructions.len(),
            temporaries = generator.temp_counter,
            labels = generator.label_counter,
            "TAC generation finished"
        );

        generator.instructions
    }

    fn new_temp(&mut self) -> String {
        self.temp_counter += 1;
        format!("t{}", self.temp_counter)
    }

    fn new_label(&mut self) -> String {
        self.label_counter += 1;
        format!("L{}", self.label_counter)
    }

    fn emit(&mut self, instruction: Instruction) {
        trace!(function = ?self.current_function, %instruction, "emit");
        self.instructions.push(instruction);
    }

    fn lower_item(&mut self, item: &Item) {
        match &item.kind {
            ItemKind::Import(name) => {
                self.emit(Instruction::Comment(format!("Import: {}", name.symbol)));
            }
            ItemKind::Function(function) => self.lower_function(function),
            ItemKind::Variable(decl) => self.lower_variable_decl(decl),
            ItemKind::Statement(statement) => self.lower_statement(statement),
        }
    }

    fn lower_function(&mut self, function: &FunctionDecl) {
        let name = function.name.symbol;

        self.current_function = Some(name);
        self.emit(Instruction::FuncBegin(name.value().to_owned()));

        for parameter in &function.parameters {
            self.emit(Instruction::Param(parameter.name.symbol.value().to_owned()));
        }

        for statement in &function.body.statements {
            self.lower_statement(statement);
        }

        self.emit(Instruction::FuncEnd(name.value().to_owned()));
        self.current_function = None;
    }

    fn lower_variable_decl(&mut self, decl: &VariableDecl) {
        let destination = decl.name.symbol.value().to_owned();

        if let Some(initializer) = &decl.initializer {
            let value = self.expression_operand(initializer);

            self.emit(Instruction::Assign { destination, value });
        } else if let Some(default) = decl.ty.as_ref().and_then(default_value) {
            self.emit(Instruction::Assign {
                destination,
                value: default.to_owned(),
            });
        }
        // A type with no known default emits nothing
    }

    fn lower_statement(&mut self, statement: &Statement) {
        match &statement.kind {
            StatementKind::Print(print) => {
                let value = print
                    .value
                    .as_ref()
                    .map(|value| self.expression_operand(value));

                self.emit(Instruction::Print {
                    newline: print.newline,
                    value,
                });
            }
            StatementKind::If(if_statement) => {
                let condition = self.expression_operand(&if_statement.condition);

                // Both labels are allocated up front; without an else the
                // end label is simply never emitted
                let false_label = self.new_label();
                let end_label = self.new_label();

                self.emit(Instruction::CondGoto {
                    condition,
                    target: false_label.clone(),
                });

                for body_statement in &if_statement.then_block.statements {
                    self.lower_statement(body_statement);
                }

                if let Some(else_block) = &if_statement.else_block {
                    self.emit(Instruction::Goto(end_label.clone()));
                    self.emit(Instruction::Label(false_label));

                    for body_statement in &else_block.statements {
                        self.lower_statement(body_statement);
                    }

                    self.emit(Instruction::Label(end_label));
                } else {
                    self.emit(Instruction::Label(false_label));
                }
            }
            StatementKind::While(while_statement) => {
                let start_label = self.new_label();
                let end_label = self.new_label();

                self.emit(Instruction::Label(start_label.clone()));

                let condition = self.expression_operand(&while_statement.condition);

                self.emit(Instruction::CondGoto {
                    condition,
                    target: end_label.clone(),
                });

                for body_statement in &while_statement.body.statements {
                    self.lower_statement(body_statement);
                }

                self.emit(Instruction::Goto(start_label));
                self.emit(Instruction::Label(end_label));
            }
            StatementKind::For(for_statement) => {
                let start_label = self.new_label();
                let end_label = self.new_label();
                let continue_label = self.new_label();

                match &for_statement.initializer {
                    Some(ForInitializer::Variable(decl)) => self.lower_variable_decl(decl),
                    // An expression initializer is evaluated for its side
                    // effect only
                    Some(ForInitializer::Expression(expression)) => {
                        self.expression_operand(expression);
                    }
                    None => {}
                }

                self.emit(Instruction::Label(start_label.clone()));

                // An omitted condition loops unconditionally
                if let Some(condition) = &for_statement.condition {
                    let condition = self.expression_operand(condition);

                    self.emit(Instruction::CondGoto {
                        condition,
                        target: end_label.clone(),
                    });
                }

                for body_statement in &for_statement.body.statements {
                    self.lower_statement(body_statement);
                }

                // Reserved for a future `continue` statement; no generated
                // jump targets it today
                self.emit(Instruction::Label(continue_label));

                if let Some(increment) = &for_statement.increment {
                    self.expression_operand(increment);
                }

                self.emit(Instruction::Goto(start_label));
                self.emit(Instruction::Label(end_label));
            }
            StatementKind::Return(value) => {
                let value = value.as_ref().map(|value| self.expression_operand(value));

                self.emit(Instruction::Return(value));
            }
            StatementKind::Variable(decl) => self.lower_variable_decl(decl),
            StatementKind::Block(block) => {
                for body_statement in &block.statements {
                    self.lower_statement(body_statement);
                }
            }
            StatementKind::Expression(expression) => {
                self.expression_operand(expression);
            }
        }
    }

    /// Produces the operand (temporary name, variable name, or literal text)
    /// holding an expression's value, consulting the run's expression cache
    /// first. Every position the grammar types as a full `Expression` goes
    /// through here; interior operator operands do not.
    fn expression_operand(&mut self, expression: &Expression) -> String {
        let key = expression_key(expression);

        if let Some(existing) = self.expression_temps.get(&key) {
            trace!(key = %key, operand = %existing, "expression cache hit");
            return existing.clone();
        }

        let operand = self.lower_expression(expression);

        // TODO: entries are never invalidated, so reassigning a variable
        // between two textually identical expressions reuses the stale
        // temporary; key the cache on an assignment generation to fix
        self.expression_temps.insert(key, operand.clone());

        operand
    }

    fn lower_expression(&mut self, expression: &Expression) -> String {
        match &expression.kind {
            ExpressionKind::Literal(literal) => match literal.kind {
                // Booleans pass through as bare text; numbers and strings
                // are moved into a temporary first
                LiteralKind::Boolean => literal.symbol.value().to_owned(),
                LiteralKind::Number | LiteralKind::String => {
                    let temp = self.new_temp();

                    self.emit(Instruction::Assign {
                        destination: temp.clone(),
                        value: literal.symbol.value().to_owned(),
                    });

                    temp
                }
            },
            ExpressionKind::Identifier(identifier) => identifier.symbol.value().to_owned(),
            ExpressionKind::Grouping(inner) => self.expression_operand(inner),
            ExpressionKind::FunctionCall { callee, arguments } => {
                let arguments = arguments
                    .iter()
                    .map(|argument| self.expression_operand(argument))
                    .collect::<Vec<_>>();

                let temp = self.new_temp();

                self.emit(Instruction::Assign {
                    destination: temp.clone(),
                    value: format!("CALL {}({})", callee.symbol, arguments.iter().join(", ")),
                });

                temp
            }
            ExpressionKind::Binary { lhs, operator, rhs } => {
                let lhs = self.lower_expression(lhs);
                let rhs = self.lower_expression(rhs);
                let temp = self.new_temp();

                self.emit(Instruction::Assign {
                    destination: temp.clone(),
                    value: format!("{lhs} {} {rhs}", tac_operator(operator.kind)),
                });

                temp
            }
            ExpressionKind::Unary { operator, operand } => {
                let operand = self.lower_expression(operand);
                let temp = self.new_temp();

                let value = match operator.kind {
                    UnaryOperatorKind::Not => format!("NOT {operand}"),
                    UnaryOperatorKind::Negate => format!("-{operand}"),
                };

                self.emit(Instruction::Assign {
                    destination: temp.clone(),
                    value,
                });

                temp
            }
            ExpressionKind::Assignment { target, value } => {
                let value = self.expression_operand(value);

                self.emit(Instruction::Assign {
                    destination: target.symbol.value().to_owned(),
                    value,
                });

                target.symbol.value().to_owned()
            }
        }
    }
}

/// Logical operators render as their uppercase TAC aliases; everything else
/// keeps its source symbol
fn tac_operator(kind: BinaryOperatorKind) -> &'static str {
    match kind {
        BinaryOperatorKind::Or => "OR",
        BinaryOperatorKind::And => "AND",
        _ => kind.as_str(),
    }
}

fn default_value(annotation: &TypeAnnotation) -> Option<&'static str> {
    match Ty::from_annotation(annotation) {
        Ty::Int => Some("0"),
        Ty::Float => Some("0.0"),
        Ty::Bool => Some("false"),
        Ty::Str => Some("\"\""),
        _ => None,
    }
}

/// Compact textual rendering of an expression, used as the cache key.
/// Two expressions with the same rendering are assumed to hold the same
/// value within one run.
fn expression_key(expression: &Expression) -> String {
    match &expression.kind {
        ExpressionKind::Literal(literal) => literal.symbol.value().to_owned(),
        ExpressionKind::Identifier(identifier) => identifier.symbol.value().to_owned(),
        ExpressionKind::Grouping(inner) => format!("({})", expression_key(inner)),
        ExpressionKind::FunctionCall { callee, arguments } => format!(
            "{}({})",
            callee.symbol,
            arguments.iter().map(expression_key).join(",")
        ),
        ExpressionKind::Binary { lhs, operator, rhs } => format!(
            "{}{}{}",
            expression_key(lhs),
            operator.kind.as_str(),
            expression_key(rhs)
        ),
        ExpressionKind::Unary { operator, operand } => {
            let operator = match operator.kind {
                UnaryOperatorKind::Not => "not ",
                UnaryOperatorKind::Negate => "-",
            };

            format!("{operator}{}", expression_key(operand))
        }
        ExpressionKind::Assignment { target, value } => {
            format!("{}={}", target.symbol, expression_key(value))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        SourceFile,
        frontend::{lexer::tokenize, parser::Parser},
        middle::analyze::SemanticAnalyzer,
    };

    fn generate_source(input: &str) -> Vec<Instruction> {
        let source = SourceFile::new_in_memory(input);
        let tokens = tokenize(&source).expect("test input should tokenize");
        let program = Parser::parse(&source, tokens).expect("test input should parse");

        let errors = SemanticAnalyzer::analyze(&source, &program);
        assert_eq!(errors, vec![], "test input should be semantically valid");

        TacGenerator::generate(&program)
    }

    fn lines(input: &str) -> Vec<String> {
        super::super::render_lines(&generate_source(input))
    }

    #[test]
    fn for_loop_lowers_to_the_canonical_shape() {
        assert_eq!(
            lines("for (var i: int = 0; i < 3; i = i + 1) { println(i); }"),
            vec![
                "t1 = 0",
                "i = t1",
                "L1:",
                "t2 = 3",
                "t3 = i < t2",
                "IF_FALSE t3 GOTO L2",
                "println i",
                "L3:",
                "t4 = 1",
                "t5 = i + t4",
                "i = t5",
                "GOTO L1",
                "L2:",
            ]
        );
    }

    #[test]
    fn if_without_else_emits_exactly_one_label() {
        assert_eq!(
            lines("var x: bool = true; if (x) { print(x); }"),
            vec![
                "x = true",
                "IF_FALSE x GOTO L1",
                "print x",
                "L1:",
            ]
        );
    }

    #[test]
    fn if_with_else_emits_goto_end_before_the_false_label() {
        assert_eq!(
            lines("var x: bool = true; if (x) { print(1); } else { print(2); }"),
            vec![
                "x = true",
                "IF_FALSE x GOTO L1",
                "t1 = 1",
                "print t1",
                "GOTO L2",
                "L1:",
                "t2 = 2",
                "print t2",
                "L2:",
            ]
        );
    }

    #[test]
    fn else_less_if_still_consumes_its_end_label_number() {
        let rendered = lines(
            "var x: bool = true;\n\
             if (x) { print(1); }\n\
             while (x) { print(2); }",
        );

        // The if allocated L1 and L2 but only emitted L1, so the while
        // starts at L3
        assert!(rendered.contains(&"L1:".to_owned()));
        assert!(!rendered.contains(&"L2:".to_owned()));
        assert!(rendered.contains(&"L3:".to_owned()));
    }

    #[test]
    fn while_loop_tests_before_the_body_and_jumps_back() {
        assert_eq!(
            lines("var x: bool = true; while (x) { x = false; }"),
            vec![
                "x = true",
                "L1:",
                "IF_FALSE x GOTO L2",
                "x = false",
                "GOTO L1",
                "L2:",
            ]
        );
    }

    #[test]
    fn functions_emit_begin_params_body_end() {
        assert_eq!(
            lines("fun add(a: int, b: int): int { return a + b; }"),
            vec![
                "FUNC_BEGIN add",
                "PARAM a",
                "PARAM b",
                "t1 = a + b",
                "RETURN t1",
                "FUNC_END add",
            ]
        );
    }

    #[test]
    fn calls_evaluate_arguments_then_emit_the_call() {
        assert_eq!(
            lines("fun f(a: int, b: int): int { return a; } var r: int = f(1, 2);"),
            vec![
                "FUNC_BEGIN f",
                "PARAM a",
                "PARAM b",
                "RETURN a",
                "FUNC_END f",
                "t1 = 1",
                "t2 = 2",
                "t3 = CALL f(t1, t2)",
                "r = t3",
            ]
        );
    }

    #[test]
    fn uninitialized_declarations_get_per_type_defaults() {
        assert_eq!(
            lines("var a: int; var b: bool; var c: str;"),
            vec!["a = 0", "b = false", "c = \"\""]
        );
    }

    #[test]
    fn import_lowers_to_a_comment() {
        assert_eq!(lines("import math;"), vec!["# Import: math"]);
    }

    #[test]
    fn booleans_pass_through_without_a_temporary() {
        assert_eq!(
            lines("println(true);"),
            vec!["println true"]
        );
    }

    #[test]
    fn empty_print_emits_the_bare_mnemonic() {
        assert_eq!(lines("println();"), vec!["println"]);
    }

    #[test]
    fn logical_operators_fold_left_to_right_through_temporaries() {
        assert_eq!(
            lines("var a: bool = true; var r: bool = a or a and a;"),
            vec![
                "a = true",
                "t1 = a AND a",
                "t2 = a OR t1",
                "r = t2",
            ]
        );
    }

    #[test]
    fn unary_operators_use_their_tac_aliases() {
        assert_eq!(
            lines("var a: bool = true; var b: bool = not a; var n: int = -5;"),
            vec![
                "a = true",
                "t1 = NOT a",
                "b = t1",
                "t2 = 5",
                "t3 = -t2",
                "n = t3",
            ]
        );
    }

    #[test]
    fn identical_expressions_are_memoized_across_statements() {
        let rendered = lines(
            "var a: int = 1;\n\
             var x: int = a + a;\n\
             var y: int = a + a;",
        );

        // `a + a` is computed once; the second initializer reuses t2
        assert_eq!(
            rendered,
            vec![
                "t1 = 1",
                "a = t1",
                "t2 = a + a",
                "x = t2",
                "y = t2",
            ]
        );
    }

    #[test]
    fn temporaries_and_labels_are_unique_within_a_run() {
        let instructions = generate_source(
            "fun f(a: int): int { if (a < 1) { return 1; } return a; }\n\
             var x: int = f(3);\n\
             while (x < 9) { x = x + x; }\n\
             for (var i: int = 0; i < 2; i = i + 1) { println(i); }",
        );

        let mut temps = Vec::new();
        let mut labels = Vec::new();

        for instruction in &instructions {
            match instruction {
                Instruction::Assign { destination, .. }
                    if destination.starts_with('t')
                        && destination[1..].chars().all(|c| c.is_ascii_digit()) =>
                {
                    temps.push(destination.clone());
                }
                Instruction::Label(name) => labels.push(name.clone()),
                _ => {}
            }
        }

        let unique_temps = temps.iter().collect::<std::collections::BTreeSet<_>>();
        let unique_labels = labels.iter().collect::<std::collections::BTreeSet<_>>();

        assert_eq!(unique_temps.len(), temps.len());
        assert_eq!(unique_labels.len(), labels.len());
    }

    #[test]
    fn generation_runs_do_not_share_counters() {
        let first = lines("var x: int = 1;");
        let second = lines("var y: int = 2;");

        // Both runs start over at t1
        assert_eq!(first[0], "t1 = 1");
        assert_eq!(second[0], "t1 = 2");
    }
}
