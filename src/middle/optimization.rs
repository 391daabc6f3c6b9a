//! Static optimization advisor over finished TAC.
//!
//! A pure, best-effort analysis of the textual instruction sequence: every
//! line is first re-parsed into the structured [`Instruction`] form (lines
//! that match no instruction are skipped, never rejected), then two passes
//! run over the structured data. Pass 1 collects per-variable usage facts
//! and per-function call counts; pass 2 turns them, together with a few
//! per-assignment arithmetic patterns, into human-readable advisories. The
//! input is never modified and the advisories are never binding.

use std::collections::BTreeMap;

use super::tac::Instruction;

/// Usage facts for one TAC name, rebuilt fresh on every call
#[derive(Debug, Default, Clone)]
struct VariableUsageInfo {
    /// Generated temporaries are named `t<digits>`
    is_temporary: bool,
    /// Line of the first assignment to this name
    declaration_line: Option<usize>,
    /// Reads: occurrences on the right-hand side of an assignment or inside
    /// a print/condition/return operand
    usage_count: usize,
    usage_lines: Vec<usize>,
    is_assigned: bool,
    /// Whether the name was ever the direct operand of a print
    is_printed: bool,
}

/// Produces advisories for a rendered TAC instruction sequence.
///
/// Never errors: unparseable lines are skipped and contribute nothing.
pub fn advise<S: AsRef<str>>(tac_lines: &[S]) -> Vec<String> {
    let mut variables: BTreeMap<String, VariableUsageInfo> = BTreeMap::new();
    let mut function_calls: BTreeMap<String, usize> = BTreeMap::new();
    let mut assignments: Vec<(usize, String, String)> = Vec::new();

    /* Pass 1: collect usage facts */

    for (index, line) in tac_lines.iter().enumerate() {
        let line_number = index + 1;

        let Some(instruction) = Instruction::parse_line(line.as_ref()) else {
            continue;
        };

        match instruction {
            Instruction::Assign { destination, value } => {
                let entry = usage_entry(&mut variables, &destination);
                entry.is_assigned = true;
                entry.declaration_line.get_or_insert(line_number);

                record_reads(
                    &value,
                    line_number,
                    &mut variables,
                    &mut function_calls,
                );

                assignments.push((line_number, destination, value));
            }
            Instruction::CondGoto { condition, .. } => {
                record_reads(&condition, line_number, &mut variables, &mut function_calls);
            }
            Instruction::Print {
                value: Some(value), ..
            } => {
                record_reads(&value, line_number, &mut variables, &mut function_calls);

                if is_identifier(&value) {
                    usage_entry(&mut variables, &value).is_printed = true;
                }
            }
            Instruction::Return(Some(value)) => {
                record_reads(&value, line_number, &mut variables, &mut function_calls);
            }
            Instruction::Param(name) => {
                let entry = usage_entry(&mut variables, &name);
                entry.is_assigned = true;
                entry.declaration_line.get_or_insert(line_number);
            }
            _ => {}
        }
    }

    /* Pass 2: emit advisories */

    let mut advice = Vec::new();

    for (_, destination, value) in &assignments {
        check_assignment_patterns(destination, value, &mut advice);
    }

    for (name, info) in &variables {
        if info.is_assigned && info.usage_count == 0 && !info.is_printed {
            let location = info
                .declaration_line
                .map(|line| format!(" (line {line})"))
                .unwrap_or_default();

            if info.is_temporary {
                advice.push(format!(
                    "temporary `{name}`{location} calculates a value that is never used"
                ));
            } else {
                advice.push(format!(
                    "variable `{name}`{location} is assigned but never used"
                ));
            }

            continue;
        }

        if info.is_temporary {
            continue;
        }

        if info.usage_count > 0 && !info.is_printed {
            advice.push(format!(
                "variable `{name}` is used in computation but its value is never printed"
            ));
        }

        if info.usage_count == 1 {
            advice.push(format!(
                "variable `{name}` is only used once (line {})",
                info.usage_lines[0]
            ));
        }
    }

    for (name, count) in &function_calls {
        if *count == 1 && name != "print" && name != "println" {
            advice.push(format!(
                "function `{name}` is called only once and could be inlined"
            ));
        }
    }

    advice
}

/// Arithmetic simplification and constant-folding checks over a single
/// `dest = expr` instruction
fn check_assignment_patterns(destination: &str, value: &str, advice: &mut Vec<String>) {
    let rendered = format!("{destination} = {value}");

    if value.trim() == destination {
        advice.push(format!(
            "`{rendered}` assigns a variable to itself and can be removed"
        ));
    }

    let Some((lhs, operator, rhs)) = split_binary(value) else {
        return;
    };

    match operator {
        '*' => {
            if lhs == "1" || rhs == "1" {
                let other = if lhs == "1" { rhs } else { lhs };

                advice.push(format!(
                    "redundant multiplication in `{rendered}`: can be simplified to `{other}`"
                ));
            } else if lhs == "0" || rhs == "0" {
                advice.push(format!(
                    "multiplication by zero in `{rendered}`: the result is always 0"
                ));
            }
        }
        '/' => {
            if rhs == "1" {
                advice.push(format!(
                    "redundant division in `{rendered}`: can be simplified to `{lhs}`"
                ));
            } else if rhs == "0" {
                advice.push(format!(
                    "danger: division by zero in `{rendered}` will fail at runtime"
                ));
            } else if lhs == "0" {
                advice.push(format!(
                    "division of zero in `{rendered}`: the result is always 0"
                ));
            }
        }
        '+' => {
            if lhs == "0" || rhs == "0" {
                let other = if lhs == "0" { rhs } else { lhs };

                advice.push(format!(
                    "redundant addition of 0 in `{rendered}`: can be simplified to `{other}`"
                ));
            }
        }
        '-' => {
            if rhs == "0" {
                advice.push(format!(
                    "redundant subtraction of 0 in `{rendered}`: can be simplified to `{lhs}`"
                ));
            } else if lhs == rhs {
                advice.push(format!(
                    "`{rendered}` subtracts a value from itself: the result is always 0"
                ));
            }
        }
        _ => {}
    }

    // Constant folding, except that a constant division by zero is a danger
    // and must never be folded
    if let (Ok(a), Ok(b)) = (lhs.parse::<i64>(), rhs.parse::<i64>()) {
        if operator == '/' && b == 0 {
            advice.push(format!("danger: constant division by zero in `{rendered}`"));
            return;
        }

        let result = match operator {
            '+' => a + b,
            '-' => a - b,
            '*' => a * b,
            _ => a / b,
        };

        advice.push(format!(
            "constant folding: `{rendered}` could be simplified to `= {result}`"
        ));
    }
}

/// Splits `a OP b` where OP is a spaced arithmetic operator and both
/// operands are single tokens. Anything else (calls, logical operators,
/// unary forms, string operands with spaces) yields `None`.
fn split_binary(value: &str) -> Option<(&str, char, &str)> {
    let bytes = value.as_bytes();

    for (index, c) in value.char_indices() {
        if matches!(c, '+' | '-' | '*' | '/')
            && index > 0
            && bytes[index - 1] == b' '
            && bytes.get(index + 1) == Some(&b' ')
        {
            let lhs = value[..index - 1].trim();
            let rhs = value[index + 2..].trim();

            if !lhs.is_empty() && !rhs.is_empty() && !lhs.contains(' ') && !rhs.contains(' ') {
                return Some((lhs, c, rhs));
            }
        }
    }

    None
}

fn usage_entry<'a>(
    variables: &'a mut BTreeMap<String, VariableUsageInfo>,
    name: &str,
) -> &'a mut VariableUsageInfo {
    if !variables.contains_key(name) {
        variables.insert(
            name.to_owned(),
            VariableUsageInfo {
                is_temporary: is_temporary_name(name),
                ..Default::default()
            },
        );
    }

    variables.get_mut(name).unwrap()
}

/// Records every variable read inside an expression operand. `CALL` values
/// additionally count toward the callee's call count.
fn record_reads(
    expression: &str,
    line_number: usize,
    variables: &mut BTreeMap<String, VariableUsageInfo>,
    function_calls: &mut BTreeMap<String, usize>,
) {
    let mut expression = expression;

    if let Some(rest) = expression.strip_prefix("CALL ")
        && let Some((name, arguments)) = rest.split_once('(')
    {
        *function_calls.entry(name.trim().to_owned()).or_insert(0) += 1;
        expression = arguments.strip_suffix(')').unwrap_or(arguments);
    }

    for identifier in identifiers_in(expression) {
        let entry = usage_entry(variables, identifier);
        entry.usage_count += 1;
        entry.usage_lines.push(line_number);
    }
}

/// Scans an expression for identifier tokens, skipping string literals and
/// the TAC keyword aliases
fn identifiers_in(expression: &str) -> Vec<&str> {
    let mut identifiers = Vec::new();
    let mut rest = expression;

    while !rest.is_empty() {
        let c = rest.chars().next().unwrap();

        if c == '"' {
            // Skip the whole string literal (unterminated: skip the rest)
            match rest[1..].find('"') {
                Some(close) => rest = &rest[close + 2..],
                None => break,
            }
        } else if c.is_ascii_alphabetic() || c == '_' {
            let end = rest
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(rest.len());
            let word = &rest[..end];

            if !matches!(word, "true" | "false" | "AND" | "OR" | "NOT" | "CALL") {
                identifiers.push(word);
            }

            rest = &rest[end..];
        } else {
            rest = &rest[c.len_utf8()..];
        }
    }

    identifiers
}

fn is_temporary_name(name: &str) -> bool {
    name.len() > 1
        && name.starts_with('t')
        && name[1..].chars().all(|c| c.is_ascii_digit())
}

/// Whether the whole operand is a single variable name
fn is_identifier(operand: &str) -> bool {
    let operand = operand.trim();
    let mut chars = operand.chars();

    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !matches!(operand, "true" | "false")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advise_lines(lines: &[&str]) -> Vec<String> {
        advise(lines)
    }

    #[test]
    fn constant_arithmetic_is_folded_with_its_result() {
        let advice = advise_lines(&["t1 = 4 + 5", "print t1"]);

        assert!(
            advice.iter().any(|a| a.contains("= 9")),
            "expected a folding advisory in {advice:?}"
        );
    }

    #[test]
    fn division_by_zero_is_a_danger_never_a_fold() {
        let advice = advise_lines(&["x = y / 0"]);

        assert!(advice.iter().any(|a| a.contains("division by zero")));
        assert!(!advice.iter().any(|a| a.contains("could be simplified to `=")));
    }

    #[test]
    fn constant_division_by_zero_is_also_a_danger() {
        let advice = advise_lines(&["t1 = 8 / 0"]);

        assert!(advice.iter().any(|a| a.contains("constant division by zero")));
        assert!(!advice.iter().any(|a| a.contains("could be simplified to `=")));
    }

    #[test]
    fn self_assignment_is_flagged() {
        let advice = advise_lines(&["x = x"]);

        assert!(advice.iter().any(|a| a.contains("assigns a variable to itself")));
    }

    #[test]
    fn multiplication_by_one_suggests_the_other_operand() {
        let advice = advise_lines(&["t1 = x * 1", "print t1", "print x"]);

        assert!(
            advice
                .iter()
                .any(|a| a.contains("redundant multiplication") && a.contains("`x`"))
        );
    }

    #[test]
    fn multiplication_by_zero_is_always_zero() {
        let advice = advise_lines(&["t1 = x * 0"]);

        assert!(advice.iter().any(|a| a.contains("multiplication by zero")));
    }

    #[test]
    fn division_by_one_and_of_zero_are_flagged() {
        let advice = advise_lines(&["t1 = x / 1", "t2 = 0 / x"]);

        assert!(advice.iter().any(|a| a.contains("redundant division")));
        assert!(advice.iter().any(|a| a.contains("division of zero")));
    }

    #[test]
    fn additive_identities_are_flagged() {
        let advice = advise_lines(&["t1 = x + 0", "t2 = x - 0", "t3 = x - x"]);

        assert!(advice.iter().any(|a| a.contains("redundant addition of 0")));
        assert!(advice.iter().any(|a| a.contains("redundant subtraction of 0")));
        assert!(advice.iter().any(|a| a.contains("subtracts a value from itself")));
    }

    #[test]
    fn unused_temporaries_and_variables_use_different_phrasing() {
        let advice = advise_lines(&["t1 = 5", "x = 7"]);

        assert!(
            advice
                .iter()
                .any(|a| a.contains("temporary `t1`") && a.contains("never used"))
        );
        assert!(
            advice
                .iter()
                .any(|a| a.contains("variable `x`") && a.contains("assigned but never used"))
        );
    }

    #[test]
    fn computed_but_never_printed_variables_are_flagged() {
        let advice = advise_lines(&["x = 5", "y = x", "print y"]);

        assert!(
            advice
                .iter()
                .any(|a| a.contains("`x` is used in computation but its value is never printed"))
        );
    }

    #[test]
    fn printing_a_variable_counts_as_observing_it() {
        let advice = advise_lines(&["x = 5", "print x", "print x"]);

        assert!(!advice.iter().any(|a| a.contains("never printed")));
        assert!(!advice.iter().any(|a| a.contains("never used")));
    }

    #[test]
    fn variables_read_exactly_once_are_reported_with_the_line() {
        let advice = advise_lines(&["x = 5", "y = x", "println y", "println y"]);

        assert!(
            advice
                .iter()
                .any(|a| a.contains("`x` is only used once (line 2)"))
        );
    }

    #[test]
    fn functions_called_exactly_once_suggest_inlining() {
        let advice = advise_lines(&["t1 = CALL add(x, y)", "print t1"]);

        assert!(
            advice
                .iter()
                .any(|a| a.contains("function `add` is called only once"))
        );
    }

    #[test]
    fn functions_called_twice_are_not_inline_candidates() {
        let advice = advise_lines(&["t1 = CALL add(x, y)", "t2 = CALL add(t1, y)", "print t2"]);

        assert!(!advice.iter().any(|a| a.contains("could be inlined")));
    }

    #[test]
    fn call_arguments_count_as_reads() {
        let advice = advise_lines(&["x = 1", "t1 = CALL f(x)", "print t1", "print x"]);

        assert!(!advice.iter().any(|a| a.contains("`x` is assigned but never used")));
    }

    #[test]
    fn unparseable_lines_are_skipped_silently() {
        let advice = advise_lines(&["@@ not an instruction @@", "t1 = 4 + 5", "print t1"]);

        assert!(advice.iter().any(|a| a.contains("= 9")));
    }

    #[test]
    fn comment_lines_contribute_nothing() {
        assert_eq!(advise_lines(&["# Import: math"]), Vec::<String>::new());
    }

    #[test]
    fn string_literal_contents_are_not_variable_reads() {
        let advice = advise_lines(&["t1 = \"x + y\"", "print t1"]);

        assert!(!advice.iter().any(|a| a.contains("`x`") || a.contains("`y`")));
    }

    #[test]
    fn advising_is_pure_and_repeatable() {
        let lines = ["t1 = 4 + 5", "x = t1", "print x"];

        assert_eq!(advise(&lines), advise(&lines));
    }

    #[test]
    fn condition_operands_count_as_reads() {
        let advice = advise_lines(&["x = 1", "IF_FALSE x GOTO L1", "L1:"]);

        assert!(!advice.iter().any(|a| a.contains("never used")));
    }
}
