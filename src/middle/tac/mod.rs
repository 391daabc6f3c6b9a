//! TAC (three-address code). In this form, loops and conditionals are
//! simplified to labels and jumps and expression trees are flattened into
//! ordered assignments to numbered temporaries. The instruction *sequence*
//! is the program representation — there is no graph.
//!
//! The textual line forms rendered by [`Instruction`]'s `Display` are the
//! hard boundary consumed by a backend and by the optimization advisor;
//! [`Instruction::parse_line`] is their inverse.

pub mod ast_lowering;
pub mod pretty_print;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// `dest = expr` — the right-hand side is rendered expression text: a
    /// literal, an operand pair around an operator, or a `CALL name(...)`
    Assign { destination: String, value: String },
    /// `name:`
    Label(String),
    /// `GOTO name`
    Goto(String),
    /// `IF_FALSE cond GOTO name`
    CondGoto { condition: String, target: String },
    /// `FUNC_BEGIN name`
    FuncBegin(String),
    /// `FUNC_END name`
    FuncEnd(String),
    /// `PARAM name`
    Param(String),
    /// `print expr` / `println expr`, bare when no argument was given
    Print { newline: bool, value: Option<String> },
    /// `RETURN [expr]`
    Return(Option<String>),
    /// `# text`
    Comment(String),
}

impl core::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instruction::Assign { destination, value } => write!(f, "{destination} = {value}"),
            Instruction::Label(name) => write!(f, "{name}:"),
            Instruction::Goto(target) => write!(f, "GOTO {target}"),
            Instruction::CondGoto { condition, target } => {
                write!(f, "IF_FALSE {condition} GOTO {target}")
            }
            Instruction::FuncBegin(name) => write!(f, "FUNC_BEGIN {name}"),
            Instruction::FuncEnd(name) => write!(f, "FUNC_END {name}"),
            Instruction::Param(name) => write!(f, "PARAM {name}"),
            Instruction::Print {
                newline,
                value: Some(value),
            } => {
                write!(f, "{} {value}", if *newline { "println" } else { "print" })
            }
            Instruction::Print { newline, value: _ } => {
                write!(f, "{}", if *newline { "println" } else { "print" })
            }
            Instruction::Return(Some(value)) => write!(f, "RETURN {value}"),
            Instruction::Return(None) => write!(f, "RETURN"),
            Instruction::Comment(text) => write!(f, "# {text}"),
        }
    }
}

/// Renders an instruction sequence to the textual boundary format, one line
/// per instruction.
pub fn render_lines(instructions: &[Instruction]) -> Vec<String> {
    instructions
        .iter()
        .map(|instruction| instruction.to_string())
        .collect()
}

impl Instruction {
    /// Re-parses one rendered TAC line into its structured form.
    ///
    /// `#`-prefixed trailing text (outside string literals) is discarded as
    /// a comment; a line that is nothing but a comment parses as
    /// [`Instruction::Comment`]. Lines matching no instruction form yield
    /// `None` — callers are expected to skip them.
    pub fn parse_line(line: &str) -> Option<Instruction> {
        let (code, comment) = split_off_comment(line);
        let code = code.trim();

        if code.is_empty() {
            return comment.map(|text| Instruction::Comment(text.trim().to_owned()));
        }

        if let Some(target) = code.strip_prefix("GOTO ") {
            return Some(Instruction::Goto(target.trim().to_owned()));
        }

        if let Some(rest) = code.strip_prefix("IF_FALSE ") {
            let (condition, target) = rest.rsplit_once(" GOTO ")?;

            return Some(Instruction::CondGoto {
                condition: condition.trim().to_owned(),
                target: target.trim().to_owned(),
            });
        }

        if let Some(name) = code.strip_prefix("FUNC_BEGIN ") {
            return Some(Instruction::FuncBegin(name.trim().to_owned()));
        }

        if let Some(name) = code.strip_prefix("FUNC_END ") {
            return Some(Instruction::FuncEnd(name.trim().to_owned()));
        }

        if let Some(name) = code.strip_prefix("PARAM ") {
            return Some(Instruction::Param(name.trim().to_owned()));
        }

        if code == "RETURN" {
            return Some(Instruction::Return(None));
        }

        if let Some(value) = code.strip_prefix("RETURN ") {
            return Some(Instruction::Return(Some(value.trim().to_owned())));
        }

        for (mnemonic, newline) in [("println", true), ("print", false)] {
            if code == mnemonic {
                return Some(Instruction::Print {
                    newline,
                    value: None,
                });
            }

            if let Some(value) = code.strip_prefix(mnemonic)
                && let Some(value) = value.strip_prefix(' ')
            {
                return Some(Instruction::Print {
                    newline,
                    value: Some(value.trim().to_owned()),
                });
            }
        }

        if let Some(name) = code.strip_suffix(':')
            && !name.is_empty()
            && !name.contains([' ', '='])
        {
            return Some(Instruction::Label(name.to_owned()));
        }

        if let Some(index) = find_assignment_operator(code) {
            let destination = code[..index].trim();
            let value = code[index + 1..].trim();

            if !destination.is_empty() && !destination.contains(' ') && !value.is_empty() {
                return Some(Instruction::Assign {
                    destination: destination.to_owned(),
                    value: value.to_owned(),
                });
            }
        }

        None
    }
}

/// Splits a line at the first `#` that is not inside a string literal.
/// Returns the code part and, if present, the comment text after the `#`.
fn split_off_comment(line: &str) -> (&str, Option<&str>) {
    let mut in_string = false;

    for (index, c) in line.char_indices() {
        match c {
            '"' => in_string = !in_string,
            '#' if !in_string => return (&line[..index], Some(&line[index + 1..])),
            _ => {}
        }
    }

    (line, None)
}

/// Finds the byte index of a top-level `=` that is an assignment: not part
/// of `==`, `!=`, `<=`, or `>=`, and not inside a string literal.
fn find_assignment_operator(code: &str) -> Option<usize> {
    let bytes = code.as_bytes();
    let mut in_string = false;

    for (index, byte) in bytes.iter().enumerate() {
        match byte {
            b'"' => in_string = !in_string,
            b'=' if !in_string => {
                let is_comparison = (index > 0
                    && matches!(bytes[index - 1], b'!' | b'<' | b'>' | b'='))
                    || bytes.get(index + 1) == Some(&b'=');

                if !is_comparison {
                    return Some(index);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_round_trips_through_its_line_form() {
        let instructions = [
            Instruction::Assign {
                destination: "t1".to_owned(),
                value: "a + b".to_owned(),
            },
            Instruction::Label("L1".to_owned()),
            Instruction::Goto("L1".to_owned()),
            Instruction::CondGoto {
                condition: "t3".to_owned(),
                target: "L2".to_owned(),
            },
            Instruction::FuncBegin("add".to_owned()),
            Instruction::FuncEnd("add".to_owned()),
            Instruction::Param("a".to_owned()),
            Instruction::Print {
                newline: true,
                value: Some("t1".to_owned()),
            },
            Instruction::Print {
                newline: false,
                value: None,
            },
            Instruction::Return(Some("t2".to_owned())),
            Instruction::Return(None),
            Instruction::Comment("Import: math".to_owned()),
        ];

        for instruction in instructions {
            let line = instruction.to_string();

            assert_eq!(
                Instruction::parse_line(&line),
                Some(instruction),
                "failed to round-trip `{line}`"
            );
        }
    }

    #[test]
    fn trailing_hash_comments_are_stripped() {
        assert_eq!(
            Instruction::parse_line("GOTO L1 # loop back"),
            Some(Instruction::Goto("L1".to_owned()))
        );
    }

    #[test]
    fn hash_inside_a_string_literal_is_not_a_comment() {
        assert_eq!(
            Instruction::parse_line("t1 = \"#1\""),
            Some(Instruction::Assign {
                destination: "t1".to_owned(),
                value: "\"#1\"".to_owned(),
            })
        );
    }

    #[test]
    fn comparison_equals_is_not_an_assignment() {
        assert_eq!(
            Instruction::parse_line("t1 = a == b"),
            Some(Instruction::Assign {
                destination: "t1".to_owned(),
                value: "a == b".to_owned(),
            })
        );

        // A bare comparison has no top-level `=` and is not an instruction
        assert_eq!(Instruction::parse_line("a == b"), None);
    }

    #[test]
    fn garbage_lines_are_rejected_not_errors() {
        assert_eq!(Instruction::parse_line(""), None);
        assert_eq!(Instruction::parse_line("   "), None);
        assert_eq!(Instruction::parse_line("completely unparseable"), None);
        assert_eq!(Instruction::parse_line(": :"), None);
    }
}
