use colored::Colorize;
use itertools::Itertools;

use super::Instruction;

/// Renders a TAC sequence for the terminal. Labels and function markers sit
/// flush left, everything else is indented under them. The plain-text
/// boundary format is [`Instruction`]'s `Display`; this is presentation
/// only.
pub fn pretty_print_tac(instructions: &[Instruction]) {
    for instruction in instructions {
        match instruction {
            Instruction::Label(name) => {
                println!("{}", format!("{name}:").bright_red());
            }
            Instruction::FuncBegin(name) => {
                println!("{} {}", "FUNC_BEGIN".magenta(), name.blue());
            }
            Instruction::FuncEnd(name) => {
                println!("{} {}", "FUNC_END".magenta(), name.blue());
            }
            Instruction::Param(name) => {
                println!("    {} {}", "PARAM".cyan(), name.yellow());
            }
            Instruction::Assign { destination, value } => {
                println!(
                    "    {} {} {}",
                    destination.yellow(),
                    "=".white(),
                    value.white()
                );
            }
            Instruction::Goto(target) => {
                println!("    {} {}", "GOTO".cyan(), target.blue());
            }
            Instruction::CondGoto { condition, target } => {
                println!(
                    "    {} {} {} {}",
                    "IF_FALSE".cyan(),
                    condition.yellow(),
                    "GOTO".cyan(),
                    target.blue()
                );
            }
            Instruction::Print { newline, value } => {
                let mnemonic = if *newline { "println" } else { "print" };

                println!(
                    "    {}{}",
                    mnemonic.cyan(),
                    value
                        .iter()
                        .map(|value| format!(" {}", value.yellow()))
                        .join("")
                );
            }
            Instruction::Return(value) => {
                println!(
                    "    {}{}",
                    "RETURN".cyan(),
                    value
                        .iter()
                        .map(|value| format!(" {}", value.yellow()))
                        .join("")
                );
            }
            Instruction::Comment(text) => {
                println!("    {}", format!("# {text}").bright_black());
            }
        }
    }
}
