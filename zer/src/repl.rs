use std::io::Write;

use zer_core::{environment::prelude::Value, lexer::prelude::Token, retokenize, Runtime, VERSION};

use crate::cli::print_error;

const PROMPT: &str = ">> ";

/// Reads one line at a time and runs it against the same globals.
pub fn start(runtime: &Runtime) -> std::io::Result<()> {
    println!("{VERSION}");
    println!("Type '.exit' to exit.");

    read_lines(|input| match runtime.run("<stdin>", input) {
        Ok(Value::None) => {},
        Ok(value) => println!("{}", value.repr()),
        Err(err) => print_error(&err),
    })
}

/// Prints the tokens of each line instead of running it.
pub fn start_tokens() -> std::io::Result<()> {
    read_lines(|input| {
        for (start, token, end) in retokenize(input) {
            if token == Token::Eof {
                break;
            }
            println!("[{start}..{end}] {token:?}");
        }
    })
}

fn read_lines(mut handle: impl FnMut(&str)) -> std::io::Result<()> {
    let stdin = std::io::stdin();

    loop {
        let mut input = String::new();

        print!("{PROMPT}");
        std::io::stdout().flush()?;
        if stdin.read_line(&mut input)? == 0 {
            return Ok(());
        }

        match input.trim() {
            ".exit" => return Ok(()),
            line if line.is_empty() || line.starts_with('#') => {},
            line => handle(line),
        }
    }
}
