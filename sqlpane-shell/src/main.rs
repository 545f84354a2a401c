//! sqlpane shell entry point.

use sqlpane_shell::app::{Flow, Shell};
use sqlpane_shell::config::ShellConfig;
use sqlpane_shell::error::ShellError;
use sqlpane_shell::logging::init_logging;
use std::io::{self, BufRead, Write};

fn main() -> Result<(), ShellError> {
    let config = ShellConfig::load()?;
    init_logging(&config.log_filter)?;

    let mut shell = Shell::new(config)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    shell.start(&mut out)?;

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut line = String::new();
    loop {
        write!(out, "sqlpane> ")?;
        out.flush()?;
        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(out)?;
            break;
        }
        if shell.handle_line(&line, &mut out)? == Flow::Quit {
            break;
        }
    }
    Ok(())
}
