use std::io::BufRead;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Operator input for the studio loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Capture,
    Quit,
}

/// Map one input line to a command. An empty line captures, like pressing
/// the shutter button.
pub fn parse_command(line: &str) -> Option<Command> {
    match line.trim().to_lowercase().as_str() {
        "" | "c" | "capture" => Some(Command::Capture),
        "q" | "quit" | "exit" => Some(Command::Quit),
        _ => None,
    }
}

/// Forward commands read line by line from `input` until it closes or the
/// receiver goes away. Blocks; run it off the runtime.
pub fn read_commands<R: BufRead>(input: R, tx: mpsc::Sender<Command>) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to read command input");
                break;
            }
        };
        match parse_command(&line) {
            Some(command) => {
                if tx.blocking_send(command).is_err() {
                    break;
                }
            }
            None => debug!(line = %line, "ignoring unknown command"),
        }
    }
    info!("command input closed");
}

/// Read commands from stdin on a plain thread. A pending stdin read cannot be
/// cancelled, so it must not hold up runtime shutdown.
pub fn spawn_stdin_commands(tx: mpsc::Sender<Command>) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("stdin-commands".into())
        .spawn(move || read_commands(std::io::stdin().lock(), tx))?;
    Ok(())
}
