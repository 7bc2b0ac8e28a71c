//! Structured execution of the external tools the pipeline drives.
//!
//! Every invocation is a [`std::process::Command`] built from an argument
//! list; nothing is ever passed through a shell. Commands block until
//! completion with stdout/stderr captured, and a non-zero exit aborts the
//! calling stage.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{error, info};
use std::io::Write;
use std::process::{Command, Output, Stdio};
use std::time::Duration;

use crate::error::Error;

/// Render the program and arguments for logging.
fn render(cmd: &Command) -> String {
    let mut line = cmd.get_program().to_string_lossy().into_owned();
    for arg in cmd.get_args() {
        line.push(' ');
        line.push_str(&arg.to_string_lossy());
    }
    line
}

/// Spinner shown while an external tool runs; hidden when stderr is not a TTY.
fn spinner(program: &str) -> ProgressBar {
    let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr())
        .with_message(program.to_string());
    bar.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {spinner} {msg}")
            .unwrap()
            .tick_strings(&["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷"]),
    );
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

fn check(program: String, output: Output) -> Result<Output, Error> {
    if output.status.success() {
        Ok(output)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        error!("`{}` failed:\n{}", program, stderr);
        Err(Error::CommandFailed {
            program,
            status: output.status,
            stderr,
        })
    }
}

/// Run a command to completion, capturing stdout and stderr.
///
/// Returns the full [`Output`] on exit status 0. A non-zero exit or a spawn
/// failure aborts the calling stage; there is no retry or timeout.
pub fn run(cmd: &mut Command) -> Result<Output, Error> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    info!("Executing: {}", render(cmd));
    let bar = spinner(&program);
    let result = cmd.output();
    bar.finish_and_clear();
    let output = result.map_err(|source| Error::CommandSpawn {
        program: program.clone(),
        source,
    })?;
    check(program, output)
}

/// Run a command, feeding `input` to its stdin before collecting output.
///
/// Used for tools reading from `-`, e.g. `bedtools merge -i -`. The input is
/// written from a separate thread so a child filling its stdout pipe cannot
/// deadlock against the writer.
pub fn run_with_stdin(cmd: &mut Command, input: Vec<u8>) -> Result<Output, Error> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    info!("Executing (with piped stdin): {}", render(cmd));
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let bar = spinner(&program);
    let result: Result<Output, Error> = (|| {
        let mut child = cmd.spawn().map_err(|source| Error::CommandSpawn {
            program: program.clone(),
            source,
        })?;
        // stdin is always piped above, so take() cannot return None
        let mut stdin = child.stdin.take().ok_or_else(|| Error::CommandSpawn {
            program: program.clone(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "child stdin unavailable"),
        })?;
        let writer = std::thread::spawn(move || {
            // A child that stops reading early (broken pipe) will report
            // its own failure through the exit status.
            let _ = stdin.write_all(&input);
        });
        let output = child
            .wait_with_output()
            .map_err(|source| Error::CommandSpawn {
                program: program.clone(),
                source,
            })?;
        let _ = writer.join();
        Ok(output)
    })();
    bar.finish_and_clear();
    check(program, result?)
}
