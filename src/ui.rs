// UI layer: the interactive reassignment flow. The flow talks to the
// terminal through the `Console` trait so it can be driven by a script
// in tests; `TerminalConsole` is the real thing built on `dialoguer`.

use crate::api::{AsmApi, DeviceLookup};
use crate::config::{ServerEntry, ServerMap};
use crate::error::{AsmError, Result};
use crossterm::style::Stylize;
use crossterm::tty::IsTty;
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::time::Duration;

/// How a run ended. Cancelling is not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    Cancelled,
    Failed,
}

impl RunOutcome {
    /// 0 for success or cancel, 1 for failure.
    pub fn code(self) -> u8 {
        match self {
            RunOutcome::Succeeded | RunOutcome::Cancelled => 0,
            RunOutcome::Failed => 1,
        }
    }

    pub fn exit_code(self) -> ExitCode {
        ExitCode::from(self.code())
    }
}

/// Everything the flow needs from a terminal.
pub trait Console {
    /// Prompt and return one line of input. An error ends the run.
    fn ask(&mut self, prompt: &str) -> Result<String>;
    fn say(&mut self, line: &str);
    fn success(&mut self, line: &str);
    fn failure(&mut self, line: &str);
    /// Show that a network call is in flight.
    fn busy(&mut self, _message: &str) {}
    fn idle(&mut self) {}
}

/// Print `prompt` and read one line from `input`, without the line ending.
/// End of input is an error: there is no operator left to answer.
pub fn prompt_line<R, W>(input: &mut R, output: &mut W, prompt: &str) -> Result<String>
where
    R: BufRead,
    W: Write,
{
    write!(output, "{}: ", prompt)?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(AsmError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "input closed before an answer was given",
        )));
    }
    Ok(line.trim_end_matches(&['\r', '\n'][..]).to_string())
}

/// `dialoguer` prompts, an `indicatif` spinner while waiting on the API and
/// coloured result lines. Piped input is read line by line instead, since
/// `dialoguer` only reads from a terminal.
pub struct TerminalConsole {
    interactive: bool,
    spinner: Option<ProgressBar>,
}

impl Default for TerminalConsole {
    fn default() -> Self {
        TerminalConsole {
            interactive: io::stdin().is_tty() && io::stderr().is_tty(),
            spinner: None,
        }
    }
}

impl TerminalConsole {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Console for TerminalConsole {
    fn ask(&mut self, prompt: &str) -> Result<String> {
        if !self.interactive {
            return prompt_line(&mut io::stdin().lock(), &mut io::stdout(), prompt);
        }
        let line = Input::<String>::new()
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()?;
        Ok(line)
    }

    fn say(&mut self, line: &str) {
        println!("{}", line);
    }

    fn success(&mut self, line: &str) {
        println!("{}", line.green());
    }

    fn failure(&mut self, line: &str) {
        eprintln!("{}", line.red());
    }

    fn busy(&mut self, message: &str) {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));
        self.spinner = Some(spinner);
    }

    fn idle(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

/// Parse a 1-based menu choice. The error text is what the operator sees
/// before being asked again.
pub fn parse_choice(input: &str, count: usize) -> Result<usize> {
    let number: usize = input
        .trim()
        .parse()
        .map_err(|_| AsmError::Validation("Please enter a valid number".into()))?;
    if (1..=count).contains(&number) {
        Ok(number)
    } else {
        Err(AsmError::Validation(format!(
            "Please enter a number between 1 and {}",
            count
        )))
    }
}

/// Print the numbered server menu and keep asking until the operator
/// enters a number in range.
pub fn select_server<'a, C>(servers: &'a ServerMap, console: &mut C) -> Result<&'a ServerEntry>
where
    C: Console + ?Sized,
{
    console.say("");
    console.say("Available Management Servers:");
    for (i, entry) in servers.entries().iter().enumerate() {
        console.say(&format!("{}. {}", i + 1, entry.name));
    }

    let prompt = format!("Select server (1-{})", servers.len());
    loop {
        let input = console.ask(&prompt)?;
        match parse_choice(&input, servers.len()) {
            Ok(number) => {
                if let Some(entry) = servers.choice(number) {
                    return Ok(entry);
                }
            }
            Err(e) => console.say(&e.to_string()),
        }
    }
}

/// The reassignment flow: serial -> search -> menu -> confirm -> patch.
/// Operator-facing failures are reported on the console and returned as
/// `RunOutcome::Failed`; `Err` is reserved for console I/O and bad
/// configuration.
pub fn run<A, C>(api: &A, servers: &ServerMap, console: &mut C) -> Result<RunOutcome>
where
    A: AsmApi + ?Sized,
    C: Console + ?Sized,
{
    if servers.is_empty() {
        return Err(AsmError::Configuration(
            "No management servers configured".into(),
        ));
    }

    console.say("Apple School Manager Device Management");
    console.say(&"=".repeat(50));

    let serial = console.ask("Enter device serial number")?.trim().to_uppercase();
    if serial.is_empty() {
        console.failure("Error: Serial number cannot be empty");
        return Ok(RunOutcome::Failed);
    }

    console.say("");
    console.say(&format!("Searching for device with serial number: {}", serial));
    console.busy("Searching...");
    let lookup = api.search_device(&serial);
    console.idle();

    let device = match lookup {
        DeviceLookup::Found(device) => device,
        DeviceLookup::NotFound => {
            console.failure(&format!(
                "Error: Device with serial number {} not found",
                serial
            ));
            return Ok(RunOutcome::Failed);
        }
        DeviceLookup::TransportError(detail) => {
            console.failure(&format!("Error searching for device: {}", detail));
            return Ok(RunOutcome::Failed);
        }
    };

    console.say("");
    console.say("Device found:");
    console.say(&format!("  ID: {}", device.id));
    console.say(&format!("  Model: {}", device.model()));
    console.say(&format!("  Current Server ID: {}", device.current_server()));

    let target = select_server(servers, console)?;

    console.say("");
    console.say(&format!("Selected: {} (ID: {})", target.name, target.id));

    let answer = console.ask(&format!(
        "Assign device {} to {}? (y/N)",
        serial, target.name
    ))?;
    if !answer.trim().eq_ignore_ascii_case("y") {
        console.say("Operation cancelled");
        return Ok(RunOutcome::Cancelled);
    }

    console.say("");
    console.busy(&format!("Assigning device to {}...", target.name));
    let result = api.assign(&device.id, &target.id);
    console.idle();

    match result {
        Ok(_) => {
            console.success("✅ Device successfully assigned to new management server!");
            console.say(&format!(
                "Device {} is now assigned to {}",
                serial, target.name
            ));
            Ok(RunOutcome::Succeeded)
        }
        Err(e) => {
            console.failure(&format!(
                "❌ Failed to assign device to management server: {}",
                e
            ));
            Ok(RunOutcome::Failed)
        }
    }
}

/// Print the servers the API knows about, to help fill in a mapping file.
pub fn show_servers<A, C>(api: &A, console: &mut C) -> Result<RunOutcome>
where
    A: AsmApi + ?Sized,
    C: Console + ?Sized,
{
    console.busy("Fetching management servers...");
    let result = api.list_servers();
    console.idle();

    let servers = match result {
        Ok(servers) => servers,
        Err(e) => {
            console.failure(&format!("Error fetching MDM servers: {}", e));
            return Ok(RunOutcome::Failed);
        }
    };

    if servers.is_empty() {
        console.say("No management servers returned");
        return Ok(RunOutcome::Succeeded);
    }

    console.say("Management servers:");
    for server in &servers {
        let name = server.attributes.server_name.as_deref().unwrap_or("(unnamed)");
        match server.attributes.server_type.as_deref() {
            Some(kind) => console.say(&format!("  {}  {} ({})", server.id, name, kind)),
            None => console.say(&format!("  {}  {}", server.id, name)),
        }
    }
    Ok(RunOutcome::Succeeded)
}
