//! Interactive bench commands read from stdin.

use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Result, bail};
use tagprobe_core::{
    AdapterState, BleError, BleErrorCode, MockAdapter, Orchestrator, TESTS,
};

const HELP: &str = "\
Commands:
  connect        connect to the discovered device
  disconnect     disconnect from the device
  test <ID>      run a test (see 'tests')
  tests          list the registered tests
  forget         forget the discovered device
  clear          clear the event log
  status         show the connection status
  state          print the application state as JSON
  help           show this help
  quit           shut down and exit
Demo only:
  power on|off   switch the simulated adapter
  drop           simulate the device dropping the link";

/// One line of bench input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BenchCommand {
    Connect,
    Disconnect,
    Test(String),
    Tests,
    Forget,
    Clear,
    Status,
    State,
    Help,
    Quit,
    Power(bool),
    Drop,
}

impl FromStr for BenchCommand {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            bail!("empty command");
        };
        let argument = words.next();
        if words.next().is_some() {
            bail!("too many arguments to '{}'", command);
        }

        let command = match (command.to_lowercase().as_str(), argument) {
            ("connect", None) => BenchCommand::Connect,
            ("disconnect", None) => BenchCommand::Disconnect,
            ("test", Some(id)) => BenchCommand::Test(id.to_uppercase()),
            ("test", None) => bail!("usage: test <ID>"),
            ("tests", None) => BenchCommand::Tests,
            ("forget", None) => BenchCommand::Forget,
            ("clear", None) => BenchCommand::Clear,
            ("status", None) => BenchCommand::Status,
            ("state", None) => BenchCommand::State,
            ("help" | "?", None) => BenchCommand::Help,
            ("quit" | "exit", None) => BenchCommand::Quit,
            ("power", Some(state)) => match state.to_lowercase().as_str() {
                "on" => BenchCommand::Power(true),
                "off" => BenchCommand::Power(false),
                _ => bail!("usage: power on|off"),
            },
            ("drop", None) => BenchCommand::Drop,
            (other, _) => bail!("unknown command '{}', try 'help'", other),
        };
        Ok(command)
    }
}

/// Whether the bench keeps reading input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Applies bench commands to a running orchestrator.
pub struct Bench<'a> {
    orchestrator: &'a Orchestrator,
    demo: Option<Arc<MockAdapter>>,
}

impl<'a> Bench<'a> {
    pub fn new(orchestrator: &'a Orchestrator, demo: Option<Arc<MockAdapter>>) -> Self {
        Self { orchestrator, demo }
    }

    /// Run one command, writing any direct reply to `out`. Everything else
    /// shows up through the event log.
    pub fn execute(&self, command: BenchCommand, out: &mut impl Write) -> Result<Flow> {
        let view = self.orchestrator.view();
        match command {
            BenchCommand::Connect => {
                if self.orchestrator.connect_active().is_none() {
                    writeln!(out, "No device found yet")?;
                } else if !view.can_connect {
                    writeln!(out, "Connection busy; request queued")?;
                }
            }
            BenchCommand::Disconnect => {
                if view.can_disconnect {
                    self.orchestrator.disconnect();
                } else {
                    writeln!(out, "Not connected")?;
                }
            }
            BenchCommand::Test(id) => {
                // A running test is replaced, so only the connection matters.
                if view.can_disconnect {
                    self.orchestrator.execute_test(id);
                } else {
                    writeln!(out, "Not connected")?;
                }
            }
            BenchCommand::Tests => {
                for test in TESTS {
                    writeln!(out, "{:<26} {}", test.id, test.title)?;
                }
            }
            BenchCommand::Forget => self.orchestrator.forget_device(),
            BenchCommand::Clear => self.orchestrator.clear_logs(),
            BenchCommand::Status => {
                writeln!(out, "Status: {}", view.label)?;
                if let Some(device) = &view.active_device {
                    writeln!(out, "Device: {}", device)?;
                }
                if let Some(test) = &view.current_test_id {
                    writeln!(out, "Running: {}", test)?;
                }
            }
            BenchCommand::State => {
                let state = self.orchestrator.state();
                writeln!(out, "{}", serde_json::to_string_pretty(&*state)?)?;
            }
            BenchCommand::Help => writeln!(out, "{}", HELP)?,
            BenchCommand::Quit => return Ok(Flow::Quit),
            BenchCommand::Power(on) => match &self.demo {
                Some(adapter) => adapter.set_power_state(if on {
                    AdapterState::PoweredOn
                } else {
                    AdapterState::PoweredOff
                }),
                None => writeln!(out, "Only available with --demo")?,
            },
            BenchCommand::Drop => match &self.demo {
                Some(adapter) => {
                    let error = BleError::new(
                        BleErrorCode::DeviceDisconnected,
                        "Device disconnected unexpectedly",
                    )
                    .with_reason("SIMULATED_LINK_LOSS");
                    if adapter.trigger_disconnect(adapter.device().id(), Some(error)) == 0 {
                        writeln!(out, "Not connected")?;
                    }
                }
                None => writeln!(out, "Only available with --demo")?,
            },
        }
        Ok(Flow::Continue)
    }
}
