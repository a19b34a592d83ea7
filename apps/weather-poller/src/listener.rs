use crate::console::{Command, InputSource};
use crate::error::InputError;
use crate::export::Exporter;
use crate::shutdown::ShutdownCoordinator;
use std::thread::JoinHandle;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerReport {
    pub exports: u32,
    pub failed_exports: u32,
    pub rejected_inputs: u32,
}

/// Turns console commands into exports and shutdown requests until shutdown
/// is observed.
pub struct CommandListener {
    input: Box<dyn InputSource>,
    exporter: Exporter,
    export_limit: usize,
    shutdown: ShutdownCoordinator,
    poll_slice: Duration,
}

impl CommandListener {
    pub fn new(
        input: Box<dyn InputSource>,
        exporter: Exporter,
        export_limit: usize,
        shutdown: ShutdownCoordinator,
        poll_slice: Duration,
    ) -> Self {
        Self {
            input,
            exporter,
            export_limit,
            shutdown,
            poll_slice,
        }
    }

    pub fn spawn(self) -> std::io::Result<JoinHandle<ListenerReport>> {
        std::thread::Builder::new()
            .name("command-listener".to_string())
            .spawn(move || self.run())
    }

    pub fn run(mut self) -> ListenerReport {
        let mut report = ListenerReport::default();
        tracing::info!(
            source = self.input.name(),
            "command listener started: 'e' exports the latest readings, 'q' quits"
        );

        while !self.shutdown.is_shutdown() {
            match self.input.poll(self.poll_slice) {
                Ok(None) => {}
                Ok(Some(Command::Export)) => {
                    if self.export() {
                        report.exports += 1;
                    } else {
                        report.failed_exports += 1;
                    }
                }
                Ok(Some(Command::Quit)) => {
                    tracing::info!("quit command received, shutting down");
                    self.shutdown.signal_shutdown();
                }
                Err(err @ InputError::Unrecognized(_)) => {
                    report.rejected_inputs += 1;
                    tracing::warn!(error = %err, "ignoring console input");
                }
                Err(err @ InputError::Read(_)) => {
                    tracing::error!(error = %err, "console read failed");
                    // keeps a persistently failing source from spinning
                    std::thread::sleep(self.poll_slice);
                }
            }
        }

        tracing::info!(exports = report.exports, "command listener stopped");
        report
    }

    fn export(&self) -> bool {
        match self.exporter.export_recent(self.export_limit) {
            Ok(summary) => {
                tracing::info!(
                    rows = summary.rows,
                    path = %summary.path.display(),
                    "exported recent readings"
                );
                true
            }
            Err(err) => {
                tracing::error!(
                    error = %err,
                    path = %self.exporter.path().display(),
                    "export failed"
                );
                false
            }
        }
    }
}
