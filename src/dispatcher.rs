//! Dispatch loop between the message queue and the output sink.
//!
//! Waits on the shutdown token and the queue at the same time. Each received
//! payload is rendered by the [`MessageFormatter`]; payloads that fail to
//! parse are counted and skipped, nothing else stops the loop.

use std::io::Write;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::formatter::MessageFormatter;
use crate::mqtt::message_manager::{MessageReceiver, MqttMessage};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub received: usize,
    pub printed: usize,
    /// Messages skipped because the payload did not parse
    pub dropped: usize,
    pub write_errors: usize,
}

pub struct Dispatcher<W: Write> {
    formatter: MessageFormatter,
    receiver: MessageReceiver,
    out: W,
    stats: DispatchStats,
}

impl<W: Write> Dispatcher<W> {
    pub fn new(formatter: MessageFormatter, receiver: MessageReceiver, out: W) -> Self {
        Self {
            formatter,
            receiver,
            out,
            stats: DispatchStats::default(),
        }
    }

    #[cfg(test)]
    fn into_output(self) -> W {
        self.out
    }

    /// Runs until `shutdown` is cancelled. A closed queue does not end the
    /// loop; only the shutdown token does.
    pub async fn run(&mut self, shutdown: CancellationToken) -> DispatchStats {
        let mut queue_open = true;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Shutdown requested, leaving dispatch loop");
                    break;
                }
                message = self.receiver.recv(), if queue_open => match message {
                    Some(message) => self.dispatch(&message),
                    None => {
                        debug!("Message queue closed, waiting for shutdown");
                        queue_open = false;
                    }
                },
            }
        }

        self.stats
    }

    fn dispatch(&mut self, message: &MqttMessage) {
        self.stats.received += 1;
        trace!("Dispatching {}", message);

        match self.formatter.render(&message.payload, &mut self.out) {
            Ok(()) => self.stats.printed += 1,
            Err(e) if e.is_parse() => self.stats.dropped += 1,
            Err(e) => {
                self.stats.write_errors += 1;
                error!("{}", e);
            }
        }
    }
}
