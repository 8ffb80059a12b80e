use std::{
    io::{self, Write},
    thread,
};

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;

use crate::types::ConfirmedCount;

/// Consumer of confirmed counts (display, speech, network, ...).
pub trait Announcer: Send + 'static {
    fn announce(&mut self, count: ConfirmedCount) -> Result<()>;
}

/// Shows the latest confirmed count as a digit on a terminal line.
pub struct TerminalDisplay<W> {
    out: W,
}

impl TerminalDisplay<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> TerminalDisplay<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send + 'static> Announcer for TerminalDisplay<W> {
    fn announce(&mut self, count: ConfirmedCount) -> Result<()> {
        writeln!(self.out, "fingers: {count}").context("failed to write count")?;
        self.out.flush().context("failed to flush count display")
    }
}

/// Spawns a thread that hands every received count to `announcer`.
///
/// The thread exits once all senders are dropped. Failures are logged and do
/// not stop later announcements.
pub fn start_announcer<A: Announcer>(
    mut announcer: A,
    confirmed_rx: Receiver<ConfirmedCount>,
) -> thread::JoinHandle<A> {
    thread::spawn(move || {
        for count in confirmed_rx.iter() {
            if let Err(err) = announcer.announce(count) {
                log::warn!("failed to announce count {count}: {err:?}");
            }
        }
        announcer
    })
}
