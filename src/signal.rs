// Transfer signals: a start/progress/finish stream that decouples the
// upload and download engines from whatever renders progress. Emission
// goes through an unbounded channel so the transfer never waits on the
// observer, and a disabled emitter turns every call into a no-op.

use std::sync::mpsc::{self, Receiver, Sender};

/// What the observer needs to size a progress indicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferInfo {
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferSignal {
    /// `None` while the size is not known yet (download before metadata).
    Start(Option<TransferInfo>),
    /// Cumulative bytes transferred so far.
    Progress(u64),
    Finish,
}

/// Sending half of the signal channel, cheap to clone into body readers.
#[derive(Debug, Clone, Default)]
pub struct Signals {
    tx: Option<Sender<TransferSignal>>,
}

impl Signals {
    /// An emitter nobody listens to.
    pub fn disabled() -> Self {
        Signals { tx: None }
    }

    /// An enabled emitter and the receiver an observer should drain.
    pub fn channel() -> (Self, Receiver<TransferSignal>) {
        let (tx, rx) = mpsc::channel();
        (Signals { tx: Some(tx) }, rx)
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    pub fn start(&self, info: Option<TransferInfo>) {
        self.emit(TransferSignal::Start(info));
    }

    pub fn progress(&self, bytes: u64) {
        self.emit(TransferSignal::Progress(bytes));
    }

    pub fn finish(&self) {
        self.emit(TransferSignal::Finish);
    }

    /// Emit `Start` and return a guard that emits `Finish` when dropped,
    /// so every exit path of a transfer closes the stream.
    pub fn begin(&self, info: Option<TransferInfo>) -> TransferGuard {
        self.start(info);
        TransferGuard {
            signals: self.clone(),
        }
    }

    fn emit(&self, signal: TransferSignal) {
        if let Some(tx) = &self.tx {
            // A gone observer is not the transfer's problem.
            let _ = tx.send(signal);
        }
    }
}

/// Emits `Finish` exactly once, on drop.
#[must_use = "dropping the guard finishes the transfer"]
pub struct TransferGuard {
    signals: Signals,
}

impl TransferGuard {
    pub fn signals(&self) -> &Signals {
        &self.signals
    }
}

impl Drop for TransferGuard {
    fn drop(&mut self) {
        self.signals.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_emitter_never_blocks() {
        let signals = Signals::disabled();
        assert!(!signals.is_enabled());
        let guard = signals.begin(None);
        guard.signals().progress(10);
        drop(guard);
    }

    #[test]
    fn guard_finishes_after_progress() {
        let (signals, rx) = Signals::channel();
        {
            let guard = signals.begin(Some(TransferInfo {
                name: "a.txt".into(),
                size: 3,
            }));
            guard.signals().progress(1);
            guard.signals().progress(3);
        }
        drop(signals);

        let got: Vec<_> = rx.iter().collect();
        assert_eq!(
            got,
            vec![
                TransferSignal::Start(Some(TransferInfo {
                    name: "a.txt".into(),
                    size: 3
                })),
                TransferSignal::Progress(1),
                TransferSignal::Progress(3),
                TransferSignal::Finish,
            ]
        );
    }

    #[test]
    fn send_after_observer_left_is_ignored() {
        let (signals, rx) = Signals::channel();
        drop(rx);
        signals.progress(5);
        signals.finish();
    }
}
