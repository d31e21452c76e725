// Copyright (c) The nbtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Canceling a notebook run on Ctrl-C.

use crate::errors::SignalHandlerSetupError;
use futures::stream::{BoxStream, SelectAll, StreamExt};

/// Which signals a [`NotebookRunner`](crate::runner::NotebookRunner) listens for.
///
/// Passed into [`NotebookRunnerBuilder::build`](crate::runner::NotebookRunnerBuilder::build).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SignalHandlerKind {
    /// Cancel the run on Ctrl-C. On Unix, SIGTERM and SIGHUP cancel it as well.
    Standard,

    /// Ignore signals entirely. Used by tests and by the libtest harness, where the test
    /// harness owns signal handling.
    Noop,
}

impl SignalHandlerKind {
    /// Must be called from within a tokio runtime.
    pub(crate) fn build(self) -> Result<SignalHandler, SignalHandlerSetupError> {
        let mut events = SelectAll::new();
        if self == Self::Standard {
            for stream in imp::shutdown_streams()? {
                events.push(stream);
            }
        }
        Ok(SignalHandler { events })
    }
}

/// Merges every installed signal into a single stream of shutdown events.
pub(crate) struct SignalHandler {
    events: SelectAll<BoxStream<'static, ShutdownEvent>>,
}

impl SignalHandler {
    /// Waits for the next shutdown signal.
    ///
    /// Returns `None` straight away if no signals are installed, or once every signal stream
    /// has closed.
    pub(crate) async fn recv(&mut self) -> Option<ShutdownEvent> {
        self.events.next().await
    }
}

impl std::fmt::Debug for SignalHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalHandler")
            .field("installed", &self.events.len())
            .finish()
    }
}

/// A signal that cancels the run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum ShutdownEvent {
    Interrupt,
    #[cfg(unix)]
    Terminate,
    #[cfg(unix)]
    Hangup,
}

#[cfg(unix)]
mod imp {
    use super::*;
    use futures::stream;
    use tokio::signal::unix::{SignalKind, signal};

    pub(super) fn shutdown_streams() -> std::io::Result<Vec<BoxStream<'static, ShutdownEvent>>> {
        [
            (SignalKind::interrupt(), ShutdownEvent::Interrupt),
            (SignalKind::terminate(), ShutdownEvent::Terminate),
            (SignalKind::hangup(), ShutdownEvent::Hangup),
        ]
        .into_iter()
        .map(|(kind, event)| -> std::io::Result<BoxStream<'static, ShutdownEvent>> {
            let signal = signal(kind)?;
            Ok(stream::unfold(signal, move |mut signal| async move {
                signal.recv().await.map(|()| (event, signal))
            })
            .boxed())
        })
        .collect()
    }
}

#[cfg(windows)]
mod imp {
    use super::*;
    use futures::stream;
    use tokio::signal::windows::ctrl_c;

    pub(super) fn shutdown_streams() -> std::io::Result<Vec<BoxStream<'static, ShutdownEvent>>> {
        let ctrl_c = ctrl_c()?;
        let stream = stream::unfold(ctrl_c, |mut ctrl_c| async move {
            ctrl_c
                .recv()
                .await
                .map(|()| (ShutdownEvent::Interrupt, ctrl_c))
        });
        Ok(vec![stream.boxed()])
    }
}
