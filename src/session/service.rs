//! Thread-hosted session service.
//!
//! Runs a [`Session`] on its own OS thread with a current-thread tokio
//! runtime, the way a UI embeds it: intents go in over a command channel,
//! outcomes come back as [`SessionEvent`]s. The loop is a `select!` over
//! commands, transport completions and the optional pending-request
//! deadline.

use std::thread::JoinHandle;

use anyhow::{anyhow, Context, Result};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use crate::domain::models::{ConnectionState, ErrorKind, PeripheralId, SessionEvent};
use crate::session::dispatch::ChannelForwarder;
use crate::session::machine::{Session, SessionConfig};
use crate::session::transport::{Transport, TransportEvent};

/// Intents accepted by the session loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Connect(PeripheralId),
    Disconnect,
    Read,
    Write(Vec<u8>),
    Toggle,
    Shutdown,
}

/// Spawns and names the session thread.
pub struct SessionService;

impl SessionService {
    /// Spawn the session loop over `transport`, consuming the transport's
    /// event stream. Returns the command handle and the session event
    /// receiver.
    pub fn spawn<T>(
        config: SessionConfig,
        transport: T,
        transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Result<(SessionHandle, mpsc::UnboundedReceiver<SessionEvent>)>
    where
        T: Transport + 'static,
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to build the session runtime")?;
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let thread = std::thread::spawn(move || {
            runtime.block_on(run(config, transport, command_rx, transport_events, event_tx));
            debug!("session thread exited");
        });

        Ok((
            SessionHandle {
                commands: command_tx,
                thread: Some(thread),
            },
            event_rx,
        ))
    }
}

/// Command handle onto the spawned session.
///
/// Sends are fire-and-forget; rejections and completions come back on the
/// event receiver. Dropping the handle asks the loop to shut down.
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    thread: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn connect(&self, peripheral: impl Into<PeripheralId>) -> Result<()> {
        self.send(SessionCommand::Connect(peripheral.into()))
    }

    pub fn disconnect(&self) -> Result<()> {
        self.send(SessionCommand::Disconnect)
    }

    pub fn read(&self) -> Result<()> {
        self.send(SessionCommand::Read)
    }

    pub fn write(&self, value: impl Into<Vec<u8>>) -> Result<()> {
        self.send(SessionCommand::Write(value.into()))
    }

    pub fn toggle(&self) -> Result<()> {
        self.send(SessionCommand::Toggle)
    }

    /// Stop the loop and wait for the thread to finish.
    pub fn shutdown(mut self) -> Result<()> {
        self.send(SessionCommand::Shutdown)?;
        if let Some(thread) = self.thread.take() {
            thread
                .join()
                .map_err(|_| anyhow!("session thread panicked"))?;
        }
        Ok(())
    }

    fn send(&self, command: SessionCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| anyhow!("session loop is no longer running"))
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        let _ = self.commands.send(SessionCommand::Shutdown);
    }
}

async fn run<T: Transport>(
    config: SessionConfig,
    transport: T,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    mut transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    events: mpsc::UnboundedSender<SessionEvent>,
) {
    let rejections = events.clone();
    let mut session = Session::new(config, transport);
    session.register_observer(Box::new(ChannelForwarder::new(events)));
    info!("session loop started");

    loop {
        let deadline = session.pending_deadline().map(Instant::from_std);
        let expiry = async move {
            match deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            command = commands.recv() => match command {
                Some(SessionCommand::Shutdown) | None => {
                    debug!("session loop shutting down");
                    session.disconnect().await;
                    // Let an already-queued close acknowledgment land so the
                    // final state change goes out before the channel drops.
                    while session.state() != ConnectionState::Disconnected {
                        match transport_events.try_recv() {
                            Ok(event) => session.handle_transport_event(event).await,
                            Err(_) => break,
                        }
                    }
                    break;
                }
                Some(command) => {
                    if let Err(error) = apply(&mut session, command).await {
                        // A channel caller has no return path for the
                        // synchronous rejection; hand it back as an event.
                        let _ = rejections.send(SessionEvent::OperationFailed(error));
                    }
                }
            },
            event = transport_events.recv() => match event {
                Some(event) => session.handle_transport_event(event).await,
                None => {
                    debug!("transport event channel closed");
                    session.disconnect().await;
                    break;
                }
            },
            () = expiry => session.expire_pending().await,
        }
    }
}

async fn apply<T: Transport>(
    session: &mut Session<T>,
    command: SessionCommand,
) -> Result<(), ErrorKind> {
    match command {
        SessionCommand::Connect(peripheral) => session.connect(peripheral).await,
        SessionCommand::Disconnect => {
            session.disconnect().await;
            Ok(())
        }
        SessionCommand::Read => session.request_read().await,
        SessionCommand::Write(value) => session.request_write(value).await,
        SessionCommand::Toggle => session.request_toggle().await,
        // Intercepted by the loop before it gets here.
        SessionCommand::Shutdown => Ok(()),
    }
}
