//! Accept loop binding [`tio_session::Session`] to real sockets.
//!
//! This binary owns only transport: accepting connections and driving each
//! session's reads/writes off `mio` readiness. It registers no containers and
//! interprets no commands — the container registry and the verb-to-operation
//! dispatcher are both out of scope for this crate (see `container.rs` and
//! `session.rs` doc comments), so every accepted connection logs whatever it
//! reads and otherwise sits idle. A real deployment links this crate as a
//! library and supplies both.
//!
//! Built directly on `mio::{Poll, Token, Interest}`, the same primitives
//! `flux_network::tcp::TcpConnector` is built on — not on `TcpConnector`
//! itself, since its wire format prefixes every message with a length and a
//! send timestamp, which would corrupt this crate's own line/TLV framing.
//! See `DESIGN.md`.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};

use tio_session::session::DispatchCommand;
use tio_session::{Session, SessionConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Per-client session server for tio containers")]
struct Args {
    /// Address to accept client connections on.
    #[arg(long, default_value = "127.0.0.1:7674")]
    listen: SocketAddr,
}

const LISTENER: Token = Token(0);

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let mut poll = Poll::new()?;
    let mut listener = TcpListener::bind(args.listen)?;
    poll.registry().register(&mut listener, LISTENER, Interest::READABLE)?;
    tracing::info!(addr = %args.listen, "listening");

    let mut events = Events::with_capacity(256);
    let mut next_token = 1usize;
    let mut sessions: HashMap<Token, std::rc::Rc<std::cell::RefCell<Session<TcpStream>>>> = HashMap::new();

    loop {
        poll.poll(&mut events, Some(Duration::from_millis(250)))?;

        for event in events.iter() {
            if event.token() == LISTENER {
                loop {
                    match listener.accept() {
                        Ok((mut stream, peer)) => {
                            if let Err(e) = stream.set_nodelay(true) {
                                tracing::warn!(error = %e, "failed to set TCP_NODELAY");
                            }
                            let token = Token(next_token);
                            next_token += 1;
                            poll.registry().register(&mut stream, token, Interest::READABLE)?;
                            let session = Session::new(stream, SessionConfig::default());
                            sessions.insert(token, session);
                            tracing::info!(?peer, ?token, "client connected");
                        }
                        Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            break;
                        }
                    }
                }
                continue;
            }

            let token = event.token();
            let Some(session) = sessions.get(&token) else { continue };

            if event.is_readable() {
                let commands = session.borrow_mut().poll_commands();
                match commands {
                    Ok(commands) => {
                        for command in commands {
                            match command {
                                DispatchCommand::Text { verb, params, .. } => {
                                    tracing::debug!(?token, verb, ?params, "received text command (no dispatcher wired)");
                                }
                                DispatchCommand::Binary(body) => {
                                    tracing::debug!(?token, bytes = body.len(), "received binary command (no dispatcher wired)");
                                }
                            }
                        }
                    }
                    Err(e) => {
                        tracing::info!(?token, error = %e, "session closed");
                    }
                }
            }

            if !session.borrow().is_valid() {
                sessions.remove(&token);
            }
        }

        // Only READABLE interest is registered per socket, so a write that
        // previously blocked is retried here on the next wakeup rather than
        // via a WRITABLE registration dance.
        sessions.retain(|_, session| {
            if session.borrow().pending_bytes() > 0 {
                session.borrow_mut().drive_pipeline();
            }
            session.borrow().is_valid()
        });
    }
}
