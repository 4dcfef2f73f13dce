//! A reactor-based asynchronous I/O runtime core: readiness-based event
//! demultiplexing, a timer/deferred-work chronology, a thread pool with a
//! pluggable load balancer, and a leaky-bucket rate limiter.
//!
//! This crate does not itself do socket I/O — see [`socket::Socket`] for
//! the minimal surface it expects external socket code to provide. It
//! plays the role mio's `Poll`/`Registry` split plays for a single OS
//! polling mechanism, generalized with an explicit run loop, per-handle
//! callback dispatch, and a chronology of timers and deferred work, the way
//! `bloomberg/ntf-core`'s `ntci`/`ntcs` reactor layer builds on top of a
//! bare multiplexer.
//!
//! # Example
//!
//! ```no_run
//! use reax::{Config, Reactor};
//!
//! let reactor = Reactor::new(Config::new())?;
//! reactor.execute(|| println!("ran on the reactor thread"));
//! reactor.poll()?;
//! # Ok::<(), reax::Error>(())
//! ```

#[macro_use]
mod macros;

pub mod chronology;
pub mod config;
pub mod error;
pub mod event;
pub mod handle;
pub mod interest;
pub mod pool;
pub mod ratelimit;
pub mod reactor;
pub mod socket;

pub use chronology::{Chronology, Timer, TimerContext, TimerEvent, TimerOptions, TimerState};
pub use config::Config;
pub use error::{Error, ErrorKind};
pub use event::{Event, EventSet, ReadySet};
pub use handle::Handle;
pub use interest::{Interest, InterestSet, Shot, Trigger};
pub use pool::{ReactorIndex, ThreadPool};
pub use ratelimit::{LeakyBucket, RateLimiter};
pub use reactor::{CancellationToken, DetachCallback, ReadinessCallback, Reactor, ReactorState, Strand};
pub use socket::{Socket, SocketRef};
