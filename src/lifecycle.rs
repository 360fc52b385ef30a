//! # Lifecycle State Machine
//!
//! The aggregator's readiness handling expressed as a pure transition
//! function `(State, Event) -> Transition`. The engine produces events and
//! performs the returned [`Action`]; it never decides the next state itself.
//!
//! ```text
//!  Unopened --OpenRequested--> Open --Exhausted--------------------> Closed
//!      |                         |  --Failed/PeerClosed/CloseRequested-^
//!      +-------CloseRequested----+-----------------------------------^
//! ```

/// Lifecycle state of an aggregator. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
  /// Sources may still be appended; no sink attached.
  Unopened,
  /// A sink is attached and the drive loop is running.
  Open,
  /// All resources released. Irreversible.
  Closed,
}

/// Something that happened to the aggregator or its sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
  /// A caller invoked one of the open modes.
  OpenRequested,
  /// The engine is attached to its sink.
  OpenCompleted,
  /// The sink can take bytes. `peer_ready` is `false` while the read side of
  /// a bound pipe is not yet established.
  Writable {
    /// Whether the paired read side is established.
    peer_ready: bool,
  },
  /// The buffer is empty and no more data can be obtained.
  Exhausted,
  /// The sink rejected a write.
  Failed,
  /// The consumer dropped the read side of the bound pipe.
  PeerClosed,
  /// `close()` was called.
  CloseRequested,
}

/// Side effect the engine must perform for a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
  /// Attach the sink and start the drive loop.
  Attach,
  /// Open the first source and perform one refill.
  Prime,
  /// Drain the buffer into the sink, refilling as needed.
  Drain,
  /// Wait for the retry delay, then re-check readiness.
  Defer,
  /// Verify the delivered length, shut the sink down, release resources.
  Finish,
  /// Release resources without flushing.
  Teardown,
  /// Refuse the request; the aggregator was already opened.
  Reject,
  /// Nothing to do.
  Ignore,
}

/// Result of feeding an event into the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
  /// State after the event.
  pub next: State,
  /// Side effect to perform.
  pub action: Action,
}

impl Transition {
  fn to(next: State, action: Action) -> Self {
    Self { next, action }
  }
}

/// Computes the transition for `event` in `state`.
pub fn transition(state: State, event: Event) -> Transition {
  use Action::*;
  use State::*;

  match (state, event) {
    (Unopened, Event::OpenRequested) => Transition::to(Open, Attach),
    (Unopened, Event::CloseRequested) => Transition::to(Closed, Teardown),
    (Unopened, _) => Transition::to(Unopened, Ignore),

    (Open, Event::OpenRequested) => Transition::to(Open, Reject),
    (Open, Event::OpenCompleted) => Transition::to(Open, Prime),
    (Open, Event::Writable { peer_ready: false }) => Transition::to(Open, Defer),
    (Open, Event::Writable { peer_ready: true }) => Transition::to(Open, Drain),
    (Open, Event::Exhausted) => Transition::to(Closed, Finish),
    (Open, Event::Failed | Event::PeerClosed | Event::CloseRequested) => {
      Transition::to(Closed, Teardown)
    }

    (Closed, Event::OpenRequested) => Transition::to(Closed, Reject),
    (Closed, _) => Transition::to(Closed, Ignore),
  }
}
