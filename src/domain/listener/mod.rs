mod session;

pub use session::{InvalidStateTransition, ListenerSession, ListenerState};
