mod countdown;
mod progress;
mod runner;
mod session;

// Public API of the quiz subsystem.
pub use crate::error::SessionError;
pub use countdown::Countdown;
pub use progress::{QuizProgress, SessionPhase};
pub use runner::QuizRunner;
pub use session::{DEFAULT_TIME_LIMIT, Direction, QuizOptions, QuizSession, SessionEffect};
