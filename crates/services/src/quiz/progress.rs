/// Coarse state of a quiz session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Running,
    Paused,
    /// Tutor mode: the answer is in and the explanation is showing.
    Explaining,
    Completed,
    Quit,
}

impl SessionPhase {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionPhase::Completed | SessionPhase::Quit)
    }
}

/// Aggregated view of session progress, useful for UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizProgress {
    pub total: usize,
    pub position: usize,
    pub answered: bool,
    pub selected_answer: Option<usize>,
    pub score: u32,
    pub phase: SessionPhase,
}
