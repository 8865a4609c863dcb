use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use quiz_core::model::{Attempt, Qbank, QbankId, Question, QuestionId, QuizHistoryRecord};
use rand::Rng;
use rand::seq::SliceRandom;

use super::progress::{QuizProgress, SessionPhase};
use crate::error::SessionError;

/// Per-question time limit used when the timer is on but no limit is given.
pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(60);

//
// ─── OPTIONS ───────────────────────────────────────────────────────────────────
//

/// How a quiz should be drawn and run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizOptions {
    pub question_count: usize,
    pub tutor_mode: bool,
    /// Per-question countdown; `None` disables the timer.
    pub time_limit: Option<Duration>,
}

impl QuizOptions {
    #[must_use]
    pub fn new(question_count: usize) -> Self {
        Self {
            question_count,
            tutor_mode: false,
            time_limit: None,
        }
    }

    #[must_use]
    pub fn with_tutor_mode(mut self, tutor_mode: bool) -> Self {
        self.tutor_mode = tutor_mode;
        self
    }

    #[must_use]
    pub fn with_time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit = Some(time_limit);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Prev,
    Next,
}

/// Side effects a transition asks its driver to perform, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEffect {
    /// Schedule a countdown; it must report `generation` when it elapses.
    ArmCountdown { generation: u64, after: Duration },
    CancelCountdown,
    RecordAttempt(Attempt),
    EmitHistory(QuizHistoryRecord),
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// State machine for a single quiz attempt.
///
/// Transitions are synchronous and return the effects to perform; they never
/// fail. A transition that does not apply in the current state (answering
/// twice, navigating past the ends, anything after the quiz ended) returns no
/// effects and leaves the session untouched.
///
/// Pausing disarms the countdown and resuming does not re-arm it. The question
/// on screen then runs untimed until a transition that arms a fresh countdown
/// (advance or navigate) happens.
pub struct QuizSession {
    qbank_id: QbankId,
    questions: Vec<Question>,
    position: usize,
    answered: bool,
    selected_answer: Option<usize>,
    credited: bool,
    paused: bool,
    tutor_mode: bool,
    time_limit: Option<Duration>,
    score: u32,
    showing_explanation: bool,
    completed: bool,
    quit: bool,
    countdown_generation: u64,
    attempted: HashSet<QuestionId>,
    started_at: DateTime<Utc>,
}

impl QuizSession {
    /// Draw questions from `bank` and start the quiz.
    ///
    /// Draws `question_count` questions without replacement, or the whole bank
    /// if it is smaller.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Empty` if the bank has no questions or zero
    /// questions were requested.
    pub fn start<R: Rng + ?Sized>(
        bank: &Qbank,
        options: &QuizOptions,
        started_at: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<(Self, Vec<SessionEffect>), SessionError> {
        if bank.is_empty() || options.question_count == 0 {
            return Err(SessionError::Empty);
        }

        let mut questions = bank.questions.clone();
        questions.shuffle(rng);
        questions.truncate(options.question_count);

        let mut session = Self {
            qbank_id: bank.id.clone(),
            questions,
            position: 0,
            answered: false,
            selected_answer: None,
            credited: false,
            paused: false,
            tutor_mode: options.tutor_mode,
            time_limit: options.time_limit,
            score: 0,
            showing_explanation: false,
            completed: false,
            quit: false,
            countdown_generation: 0,
            attempted: HashSet::new(),
            started_at,
        };

        let mut effects = Vec::new();
        session.arm(&mut effects);
        Ok((session, effects))
    }

    #[must_use]
    pub fn qbank_id(&self) -> &QbankId {
        &self.qbank_id
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.position)
    }

    #[must_use]
    pub fn score(&self) -> u32 {
        self.score
    }

    #[must_use]
    pub fn is_answered(&self) -> bool {
        self.answered
    }

    #[must_use]
    pub fn selected_answer(&self) -> Option<usize> {
        self.selected_answer
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    #[must_use]
    pub fn tutor_mode(&self) -> bool {
        self.tutor_mode
    }

    #[must_use]
    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit
    }

    #[must_use]
    pub fn is_showing_explanation(&self) -> bool {
        self.showing_explanation
    }

    #[must_use]
    pub fn countdown_generation(&self) -> u64 {
        self.countdown_generation
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        if self.quit {
            SessionPhase::Quit
        } else if self.completed {
            SessionPhase::Completed
        } else if self.paused {
            SessionPhase::Paused
        } else if self.showing_explanation {
            SessionPhase::Explaining
        } else {
            SessionPhase::Running
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.phase().is_terminal()
    }

    #[must_use]
    pub fn progress(&self) -> QuizProgress {
        QuizProgress {
            total: self.questions.len(),
            position: self.position,
            answered: self.answered,
            selected_answer: self.selected_answer,
            score: self.score,
            phase: self.phase(),
        }
    }

    /// Answer the current question with option `option`.
    ///
    /// Ignored if the question is already answered, the quiz is paused, or the
    /// quiz has ended.
    pub fn submit_answer(&mut self, option: usize, now: DateTime<Utc>) -> Vec<SessionEffect> {
        if self.is_finished() || self.answered || self.paused {
            return Vec::new();
        }
        let Some(question) = self.current_question() else {
            return Vec::new();
        };
        let question_id = question.id;
        let is_correct = question.is_correct(option);

        self.answered = true;
        self.selected_answer = Some(option);
        if is_correct {
            self.score += 1;
            self.credited = true;
        }

        let mut effects = Vec::new();
        self.disarm(&mut effects);
        self.push_attempt(
            Attempt::answered(question_id, option, is_correct, now),
            &mut effects,
        );

        if self.tutor_mode {
            self.showing_explanation = true;
        } else {
            self.advance(Some(option), now, &mut effects);
        }
        effects
    }

    /// The countdown tagged `generation` elapsed.
    ///
    /// Only the latest armed countdown counts, and only while the question is
    /// unanswered and the quiz is not paused. The question is then treated as
    /// answered with no selection.
    pub fn on_countdown_elapsed(&mut self, generation: u64, now: DateTime<Utc>) -> Vec<SessionEffect> {
        if generation != self.countdown_generation
            || self.is_finished()
            || self.answered
            || self.paused
        {
            return Vec::new();
        }
        let Some(question_id) = self.current_question().map(|q| q.id) else {
            return Vec::new();
        };

        self.answered = true;
        self.selected_answer = None;

        let mut effects = Vec::new();
        self.push_attempt(Attempt::omitted(question_id, now), &mut effects);

        if self.tutor_mode {
            self.showing_explanation = true;
        } else {
            self.advance(None, now, &mut effects);
        }
        effects
    }

    /// Leave the explanation and move on (tutor mode).
    pub fn continue_after_explanation(&mut self, now: DateTime<Utc>) -> Vec<SessionEffect> {
        if self.is_finished() || !self.showing_explanation {
            return Vec::new();
        }
        let mut effects = Vec::new();
        self.advance(self.selected_answer, now, &mut effects);
        effects
    }

    /// Move to the previous or next question.
    ///
    /// Going back forgets the answer state of the question returned to. Going
    /// forward requires the current question to be answered and is the same as
    /// advancing with the current selection.
    pub fn navigate(&mut self, direction: Direction, now: DateTime<Utc>) -> Vec<SessionEffect> {
        if self.is_finished() {
            return Vec::new();
        }
        let mut effects = Vec::new();
        match direction {
            Direction::Prev => {
                if self.position == 0 {
                    return effects;
                }
                self.position -= 1;
                self.clear_answer();
                self.arm(&mut effects);
            }
            Direction::Next => {
                if !self.answered || self.is_last() {
                    return effects;
                }
                self.advance(self.selected_answer, now, &mut effects);
            }
        }
        effects
    }

    /// Pause or resume.
    ///
    /// Both directions disarm the countdown; neither re-arms it.
    pub fn toggle_pause(&mut self) -> Vec<SessionEffect> {
        if self.is_finished() {
            return Vec::new();
        }
        self.paused = !self.paused;
        let mut effects = Vec::new();
        self.disarm(&mut effects);
        effects
    }

    /// Abandon the quiz, reporting the score so far against all drawn questions.
    pub fn quit(&mut self, now: DateTime<Utc>) -> Vec<SessionEffect> {
        if self.is_finished() {
            return Vec::new();
        }
        self.countdown_generation += 1;
        let mut effects = vec![SessionEffect::CancelCountdown];
        self.quit = true;
        self.showing_explanation = false;
        effects.push(SessionEffect::EmitHistory(self.history_record(now)));
        effects
    }

    fn is_last(&self) -> bool {
        self.position + 1 >= self.questions.len()
    }

    fn advance(&mut self, last_option: Option<usize>, now: DateTime<Utc>, effects: &mut Vec<SessionEffect>) {
        self.showing_explanation = false;

        if self.is_last() {
            let in_flight_correct = match (last_option, self.current_question()) {
                (Some(option), Some(question)) => question.is_correct(option),
                _ => false,
            };
            if in_flight_correct && !self.credited {
                self.score += 1;
                self.credited = true;
            }
            self.completed = true;
            self.disarm(effects);
            effects.push(SessionEffect::EmitHistory(self.history_record(now)));
            return;
        }

        self.position += 1;
        self.clear_answer();
        self.arm(effects);
    }

    fn clear_answer(&mut self) {
        self.answered = false;
        self.selected_answer = None;
        self.credited = false;
        self.showing_explanation = false;
    }

    fn arm(&mut self, effects: &mut Vec<SessionEffect>) {
        if let Some(after) = self.time_limit {
            self.countdown_generation += 1;
            effects.push(SessionEffect::ArmCountdown {
                generation: self.countdown_generation,
                after,
            });
        }
    }

    fn disarm(&mut self, effects: &mut Vec<SessionEffect>) {
        if self.time_limit.is_some() {
            self.countdown_generation += 1;
            effects.push(SessionEffect::CancelCountdown);
        }
    }

    // First outcome per question wins; revisits via `Prev` do not re-record.
    fn push_attempt(&mut self, attempt: Attempt, effects: &mut Vec<SessionEffect>) {
        if self.attempted.insert(attempt.question_id) {
            effects.push(SessionEffect::RecordAttempt(attempt));
        }
    }

    fn history_record(&self, now: DateTime<Utc>) -> QuizHistoryRecord {
        let total = u32::try_from(self.questions.len()).unwrap_or(u32::MAX);
        QuizHistoryRecord::new(self.qbank_id.clone(), self.score, total, now)
    }
}

impl fmt::Debug for QuizSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuizSession")
            .field("qbank_id", &self.qbank_id)
            .field("questions_len", &self.questions.len())
            .field("position", &self.position)
            .field("answered", &self.answered)
            .field("score", &self.score)
            .field("phase", &self.phase())
            .field("countdown_generation", &self.countdown_generation)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::PerformanceStatus;
    use quiz_core::time::fixed_now;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn bank(size: u64) -> Qbank {
        let questions = (1..=size)
            .map(|id| {
                Question::new(
                    QuestionId::new(id),
                    QbankId::new("bank"),
                    format!("Q{id}"),
                    vec!["a".into(), "b".into(), "c".into(), "d".into()],
                    usize::try_from(id % 4).unwrap(),
                )
                .unwrap()
            })
            .collect();
        Qbank::new(QbankId::new("bank"), "Bank", questions)
    }

    fn start(size: u64, options: QuizOptions) -> (QuizSession, Vec<SessionEffect>) {
        let mut rng = StdRng::seed_from_u64(7);
        QuizSession::start(&bank(size), &options, fixed_now(), &mut rng).unwrap()
    }

    fn correct(session: &QuizSession) -> usize {
        session.current_question().unwrap().correct_answer
    }

    fn wrong(session: &QuizSession) -> usize {
        (correct(session) + 1) % 4
    }

    fn history(effects: &[SessionEffect]) -> Option<&QuizHistoryRecord> {
        effects.iter().find_map(|effect| match effect {
            SessionEffect::EmitHistory(record) => Some(record),
            _ => None,
        })
    }

    fn attempts(effects: &[SessionEffect]) -> Vec<&Attempt> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                SessionEffect::RecordAttempt(attempt) => Some(attempt),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn draws_without_replacement_and_caps_at_bank_size() {
        let (session, effects) = start(10, QuizOptions::new(4));
        assert_eq!(session.total_questions(), 4);
        let unique: HashSet<_> = session.questions().iter().map(|q| q.id).collect();
        assert_eq!(unique.len(), 4);
        assert!(effects.is_empty());

        let (session, _) = start(3, QuizOptions::new(50));
        assert_eq!(session.total_questions(), 3);
    }

    #[test]
    fn empty_bank_or_zero_count_is_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        let empty = Qbank::new(QbankId::new("e"), "Empty", Vec::new());
        let err = QuizSession::start(&empty, &QuizOptions::new(5), fixed_now(), &mut rng)
            .unwrap_err();
        assert!(matches!(err, SessionError::Empty));

        let err = QuizSession::start(&bank(3), &QuizOptions::new(0), fixed_now(), &mut rng)
            .unwrap_err();
        assert!(matches!(err, SessionError::Empty));
    }

    #[test]
    fn timer_arms_on_start() {
        let (session, effects) =
            start(3, QuizOptions::new(3).with_time_limit(Duration::from_secs(30)));
        assert_eq!(
            effects,
            vec![SessionEffect::ArmCountdown {
                generation: 1,
                after: Duration::from_secs(30)
            }]
        );
        assert_eq!(session.countdown_generation(), 1);
    }

    #[test]
    fn three_question_run_completes_with_history() {
        let (mut session, _) = start(3, QuizOptions::new(3));

        let first = session.current_question().unwrap().id;
        let effects = session.submit_answer(correct(&session), fixed_now());
        assert_eq!(session.position(), 1);
        assert_eq!(session.score(), 1);
        let recorded = attempts(&effects);
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].question_id, first);
        assert_eq!(recorded[0].status(), PerformanceStatus::Correct);

        session.submit_answer(wrong(&session), fixed_now());
        assert_eq!(session.position(), 2);
        assert_eq!(session.score(), 1);

        let effects = session.submit_answer(wrong(&session), fixed_now());
        let record = history(&effects).expect("history emitted");
        assert_eq!(record.score, 1);
        assert_eq!(record.total_questions, 3);
        assert_eq!(record.qbank_id, QbankId::new("bank"));
        assert_eq!(session.phase(), SessionPhase::Completed);
    }

    #[test]
    fn last_correct_answer_is_credited_once() {
        let (mut session, _) = start(1, QuizOptions::new(1));
        let effects = session.submit_answer(correct(&session), fixed_now());
        assert_eq!(history(&effects).unwrap().score, 1);
        assert_eq!(session.score(), 1);
    }

    #[test]
    fn answering_twice_is_ignored() {
        let (mut session, _) = start(3, QuizOptions::new(3).with_tutor_mode(true));
        session.submit_answer(wrong(&session), fixed_now());
        let effects = session.submit_answer(correct(&session), fixed_now());
        assert!(effects.is_empty());
        assert_eq!(session.score(), 0);
    }

    #[test]
    fn tutor_mode_explains_before_advancing() {
        let (mut session, _) = start(3, QuizOptions::new(3).with_tutor_mode(true));
        session.submit_answer(correct(&session), fixed_now());
        assert_eq!(session.phase(), SessionPhase::Explaining);
        assert_eq!(session.position(), 0);
        assert_eq!(session.score(), 1);

        session.continue_after_explanation(fixed_now());
        assert_eq!(session.phase(), SessionPhase::Running);
        assert_eq!(session.position(), 1);
        assert!(!session.is_answered());
        assert_eq!(session.score(), 1);
    }

    #[test]
    fn continue_outside_explanation_is_ignored() {
        let (mut session, _) = start(3, QuizOptions::new(3).with_tutor_mode(true));
        assert!(session.continue_after_explanation(fixed_now()).is_empty());
        assert_eq!(session.position(), 0);
    }

    #[test]
    fn timeout_advances_without_credit_and_rearms() {
        let limit = Duration::from_secs(1);
        let (mut session, _) = start(3, QuizOptions::new(3).with_time_limit(limit));
        let first = session.current_question().unwrap().id;

        let effects = session.on_countdown_elapsed(1, fixed_now());
        assert_eq!(session.position(), 1);
        assert_eq!(session.score(), 0);
        assert_eq!(attempts(&effects)[0].question_id, first);
        assert_eq!(attempts(&effects)[0].status(), PerformanceStatus::Omitted);
        assert!(effects.contains(&SessionEffect::ArmCountdown {
            generation: 2,
            after: limit
        }));
    }

    #[test]
    fn stale_countdown_is_ignored() {
        let (mut session, _) =
            start(3, QuizOptions::new(3).with_time_limit(Duration::from_secs(1)));
        session.submit_answer(wrong(&session), fixed_now());
        assert!(session.on_countdown_elapsed(1, fixed_now()).is_empty());
        assert_eq!(session.position(), 1);
    }

    #[test]
    fn timeout_in_tutor_mode_explains() {
        let (mut session, _) = start(
            3,
            QuizOptions::new(3)
                .with_tutor_mode(true)
                .with_time_limit(Duration::from_secs(1)),
        );
        session.on_countdown_elapsed(1, fixed_now());
        assert_eq!(session.phase(), SessionPhase::Explaining);
        assert_eq!(session.selected_answer(), None);
        session.continue_after_explanation(fixed_now());
        assert_eq!(session.position(), 1);
        assert_eq!(session.score(), 0);
    }

    #[test]
    fn pause_blocks_answers_and_disarms_for_good() {
        let (mut session, _) =
            start(3, QuizOptions::new(3).with_time_limit(Duration::from_secs(1)));

        let effects = session.toggle_pause();
        assert_eq!(effects, vec![SessionEffect::CancelCountdown]);
        assert_eq!(session.phase(), SessionPhase::Paused);
        assert!(session.submit_answer(0, fixed_now()).is_empty());

        let effects = session.toggle_pause();
        assert_eq!(effects, vec![SessionEffect::CancelCountdown]);
        // the countdown armed at start is stale now and nothing replaced it
        assert!(session.on_countdown_elapsed(1, fixed_now()).is_empty());

        session.submit_answer(correct(&session), fixed_now());
        assert_eq!(session.score(), 1);
    }

    #[test]
    fn navigation_rules() {
        let (mut session, _) =
            start(3, QuizOptions::new(3).with_time_limit(Duration::from_secs(5)));

        assert!(session.navigate(Direction::Prev, fixed_now()).is_empty());
        assert!(session.navigate(Direction::Next, fixed_now()).is_empty());

        session.submit_answer(wrong(&session), fixed_now());
        assert_eq!(session.position(), 1);

        let effects = session.navigate(Direction::Prev, fixed_now());
        assert_eq!(session.position(), 0);
        assert!(!session.is_answered());
        assert!(matches!(effects[..], [SessionEffect::ArmCountdown { .. }]));

        // revisiting re-scores but does not record a second attempt
        let effects = session.submit_answer(correct(&session), fixed_now());
        assert!(attempts(&effects).is_empty());
        assert_eq!(session.score(), 1);
        assert_eq!(session.position(), 1);
    }

    #[test]
    fn next_behaves_like_advance_in_tutor_mode() {
        let (mut session, _) = start(3, QuizOptions::new(3).with_tutor_mode(true));
        session.submit_answer(correct(&session), fixed_now());
        session.navigate(Direction::Next, fixed_now());
        assert_eq!(session.position(), 1);
        assert_eq!(session.phase(), SessionPhase::Running);
    }

    #[test]
    fn next_is_refused_on_last_question() {
        let (mut session, _) = start(1, QuizOptions::new(1).with_tutor_mode(true));
        session.submit_answer(wrong(&session), fixed_now());
        assert!(session.navigate(Direction::Next, fixed_now()).is_empty());
        assert_eq!(session.phase(), SessionPhase::Explaining);
    }

    #[test]
    fn quit_reports_partial_score_and_cancels_first() {
        let (mut session, _) =
            start(5, QuizOptions::new(4).with_time_limit(Duration::from_secs(5)));
        session.submit_answer(correct(&session), fixed_now());

        let effects = session.quit(fixed_now());
        assert_eq!(effects[0], SessionEffect::CancelCountdown);
        let record = history(&effects).unwrap();
        assert_eq!(record.score, 1);
        assert_eq!(record.total_questions, 4);
        assert_eq!(session.phase(), SessionPhase::Quit);

        assert!(session.quit(fixed_now()).is_empty());
        assert!(session.submit_answer(0, fixed_now()).is_empty());
    }

    #[test]
    fn quit_from_pause_and_explanation() {
        let (mut paused, _) = start(3, QuizOptions::new(3));
        paused.toggle_pause();
        assert!(history(&paused.quit(fixed_now())).is_some());

        let (mut explaining, _) = start(3, QuizOptions::new(3).with_tutor_mode(true));
        explaining.submit_answer(0, fixed_now());
        assert!(history(&explaining.quit(fixed_now())).is_some());
    }

    #[test]
    fn completed_session_ignores_further_transitions() {
        let (mut session, _) = start(1, QuizOptions::new(1));
        session.submit_answer(0, fixed_now());
        assert!(session.is_finished());
        assert!(session.toggle_pause().is_empty());
        assert!(session.quit(fixed_now()).is_empty());
        assert!(session.navigate(Direction::Prev, fixed_now()).is_empty());
    }
}
