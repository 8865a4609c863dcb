use std::collections::VecDeque;
use std::sync::Arc;

use quiz_core::model::{MetricsFilter, QbankId, QuizHistoryRecord};
use rand::SeedableRng;
use rand::rngs::StdRng;
use storage::repository::QuizHistoryRepository;
use tracing::{debug, info, warn};

use super::countdown::Countdown;
use super::progress::QuizProgress;
use super::session::{Direction, QuizOptions, QuizSession, SessionEffect};
use crate::Clock;
use crate::catalog::QuestionCatalog;
use crate::error::SessionError;
use crate::metrics::MetricsStore;

/// Drives a [`QuizSession`] and carries out its effects.
///
/// Owns the countdown, writes attempts through the metrics store and hands
/// finished sessions to the history collaborator. Persistence failures are
/// logged, never returned.
///
/// Effects are queued before they are carried out and an effect leaves the
/// queue only once it has completed. A transition future dropped mid-write
/// therefore loses nothing: the remainder runs at the start of the next call
/// or on [`QuizRunner::settle`].
pub struct QuizRunner {
    clock: Clock,
    catalog: Arc<dyn QuestionCatalog>,
    metrics: Arc<MetricsStore>,
    history: Arc<dyn QuizHistoryRepository>,
    countdown: Countdown,
    session: Option<QuizSession>,
    rng: StdRng,
    last_history: Option<QuizHistoryRecord>,
    pending: VecDeque<SessionEffect>,
}

impl QuizRunner {
    #[must_use]
    pub fn new(
        clock: Clock,
        catalog: Arc<dyn QuestionCatalog>,
        metrics: Arc<MetricsStore>,
        history: Arc<dyn QuizHistoryRepository>,
    ) -> Self {
        Self::with_rng(clock, catalog, metrics, history, StdRng::from_os_rng())
    }

    /// Runner with a deterministic question draw.
    #[must_use]
    pub fn with_seed(
        clock: Clock,
        catalog: Arc<dyn QuestionCatalog>,
        metrics: Arc<MetricsStore>,
        history: Arc<dyn QuizHistoryRepository>,
        seed: u64,
    ) -> Self {
        Self::with_rng(clock, catalog, metrics, history, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        clock: Clock,
        catalog: Arc<dyn QuestionCatalog>,
        metrics: Arc<MetricsStore>,
        history: Arc<dyn QuizHistoryRepository>,
        rng: StdRng,
    ) -> Self {
        Self {
            clock,
            catalog,
            metrics,
            history,
            countdown: Countdown::new(),
            session: None,
            rng,
            last_history: None,
            pending: VecDeque::new(),
        }
    }

    /// Start a quiz over a whole bank, replacing any current session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if the bank is unknown or empty, or the catalog
    /// cannot be resolved.
    pub async fn start(
        &mut self,
        bank_id: &QbankId,
        options: QuizOptions,
    ) -> Result<QuizProgress, SessionError> {
        self.start_filtered(bank_id, options, &[]).await
    }

    /// Start a quiz over the bank's questions matching any of `filters`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if the bank is unknown, no question survives the
    /// filters, or the catalog cannot be resolved.
    pub async fn start_filtered(
        &mut self,
        bank_id: &QbankId,
        options: QuizOptions,
        filters: &[MetricsFilter],
    ) -> Result<QuizProgress, SessionError> {
        self.settle().await;
        self.discard();

        let mut bank = self
            .catalog
            .bank(bank_id)
            .await?
            .ok_or_else(|| SessionError::UnknownBank(bank_id.clone()))?;
        if !filters.is_empty() {
            bank.questions = self.metrics.filter_questions(&bank.questions, filters);
        }

        let (session, effects) =
            QuizSession::start(&bank, &options, self.clock.now(), &mut self.rng)?;
        info!(
            bank = %bank_id,
            questions = session.total_questions(),
            tutor = options.tutor_mode,
            timed = options.time_limit.is_some(),
            "quiz started"
        );
        let progress = session.progress();
        self.session = Some(session);
        self.apply(effects).await;
        Ok(progress)
    }

    /// Cancel whatever is running and draw a fresh quiz.
    ///
    /// # Errors
    ///
    /// Same as [`QuizRunner::start`].
    pub async fn restart(
        &mut self,
        bank_id: &QbankId,
        options: QuizOptions,
    ) -> Result<QuizProgress, SessionError> {
        self.start(bank_id, options).await
    }

    pub async fn submit_answer(&mut self, option: usize) -> Option<QuizProgress> {
        let now = self.clock.now();
        self.transition(|session| session.submit_answer(option, now)).await
    }

    pub async fn continue_after_explanation(&mut self) -> Option<QuizProgress> {
        let now = self.clock.now();
        self.transition(|session| session.continue_after_explanation(now))
            .await
    }

    pub async fn navigate(&mut self, direction: Direction) -> Option<QuizProgress> {
        let now = self.clock.now();
        self.transition(|session| session.navigate(direction, now))
            .await
    }

    pub async fn toggle_pause(&mut self) -> Option<QuizProgress> {
        self.transition(QuizSession::toggle_pause).await
    }

    /// Abandon the current quiz; the session is gone afterwards.
    ///
    /// Returns the history record, or `None` if there was no quiz in progress.
    pub async fn quit(&mut self) -> Option<QuizHistoryRecord> {
        self.settle().await;
        self.countdown.cancel();
        let mut session = self.session.take()?;
        let effects = session.quit(self.clock.now());
        let reported = effects
            .iter()
            .any(|effect| matches!(effect, SessionEffect::EmitHistory(_)));
        self.apply(effects).await;
        if !reported {
            return None;
        }
        info!(
            bank = %session.qbank_id(),
            score = session.score(),
            elapsed_secs = (self.clock.now() - session.started_at()).num_seconds(),
            "quiz quit"
        );
        self.last_history.clone()
    }

    /// Wait for the armed countdown to report and return its generation.
    ///
    /// Pending forever while no countdown is armed, so race it against input.
    /// Only waits on the timer channel and touches no session state, so it is
    /// safe to drop at any point; hand the result to [`QuizRunner::on_timeout`]
    /// outside the race.
    pub async fn next_timeout(&mut self) -> u64 {
        match self.countdown.fired().await {
            Some(generation) => generation,
            None => std::future::pending().await,
        }
    }

    /// Apply a timeout reported by [`QuizRunner::next_timeout`].
    ///
    /// Returns `None` for a stale generation or when no quiz is running.
    pub async fn on_timeout(&mut self, generation: u64) -> Option<QuizProgress> {
        self.settle().await;
        let now = self.clock.now();
        let session = self.session.as_mut()?;
        let effects = session.on_countdown_elapsed(generation, now);
        if effects.is_empty() {
            debug!(generation, "ignoring stale countdown");
            return None;
        }
        let progress = session.progress();
        debug!(generation, position = progress.position, "question timed out");
        self.apply(effects).await;
        Some(progress)
    }

    /// Carry out effects left over from an interrupted call.
    pub async fn settle(&mut self) {
        while let Some(effect) = self.pending.front().cloned() {
            self.perform(effect).await;
            self.pending.pop_front();
        }
    }

    #[must_use]
    pub fn session(&self) -> Option<&QuizSession> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn progress(&self) -> Option<QuizProgress> {
        self.session.as_ref().map(QuizSession::progress)
    }

    #[must_use]
    pub fn countdown_armed(&self) -> bool {
        self.countdown.is_armed()
    }

    /// History record of the most recently finished or quit quiz.
    #[must_use]
    pub fn last_history(&self) -> Option<&QuizHistoryRecord> {
        self.last_history.as_ref()
    }

    fn discard(&mut self) {
        self.countdown.cancel();
        self.session = None;
        self.last_history = None;
    }

    async fn transition<F>(&mut self, step: F) -> Option<QuizProgress>
    where
        F: FnOnce(&mut QuizSession) -> Vec<SessionEffect>,
    {
        self.settle().await;
        let session = self.session.as_mut()?;
        let effects = step(session);
        let progress = session.progress();
        self.apply(effects).await;
        Some(progress)
    }

    async fn apply(&mut self, effects: Vec<SessionEffect>) {
        self.pending.extend(effects);
        self.settle().await;
    }

    async fn perform(&mut self, effect: SessionEffect) {
        match effect {
            SessionEffect::ArmCountdown { generation, after } => {
                self.countdown.arm(generation, after);
            }
            SessionEffect::CancelCountdown => self.countdown.cancel(),
            SessionEffect::RecordAttempt(attempt) => {
                self.metrics.record_attempt(&attempt).await;
            }
            SessionEffect::EmitHistory(record) => {
                let elapsed = self
                    .session
                    .as_ref()
                    .map(|session| (record.date - session.started_at()).num_seconds());
                info!(
                    bank = %record.qbank_id,
                    score = record.score,
                    total = record.total_questions,
                    elapsed_secs = ?elapsed,
                    "quiz finished"
                );
                if let Err(err) = self.history.append_history(&record).await {
                    warn!(error = %err, "failed to store quiz history");
                }
                self.last_history = Some(record);
            }
        }
    }
}
