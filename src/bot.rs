//! Chat driver for quizzes
//!
//! [`TriviaBot`] turns chat messages into engine calls and engine state into
//! chat text. Public messages addressed to the bot are commands; private
//! messages are answers to the open round. Everything the bot says goes
//! through its [`Tunnel`].

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use heck::ToTitleCase;
use itertools::Itertools;
use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use web_time::SystemTime;

use crate::{
    config::Options,
    constants::leaderboard::DISPLAY_LIMIT,
    leaderboard::{Leaderboard, ScoreMessage},
    participant::{Identity, Participant},
    question::{self, QuestionRepository},
    quiz::{self, Quiz},
    round::Round,
    session::Tunnel,
};

const HELP: &str = "Start a new quiz with `trivia start`. Whisper me the number beside the answer, \
                    like `/w trivia 2`. `trivia top` shows the leaderboard.";
const INVALID_ANSWER: &str = "Invalid answer, PM the number of the answer";
const DUPLICATE_ANSWER: &str = "you have already submitted an answer!";
const ANSWER_RECORDED: &str = "your answer has been recorded";
const ROUND_OVER: &str = "too late, the round is over";
const NO_QUESTIONS: &str = "I have run out of questions to ask";

/// A chat message as delivered by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Who sent it
    pub user: Identity,
    /// What they wrote
    pub data: String,
    /// When the transport received it
    pub time: SystemTime,
}

impl Message {
    /// A message received just now
    pub fn new(user: impl Into<Identity>, data: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            data: data.into(),
            time: SystemTime::now(),
        }
    }
}

/// Commands understood in public chat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Help,
    Start { force: bool },
    Top,
    Score,
}

impl Command {
    fn parse(rest: &str) -> Option<Self> {
        let mut words = rest.split_whitespace().map(str::to_lowercase);
        let command = match words.next()?.as_str() {
            "help" | "info" => Self::Help,
            "start" | "new" => Self::Start {
                force: words.any(|word| word == "force"),
            },
            "top" | "leaderboard" => Self::Top,
            "score" => Self::Score,
            _ => return None,
        };
        Some(command)
    }
}

/// Chat bot running one quiz at a time
pub struct TriviaBot<T> {
    tunnel: T,
    repository: Arc<dyn QuestionRepository>,
    options: Options,
    quiz: RwLock<Option<Arc<Quiz>>>,
    /// Set while a quiz task owns the current quiz, including the pauses
    /// between its rounds
    running: AtomicBool,
    leaderboard: Arc<Mutex<Leaderboard>>,
    /// Session points not yet written to the leaderboard
    pending: Mutex<Vec<(Identity, u64)>>,
}

impl<T: Tunnel + 'static> TriviaBot<T> {
    /// Creates a bot; no quiz runs until someone asks for one
    pub fn new(
        tunnel: T,
        repository: Arc<dyn QuestionRepository>,
        options: Options,
        leaderboard: Leaderboard,
    ) -> Self {
        Self {
            tunnel,
            repository,
            options,
            quiz: RwLock::new(None),
            running: AtomicBool::new(false),
            leaderboard: Arc::new(Mutex::new(leaderboard)),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Handles a message from public chat
    ///
    /// Messages that do not start with one of the configured prefixes are
    /// ignored. Starting a quiz spawns it on the current tokio runtime and
    /// returns right away.
    ///
    /// # Errors
    ///
    /// Returns the first transport, repository or quiz error raised while
    /// handling the command.
    pub async fn on_message(self: &Arc<Self>, message: Message) -> Result<(), crate::Error> {
        let Some(rest) = self.options.strip_prefix(&message.data) else {
            return Ok(());
        };
        let Some(command) = Command::parse(rest) else {
            debug!(user = %message.user, text = %message.data, "unknown command");
            return Ok(());
        };

        match command {
            Command::Help => self.tunnel.send(HELP).await,
            Command::Start { force } => self.start(force).await,
            Command::Top => self.tunnel.send(&self.top_message()).await,
            Command::Score => self.tunnel.send(&self.score_message(&message.user)).await,
        }
    }

    /// Handles a private message, treating it as an answer
    ///
    /// Does nothing unless a round is open.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the reply cannot be delivered.
    pub async fn on_private_message(&self, message: Message) -> Result<(), crate::Error> {
        let Some(round) = self.current_round().filter(|round| round.is_open()) else {
            debug!(user = %message.user, "private message outside a round");
            return Ok(());
        };

        let reply = match parse_answer(&message.data, round.choices().len()) {
            Ok(choice) => record_answer(&round, &message, choice),
            Err(e) => {
                debug!(user = %message.user, error = %e, "answer rejected");
                INVALID_ANSWER
            }
        };

        self.tunnel.send_private(&message.user, reply).await
    }

    /// The quiz most recently started, finished or not
    pub fn quiz(&self) -> Option<Arc<Quiz>> {
        self.quiz.read().clone()
    }

    /// The round most recently started, open or not
    pub fn current_round(&self) -> Option<Arc<Round>> {
        self.quiz.read().as_ref()?.current_round()
    }

    /// Whether a quiz task is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// A copy of the cross-session leaderboard
    pub fn leaderboard(&self) -> Leaderboard {
        self.leaderboard.lock().clone()
    }

    /// Session points still waiting to be written to the leaderboard
    pub fn pending_points(&self) -> Vec<(Identity, u64)> {
        self.pending.lock().clone()
    }

    async fn start(self: &Arc<Self>, force: bool) -> Result<(), crate::Error> {
        let in_progress = quiz::Error::AlreadyInProgress.to_string();
        if self.is_running() {
            return self.tunnel.send(&in_progress).await;
        }

        if let Some(remaining) = self.cooldown_remaining().filter(|_| !force) {
            return self
                .tunnel
                .send(&format!("on cooldown for {}", format_duration(remaining)))
                .await;
        }

        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return self.tunnel.send(&in_progress).await;
        }

        if let Err(e) = self.save_pending().await {
            warn!(error = %e, "earlier session points still not saved");
        }

        let quiz = match self.resume_or_create().await {
            Ok(quiz) => quiz,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                if matches!(e, crate::Error::Question(question::Error::NoQuestionsAvailable)) {
                    warn!("question repository exhausted");
                    return self.tunnel.send(NO_QUESTIONS).await;
                }
                return Err(e);
            }
        };

        let bot = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = bot.run_quiz(Arc::clone(&quiz)).await {
                error!(quiz = %quiz.id(), error = %e, "quiz aborted");
                // leave the quiz resumable from its next round
                if let Some(round) = quiz.current_round() {
                    round.close();
                }
            }
            bot.running.store(false, Ordering::SeqCst);
        });

        Ok(())
    }

    /// How much longer new quizzes must wait, if at all
    fn cooldown_remaining(&self) -> Option<Duration> {
        let last = self.quiz.read().as_ref()?.last_completed_at()?;
        let elapsed = SystemTime::now().duration_since(last).unwrap_or_default();
        self.options
            .cooldown
            .checked_sub(elapsed)
            .filter(|remaining| !remaining.is_zero())
    }

    /// The unfinished current quiz, or a fresh one from the repository
    async fn resume_or_create(&self) -> Result<Arc<Quiz>, crate::Error> {
        if let Some(quiz) = self.quiz().filter(|quiz| !quiz.is_finished()) {
            info!(quiz = %quiz.id(), "resuming quiz");
            return Ok(quiz);
        }

        let specs = question::draw_rounds(
            self.repository.as_ref(),
            &self.options.filters,
            self.options.rounds,
        )
        .await?;
        let quiz = Arc::new(Quiz::new(specs, self.options.points.clone())?);
        *self.quiz.write() = Some(Arc::clone(&quiz));

        Ok(quiz)
    }

    /// Plays every remaining round of `quiz`, then awards the session points
    ///
    /// # Errors
    ///
    /// Stops at the first transport, quiz or leaderboard error.
    #[tracing::instrument(skip_all, fields(quiz = %quiz.id()))]
    pub async fn run_quiz(&self, quiz: Arc<Quiz>) -> Result<(), crate::Error> {
        info!(rounds = quiz.round_count(), "starting quiz");
        self.tunnel.send(&self.intro_message()).await?;
        tokio::time::sleep(self.options.intro_delay).await;

        while quiz.has_next_round() {
            self.run_round(&quiz).await?;
            if quiz.has_next_round() {
                debug!(gap = ?self.options.round_gap, "waiting for next round");
                tokio::time::sleep(self.options.round_gap).await;
            }
        }

        self.finish_quiz(&quiz).await
    }

    /// Opens the next round, waits for it to close and reports the result
    #[tracing::instrument(skip_all)]
    async fn run_round(&self, quiz: &Quiz) -> Result<(), crate::Error> {
        let (sender, receiver) = oneshot::channel();
        let round = quiz.start_round(move |answer, ranked| {
            sender
                .send(completion_message(answer, ranked))
                .map_err(|_| crate::Error::Transport("round result has no listener".to_string()))
        })?;

        self.tunnel.send(&announcement(&round)).await?;

        match self.options.answer_time_limit {
            Some(limit) => {
                if tokio::time::timeout(limit, round.closed()).await.is_err() {
                    info!(round = round.ordinal(), "time limit reached");
                    round.close();
                }
            }
            None => round.closed().await,
        }

        let message = receiver
            .await
            .map_err(|_| crate::Error::Transport("round closed without a result".to_string()))?;
        self.tunnel.send(&message).await
    }

    /// Merges the session into the leaderboard and announces the awards
    ///
    /// Points that cannot be saved stay pending and are retried before the
    /// next quiz starts; the awards are announced either way.
    async fn finish_quiz(&self, quiz: &Quiz) -> Result<(), crate::Error> {
        let standings = quiz.sorted_score();

        let awards = if standings.is_empty() {
            "No one!".to_string()
        } else {
            oxford_series(
                standings
                    .iter()
                    .map(|(identity, points)| format!("{identity} +{}", points_label(*points))),
            )
        };

        self.pending.lock().extend(standings);
        let saved = self.save_pending().await;

        info!(quiz = %quiz.id(), "quiz complete");
        self.tunnel
            .send(&format!(
                "Quiz complete! The following users are awarded points: {awards}"
            ))
            .await?;
        saved
    }

    /// Writes pending session points to the leaderboard
    ///
    /// The write syncs to disk, so it runs on the blocking pool. Pending
    /// points are only dropped once the leaderboard has accepted them.
    async fn save_pending(&self) -> Result<(), crate::Error> {
        let delta = self.pending.lock().clone();
        if delta.is_empty() {
            return Ok(());
        }

        let leaderboard = Arc::clone(&self.leaderboard);
        let applied = delta.len();
        tokio::task::spawn_blocking(move || leaderboard.lock().update(delta)).await??;

        self.pending.lock().drain(..applied);
        Ok(())
    }

    fn intro_message(&self) -> String {
        let places = self.options.points.places().len();
        let rule = if places == 1 {
            "The first correct answer is awarded points.".to_string()
        } else {
            format!("The first {places} correct answers are awarded points.")
        };
        format!("Quiz starting soon! PM the number beside the answer. {rule}")
    }

    fn top_message(&self) -> String {
        let standings = self.leaderboard.lock().standings(DISPLAY_LIMIT);
        if standings.exact_count() == 0 {
            return "Nobody is on the leaderboard yet".to_string();
        }

        let entries = standings
            .items()
            .iter()
            .enumerate()
            .map(|(index, (identity, points))| {
                format!("{}. {identity} ({})", index + 1, points_label(*points))
            })
            .join(", ");
        format!("Top {} of {}: {entries}", standings.items().len(), standings.exact_count())
    }

    fn score_message(&self, user: &Identity) -> String {
        match self.leaderboard.lock().score(user.as_str()) {
            Some(ScoreMessage { points, position }) => {
                format!("{user}: {} ({} place)", points_label(points), ordinal(position))
            }
            None => format!("{user} has no points yet"),
        }
    }
}

/// Submits `choice` for the sender of `message` and picks the reply
fn record_answer(round: &Round, message: &Message, choice: usize) -> &'static str {
    if round.submit_answer(message.user.clone(), choice, message.time) {
        ANSWER_RECORDED
    } else if round.is_open() {
        DUPLICATE_ANSWER
    } else {
        ROUND_OVER
    }
}

/// Parses a 1-based choice number into a choice index
fn parse_answer(text: &str, count: usize) -> Result<usize, quiz::Error> {
    let text = text.trim();
    text.parse::<usize>()
        .ok()
        .filter(|number| (1..=count).contains(number))
        .map(|number| number - 1)
        .ok_or_else(|| quiz::Error::InvalidAnswerIndex {
            given: text.to_string(),
            count,
        })
}

/// Public text opening a round
fn announcement(round: &Round) -> String {
    let leading = if round.is_final() {
        "Final round".to_string()
    } else {
        format!("Round {}", round.ordinal())
    };
    let difficulty = round
        .difficulty()
        .map(|difficulty| format!(" ({})", difficulty.to_string().to_title_case()))
        .unwrap_or_default();
    let question = round.question().replace('`', "'");
    let choices = round
        .choices()
        .iter()
        .enumerate()
        .map(|(index, choice)| format!("`{}) {choice}`", index + 1))
        .join(" ");

    format!(
        "{leading}: {:?}{difficulty}. `{question}` {choices}",
        round.category()
    )
}

/// Public text closing a round
fn completion_message(answer: &str, ranked: &[Participant]) -> String {
    let mut message = format!("Round complete! The correct answer is {answer}.");
    if ranked.is_empty() {
        message.push_str(" No one answered correctly");
    } else {
        message.push(' ');
        message.push_str(&oxford_series(
            ranked
                .iter()
                .enumerate()
                .map(|(index, participant)| format!("{} {}", ordinal(index + 1), participant.identity())),
        ));
    }
    message
}

fn points_label(points: u64) -> String {
    pluralizer::pluralize("point", isize::try_from(points).unwrap_or(isize::MAX), true)
}

/// `1st`, `2nd`, `3rd`, `4th`, ...
fn ordinal(n: usize) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}

/// Joins items as `a`, `a and b` or `a, b, and c`
fn oxford_series(items: impl IntoIterator<Item = String>) -> String {
    let mut items = items.into_iter().collect_vec();
    match items.len() {
        0 => String::new(),
        1 => items.remove(0),
        2 => format!("{} and {}", items[0], items[1]),
        _ => {
            let last = items.pop().unwrap_or_default();
            format!("{}, and {last}", items.join(", "))
        }
    }
}

/// Formats a remaining wait like `4m32s`
fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs() + u64::from(duration.subsec_nanos() >= 500_000_000);
    match (seconds / 60, seconds % 60) {
        (0, seconds) => format!("{seconds}s"),
        (minutes, 0) => format!("{minutes}m"),
        (minutes, seconds) => format!("{minutes}m{seconds}s"),
    }
}
