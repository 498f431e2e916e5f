pub mod game;
pub mod scoring;
pub mod stats;

pub use game::{Game, GameError, GamePhase, RejectReason, SubmitOutcome};
pub use scoring::{time_decay_score, ANSWER_GRACE_MS};
pub use stats::{build_choice_stats, build_leaderboard};
