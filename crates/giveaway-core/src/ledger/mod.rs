pub mod poll;
pub mod prize;

pub use poll::{start_poll, PollOption, PollSession, VoteOutcome, MAX_POLL_OPTIONS};
pub use prize::{expand, format_prize, parse_prize, Prize, PrizeEntry, PrizeList, PrizePool};
