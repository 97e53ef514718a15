pub mod config;
pub mod irc;
pub mod ledger;
pub mod machine;
pub mod protocol;
pub mod timer;
