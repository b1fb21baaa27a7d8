//! Intent relay core library: chat transports, NLU dispatch, admin escalation and the
//! supervised listening loop shared by the Telegram and VK bots.

pub mod channels;
pub mod config;
pub mod dispatch;
pub mod escalation;
pub mod event;
pub mod init;
pub mod logging;
pub mod nlu;
pub mod runner;
pub mod supervisor;

#[cfg(test)]
mod testing;
