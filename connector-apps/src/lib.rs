mod notekeeper;
mod sentence_mail;

pub use notekeeper::{Notekeeper, NotekeeperConfig};
pub use sentence_mail::{SentenceMail, SentenceMailConfig};
