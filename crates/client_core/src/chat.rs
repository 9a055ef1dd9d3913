//! Chat panel bookkeeping.

/// Five question/answer pairs plus the standing greeting.
pub const CHAT_MESSAGE_CAP: usize = 11;

/// Bot message the chat panel starts with.
pub const GREETING: &str = "Hello! Ask me anything about your document.";

/// How many of the oldest messages must go for `count` to fit the cap.
pub fn excess_messages(count: usize) -> usize {
    count.saturating_sub(CHAT_MESSAGE_CAP)
}
