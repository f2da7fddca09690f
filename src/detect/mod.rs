mod prompt;
mod status;

pub use prompt::{detect, QuickReply};
pub use status::{classify, Status};
