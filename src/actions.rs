use crossterm::event::KeyEvent;

use crate::control::Command;
use crate::detect::QuickReply;
use crate::operator::{FollowUp, MessageId};
use crate::targets::Target;

/// A button offered under the message log, bound to F1..F9
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Reply(QuickReply),
    FollowUp(FollowUp),
}

impl Button {
    pub fn label(&self) -> String {
        match self {
            Button::Reply(reply) => reply.label(),
            Button::FollowUp(action) => action.label().to_string(),
        }
    }

    pub fn command(&self) -> Command {
        match self {
            Button::Reply(reply) => Command::Reply(*reply),
            Button::FollowUp(action) => Command::FollowUp(*action),
        }
    }
}

/// What the core said, as seen by the console
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text { id: MessageId, text: String },
    Edit { id: MessageId, text: String },
    Delete(MessageId),
    Screen { frame: String, caption: Option<String> },
    Buttons { text: String, buttons: Vec<Button> },
}

/// Actions that can be dispatched through the application
#[derive(Debug, Clone)]
pub enum Action {
    /// A key was pressed
    KeyPress(KeyEvent),
    /// Targets were rescanned
    TargetsUpdated(Vec<Target>),
    /// A message from the core for the operator
    Outbound(Outbound),
    /// An error occurred
    Error(String),
    /// Hand a command to the controller
    Execute(Command),
    /// Copy the latest message to the clipboard
    CopyLatest,
}
