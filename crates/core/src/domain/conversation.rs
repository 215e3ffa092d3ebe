use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// A message as submitted by a transport, before the session assigns its position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// One appended entry of a session's history. Fields are private so a turn
/// cannot be edited after the session hands it out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConversationTurn {
    role: Role,
    content: String,
    ordinal: usize,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>, ordinal: usize) -> Self {
        Self { role, content: content.into(), ordinal }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn matches(&self, message: &Message) -> bool {
        self.role == message.role && self.content == message.content
    }
}

/// Latest user turn in `history`, if any.
pub fn last_user_turn(history: &[ConversationTurn]) -> Option<&ConversationTurn> {
    history.iter().rev().find(|turn| turn.role() == Role::User)
}

#[cfg(test)]
mod tests {
    use super::{last_user_turn, ConversationTurn, Message, Role};

    #[test]
    fn last_user_turn_skips_trailing_assistant_messages() {
        let history = vec![
            ConversationTurn::new(Role::System, "You are CloudPilot.", 0),
            ConversationTurn::new(Role::User, "List my EC2 instances", 1),
            ConversationTurn::new(Role::Assistant, "You have 2 instances.", 2),
        ];

        let turn = last_user_turn(&history).map(ConversationTurn::content);
        assert_eq!(turn, Some("List my EC2 instances"));
    }

    #[test]
    fn turn_matches_message_by_role_and_content() {
        let turn = ConversationTurn::new(Role::User, "hello", 0);
        assert!(turn.matches(&Message::user("hello")));
        assert!(!turn.matches(&Message::assistant("hello")));
        assert!(!turn.matches(&Message::user("hello there")));
    }
}
