use std::fmt;

// identifies who said a message in the transcript.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageSender {
    User,
    Bot,
}
impl fmt::Display for MessageSender {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MessageSender::User => write!(f, "user"),
            MessageSender::Bot => write!(f, "bot"),
        }
    }
}

// this is one message of the conversation (e.g. the assistant's reply or the customer's question).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationMessage {
    pub sender: MessageSender,
    pub text: String,
}
impl ConversationMessage {
    pub fn user(text: &str) -> Self {
        Self {
            sender: MessageSender::User,
            text: text.to_owned(),
        }
    }

    pub fn bot(text: &str) -> Self {
        Self {
            sender: MessageSender::Bot,
            text: text.to_owned(),
        }
    }

    // the message text split on newlines, ready for wrapping in the UI
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.lines()
    }
}

// The ordered record of everything said in the widget. Messages can only be
// appended; nothing hands out mutable access to items already in the log.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Transcript {
    messages: Vec<ConversationMessage>,
}
impl Transcript {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
        }
    }

    pub fn push(&mut self, message: ConversationMessage) {
        log::trace!("transcript <- {}: {}", message.sender, message.text);
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ConversationMessage> {
        self.messages.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ConversationMessage> {
        self.messages.iter()
    }

    pub fn as_slice(&self) -> &[ConversationMessage] {
        &self.messages
    }

    // counts the messages sent by the given participant
    pub fn count_from(&self, sender: MessageSender) -> usize {
        self.messages.iter().filter(|m| m.sender == sender).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_keeps_order() {
        let mut transcript = Transcript::new();
        transcript.push(ConversationMessage::bot("Halo!"));
        transcript.push(ConversationMessage::user("Cek ongkir"));
        assert_eq!(transcript.len(), 2);
        assert_eq!(
            transcript.as_slice(),
            &[
                ConversationMessage::bot("Halo!"),
                ConversationMessage::user("Cek ongkir")
            ]
        );
        assert_eq!(transcript.count_from(MessageSender::User), 1);
        assert_eq!(transcript.last().map(|m| m.sender), Some(MessageSender::User));
    }

    #[test]
    fn lines_split_multiline_replies() {
        let msg = ConversationMessage::bot("- INV-1\n- INV-2");
        assert_eq!(msg.lines().collect::<Vec<_>>(), vec!["- INV-1", "- INV-2"]);
    }
}
