use std::collections::VecDeque;

use crossbeam::channel::{Receiver, Sender};

use crate::endpoint::{
    ConversationResponse, EndpointError, EndpointRequest, EndpointResponse, OrderReference,
    Ticket, TurnBody,
};
use crate::transcript::{ConversationMessage, Transcript};

pub const GREETING_FAILED_TEXT: &str = "Maaf, terjadi masalah saat memulai percakapan.";
pub const NETWORK_FAILED_TEXT: &str = "Jaringan bermasalah, silakan coba lagi.";
pub const REPLY_UNAVAILABLE_TEXT: &str = "Maaf, terjadi kesalahan mengambil balasan.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QuickReplyPayload {
    // sends the text as if the customer typed it
    SendMessage(String),

    // asks the endpoint for the tracking status of the order code
    TrackOrder(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuickReplyAction {
    pub label: String,
    pub payload: QuickReplyPayload,
}
impl QuickReplyAction {
    pub fn message(label: &str) -> Self {
        Self {
            label: label.to_owned(),
            payload: QuickReplyPayload::SendMessage(label.to_owned()),
        }
    }

    pub fn track_order(order: &OrderReference) -> Self {
        Self {
            label: format!("{} - {} - {}", order.code, order.date, order.status),
            payload: QuickReplyPayload::TrackOrder(order.code.clone()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WidgetVisibility {
    Open,
    Closed,
}

// what a queued or outstanding request is for, which decides how its response is applied
#[derive(Clone, Debug, PartialEq)]
enum RequestKind {
    Greeting,
    Turn(TurnBody),
}

// The chat widget controller. It owns the conversation state for one mounted
// widget and talks to the endpoint worker over channels. Requests are single
// flight: while one is outstanding, later ones wait in a FIFO queue.
pub struct ChatWidget {
    send_to_server: Sender<EndpointRequest>,
    recv_on_client: Receiver<EndpointResponse>,

    visibility: WidgetVisibility,

    // set on the first open so the greeting is only ever fetched once
    initialized: bool,
    input_focused: bool,
    input: String,

    transcript: Transcript,

    typing: bool,
    typing_text: String,

    default_quick_replies: Vec<String>,
    quick_replies: Vec<QuickReplyAction>,
    // the labels currently rendered, used to skip re-rendering an identical set
    quick_reply_signature: Option<Vec<String>>,
    quick_reply_revision: u64,

    order_buttons: Vec<QuickReplyAction>,
    order_button_revision: u64,

    // index into the combined list of quick replies followed by order buttons
    selected_action: Option<usize>,

    in_flight: Option<(Ticket, RequestKind)>,
    queued: VecDeque<RequestKind>,
    next_ticket: Ticket,
}
impl ChatWidget {
    pub fn new(
        send_to_server: Sender<EndpointRequest>,
        recv_on_client: Receiver<EndpointResponse>,
        typing_text: &str,
        default_quick_replies: Vec<String>,
    ) -> ChatWidget {
        ChatWidget {
            send_to_server,
            recv_on_client,
            visibility: WidgetVisibility::Closed,
            initialized: false,
            input_focused: false,
            input: String::new(),
            transcript: Transcript::new(),
            typing: false,
            typing_text: typing_text.to_owned(),
            default_quick_replies,
            quick_replies: Vec::new(),
            quick_reply_signature: None,
            quick_reply_revision: 0,
            order_buttons: Vec::new(),
            order_button_revision: 0,
            selected_action: None,
            in_flight: None,
            queued: VecDeque::new(),
            next_ticket: 1,
        }
    }

    pub fn open(&mut self) {
        self.set_visibility(true);
    }

    pub fn close(&mut self) {
        self.set_visibility(false);
    }

    pub fn toggle(&mut self) {
        let show = !self.is_open();
        self.set_visibility(show);
    }

    fn set_visibility(&mut self, show: bool) {
        self.visibility = if show {
            WidgetVisibility::Open
        } else {
            WidgetVisibility::Closed
        };
        if show {
            if !self.initialized {
                self.initialized = true;
                self.replace_quick_replies(None);
                self.load_greeting();
            }
            self.input_focused = true;
        } else {
            self.input_focused = false;
        }
    }

    // asks the endpoint for the opening message and recommended quick replies
    pub fn load_greeting(&mut self) {
        self.dispatch(RequestKind::Greeting);
    }

    pub fn send_message(&mut self, text: &str) {
        let message_text = text.trim();
        if message_text.is_empty() {
            return;
        }

        // shown right away, before the endpoint has said anything
        self.transcript.push(ConversationMessage::user(message_text));
        self.dispatch(RequestKind::Turn(TurnBody::message(message_text)));
    }

    pub fn send_quick_reply(&mut self, label: &str) {
        let message_text = label.trim();
        if message_text.is_empty() {
            return;
        }
        self.input.clear();
        self.send_message(message_text);
    }

    // the label is what the customer sees echoed in the transcript, not the raw code
    pub fn send_track_order(&mut self, order_code: Option<&str>, label: &str) {
        let order_code = match order_code {
            Some(code) if !code.is_empty() => code,
            _ => return,
        };

        let label = label.trim();
        let display_text = if label.is_empty() { order_code } else { label };
        self.transcript.push(ConversationMessage::user(display_text));
        self.dispatch(RequestKind::Turn(TurnBody::track_order(order_code)));
    }

    pub fn push_input(&mut self, c: char) {
        self.input.push(c);
    }

    pub fn pop_input(&mut self) {
        self.input.pop();
    }

    // sends whatever is in the input line, clearing it if anything was sent
    pub fn submit_input(&mut self) {
        let text = self.input.trim().to_owned();
        if text.is_empty() {
            return;
        }
        self.input.clear();
        self.send_message(&text);
    }

    pub fn select_next_action(&mut self) {
        let count = self.action_count();
        if count == 0 {
            self.selected_action = None;
            return;
        }
        self.selected_action = Some(match self.selected_action {
            Some(i) if i + 1 < count => i + 1,
            Some(_) => 0,
            None => 0,
        });
    }

    pub fn select_previous_action(&mut self) {
        let count = self.action_count();
        if count == 0 {
            self.selected_action = None;
            return;
        }
        self.selected_action = Some(match self.selected_action {
            Some(0) | None => count - 1,
            Some(i) => i - 1,
        });
    }

    pub fn activate_selected_action(&mut self) {
        let action = match self.selected_action.and_then(|i| self.action_at(i)) {
            Some(action) => action.clone(),
            None => return,
        };
        match &action.payload {
            QuickReplyPayload::SendMessage(text) => self.send_quick_reply(text),
            QuickReplyPayload::TrackOrder(code) => {
                self.send_track_order(Some(code.as_str()), &action.label)
            }
        }
    }

    // drains every settled response from the endpoint worker. returns true if
    // anything changed so the caller knows a redraw is worthwhile.
    pub fn process_incoming_endpoint_messages(&mut self) -> bool {
        let mut changed = false;
        while let Ok(response) = self.recv_on_client.try_recv() {
            match response {
                EndpointResponse::Settled { ticket, result } => {
                    changed |= self.settle(ticket, result);
                }
            }
        }
        changed
    }

    fn dispatch(&mut self, kind: RequestKind) {
        if self.in_flight.is_some() {
            log::debug!(
                "Request queued behind an outstanding one ({} waiting).",
                self.queued.len() + 1
            );
            self.queued.push_back(kind);
            return;
        }
        self.issue(kind);
    }

    fn issue(&mut self, kind: RequestKind) {
        let ticket = self.next_ticket;
        self.next_ticket += 1;

        self.show_typing();
        let request = match &kind {
            RequestKind::Greeting => EndpointRequest::Greeting(ticket),
            RequestKind::Turn(body) => EndpointRequest::Turn(ticket, body.clone()),
        };
        self.in_flight = Some((ticket, kind));

        if let Err(err) = self.send_to_server.send(request) {
            log::error!("Failed to hand request {} to the endpoint worker: {}", ticket, err);
            self.settle(ticket, Err(EndpointError::Disconnected));
        }
    }

    fn settle(&mut self, ticket: Ticket, result: Result<ConversationResponse, EndpointError>) -> bool {
        let kind = match self.in_flight.take() {
            Some((expected, kind)) if expected == ticket => kind,
            other => {
                log::warn!("Ignoring a response for request {} that isn't outstanding.", ticket);
                self.in_flight = other;
                return false;
            }
        };

        self.hide_typing();
        match kind {
            RequestKind::Greeting => self.apply_greeting(result),
            RequestKind::Turn(_) => self.apply_turn(result),
        }

        if let Some(next) = self.queued.pop_front() {
            self.issue(next);
        }
        true
    }

    fn apply_greeting(&mut self, result: Result<ConversationResponse, EndpointError>) {
        match result {
            Ok(resp) => {
                if let Some(reply) = non_empty(resp.reply.as_deref()) {
                    self.transcript.push(ConversationMessage::bot(reply));
                }
                self.replace_quick_replies(resp.quick_actions);
            }
            Err(err) => {
                log::warn!("Greeting request failed: {}", err);
                self.transcript.push(ConversationMessage::bot(GREETING_FAILED_TEXT));
            }
        }
    }

    fn apply_turn(&mut self, result: Result<ConversationResponse, EndpointError>) {
        match result {
            Ok(resp) => {
                if let Some(intent) = &resp.intent {
                    log::debug!("Endpoint matched intent '{}'", intent);
                }
                let reply = non_empty(resp.reply.as_deref()).unwrap_or(REPLY_UNAVAILABLE_TEXT);
                self.transcript.push(ConversationMessage::bot(reply));
                self.replace_quick_replies(resp.quick_actions);
                self.replace_order_buttons(resp.orders.unwrap_or_default());
            }
            Err(err) => {
                log::warn!("Turn request failed: {}", err);
                self.transcript.push(ConversationMessage::bot(NETWORK_FAILED_TEXT));
            }
        }
    }

    // swaps in the recommended quick replies unless the same labels are already
    // showing. returns true when the set was actually re-rendered.
    fn replace_quick_replies(&mut self, labels: Option<Vec<String>>) -> bool {
        let labels = match labels {
            Some(labels) if !labels.is_empty() => labels,
            _ => self.default_quick_replies.clone(),
        };

        if self.quick_reply_signature.as_ref() == Some(&labels) {
            return false;
        }

        self.quick_replies = labels.iter().map(|l| QuickReplyAction::message(l)).collect();
        self.quick_reply_signature = Some(labels);
        self.quick_reply_revision += 1;
        self.clamp_selection();
        true
    }

    // order buttons are always cleared and rebuilt, even when nothing changed
    fn replace_order_buttons(&mut self, orders: Vec<OrderReference>) {
        self.order_buttons.clear();
        self.order_buttons
            .extend(orders.iter().map(QuickReplyAction::track_order));
        self.order_button_revision += 1;
        self.clamp_selection();
    }

    fn show_typing(&mut self) {
        self.typing = true;
    }

    fn hide_typing(&mut self) {
        self.typing = false;
    }

    fn action_count(&self) -> usize {
        self.quick_replies.len() + self.order_buttons.len()
    }

    fn action_at(&self, index: usize) -> Option<&QuickReplyAction> {
        self.quick_replies
            .iter()
            .chain(self.order_buttons.iter())
            .nth(index)
    }

    fn clamp_selection(&mut self) {
        let count = self.action_count();
        self.selected_action = match self.selected_action {
            Some(_) if count == 0 => None,
            Some(i) if i >= count => Some(count - 1),
            other => other,
        };
    }

    pub fn is_open(&self) -> bool {
        self.visibility == WidgetVisibility::Open
    }

    pub fn visibility(&self) -> WidgetVisibility {
        self.visibility
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn input_focused(&self) -> bool {
        self.input_focused
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn is_typing(&self) -> bool {
        self.typing
    }

    pub fn typing_text(&self) -> &str {
        &self.typing_text
    }

    pub fn quick_replies(&self) -> &[QuickReplyAction] {
        &self.quick_replies
    }

    pub fn quick_reply_revision(&self) -> u64 {
        self.quick_reply_revision
    }

    pub fn order_buttons(&self) -> &[QuickReplyAction] {
        &self.order_buttons
    }

    pub fn order_button_revision(&self) -> u64 {
        self.order_button_revision
    }

    pub fn selected_action(&self) -> Option<usize> {
        self.selected_action
    }

    // true while a request is outstanding with the endpoint
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}
