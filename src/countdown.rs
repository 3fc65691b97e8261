use std::time::{Duration, Instant};

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};

use crate::config::ConfiguredFlashSale;

pub const ENDED_TEXT: &str = "Flash Sale Berakhir";
pub const INVALID_TEXT: &str = "Tidak valid";
pub const ENDED_PURCHASE_HINT: &str = "Flash sale sudah berakhir";

const TICK_INTERVAL: Duration = Duration::from_secs(1);
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CountdownState {
    Running,
    Ended,
    Invalid,
}

// Renders the remaining time as HH:MM:SS. Hours keep counting past 24 and
// negative durations clamp to zero.
pub fn format_remaining(remaining: chrono::Duration) -> String {
    let total_seconds = remaining.num_seconds().max(0);
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

// accepts RFC 3339, or a naive timestamp which is taken as local time
pub fn parse_end_time(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}

// One flash sale card with its own once-a-second countdown.
#[derive(Clone, Debug)]
pub struct FlashSaleCard {
    pub name: String,
    pub price: Option<String>,
    end_time: Option<DateTime<Utc>>,
    text: String,
    state: CountdownState,

    // None once the card's timer has stopped for good
    next_tick: Option<Instant>,
}
impl FlashSaleCard {
    pub fn new(sale: &ConfiguredFlashSale, now: DateTime<Utc>, now_instant: Instant) -> Self {
        let end_time = parse_end_time(&sale.end_time);
        if end_time.is_none() {
            log::warn!(
                "Flash sale '{}' has an unreadable end time: '{}'",
                sale.name,
                sale.end_time
            );
        }

        let mut card = Self {
            name: sale.name.clone(),
            price: sale.price.clone(),
            end_time,
            text: String::new(),
            state: CountdownState::Running,
            next_tick: Some(now_instant + TICK_INTERVAL),
        };
        card.update(now);
        card
    }

    // runs the card's countdown if its next second is due; returns true if it ran
    pub fn tick(&mut self, now: DateTime<Utc>, now_instant: Instant) -> bool {
        match self.next_tick {
            Some(due) if now_instant >= due => {
                self.update(now);
                if let Some(next) = self.next_tick.as_mut() {
                    // stay on the one second cadence without queueing up missed ticks
                    while *next <= now_instant {
                        *next += TICK_INTERVAL;
                    }
                }
                true
            }
            _ => false,
        }
    }

    fn update(&mut self, now: DateTime<Utc>) {
        let end_time = match self.end_time {
            Some(end) => end,
            None => {
                self.text = INVALID_TEXT.to_owned();
                self.stop(CountdownState::Invalid);
                return;
            }
        };

        let remaining = end_time - now;
        if remaining.num_milliseconds() <= 0 {
            self.text = ENDED_TEXT.to_owned();
            self.stop(CountdownState::Ended);
            return;
        }

        self.text = format_remaining(remaining);
    }

    fn stop(&mut self, state: CountdownState) {
        if self.next_tick.is_some() {
            log::debug!("Countdown for '{}' stopped: {:?}", self.name, state);
        }
        self.state = state;
        self.next_tick = None;
    }

    pub fn countdown_text(&self) -> &str {
        &self.text
    }

    pub fn state(&self) -> CountdownState {
        self.state
    }

    pub fn is_stopped(&self) -> bool {
        self.next_tick.is_none()
    }

    // an ended card is shown muted
    pub fn is_ended(&self) -> bool {
        self.state != CountdownState::Running
    }

    pub fn purchase_enabled(&self) -> bool {
        self.state == CountdownState::Running
    }

    pub fn purchase_hint(&self) -> Option<&str> {
        if self.purchase_enabled() {
            None
        } else {
            Some(ENDED_PURCHASE_HINT)
        }
    }
}

// all the cards on the storefront board
#[derive(Clone, Debug, Default)]
pub struct FlashSaleBoard {
    pub cards: Vec<FlashSaleCard>,
}
impl FlashSaleBoard {
    pub fn new(sales: &[ConfiguredFlashSale]) -> Self {
        let now = Utc::now();
        let now_instant = Instant::now();
        Self {
            cards: sales
                .iter()
                .map(|sale| FlashSaleCard::new(sale, now, now_instant))
                .collect(),
        }
    }

    // ticks every card that's due; returns true if any card updated
    pub fn tick(&mut self, now: DateTime<Utc>, now_instant: Instant) -> bool {
        let mut any = false;
        for card in self.cards.iter_mut() {
            any |= card.tick(now, now_instant);
        }
        any
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}
