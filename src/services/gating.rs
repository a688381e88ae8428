//! Trading-hours gating for commands that change account state.

use chrono::{Datelike, Local, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Deserializer};
use std::sync::Mutex;

use crate::error::ExecutorError;

/// Source of "now" for gating decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Settable clock for tests and replays.
pub struct FixedClock(Mutex<NaiveDateTime>);

impl FixedClock {
    pub fn new(at: NaiveDateTime) -> Self {
        Self(Mutex::new(at))
    }

    pub fn set(&self, at: NaiveDateTime) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Session {
    #[serde(deserialize_with = "time_of_day")]
    pub open: NaiveTime,
    #[serde(deserialize_with = "time_of_day")]
    pub close: NaiveTime,
}

impl Session {
    pub fn new(open: NaiveTime, close: NaiveTime) -> Self {
        Self { open, close }
    }

    /// Both ends inclusive.
    pub fn contains(&self, t: NaiveTime) -> bool {
        t >= self.open && t <= self.close
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TradingWindowPolicy {
    pub sessions: Vec<Session>,
    pub weekdays_only: bool,
}

impl Default for TradingWindowPolicy {
    fn default() -> Self {
        Self {
            sessions: vec![Session::new(hm(9, 25), hm(15, 0))],
            weekdays_only: true,
        }
    }
}

impl TradingWindowPolicy {
    pub fn allows(&self, now: NaiveDateTime) -> bool {
        if self.weekdays_only && matches!(now.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        let t = now.time();
        self.sessions.iter().any(|s| s.contains(t))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sessions.is_empty() {
            return Err("at least one session is required".to_string());
        }
        for s in &self.sessions {
            if s.open >= s.close {
                return Err(format!("session {} must open before it closes", describe_session(s)));
            }
        }
        Ok(())
    }

    pub fn describe(&self) -> String {
        let sessions: Vec<String> = self.sessions.iter().map(describe_session).collect();
        let days = if self.weekdays_only { " Mon-Fri" } else { "" };
        format!("{}{}", sessions.join(", "), days)
    }
}

/// `Err(GatingError)` when `now` falls outside every session.
pub fn trading_window_check(now: NaiveDateTime, policy: &TradingWindowPolicy) -> Result<(), ExecutorError> {
    if policy.allows(now) {
        Ok(())
    } else {
        Err(ExecutorError::GatingError {
            now: now.format("%a %Y-%m-%d %H:%M:%S").to_string(),
            sessions: policy.describe(),
        })
    }
}

fn describe_session(s: &Session) -> String {
    format!("{}-{}", s.open.format("%H:%M"), s.close.format("%H:%M"))
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN)
}

/// Accepts "HH:MM" or "HH:MM:SS".
fn time_of_day<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
    let raw = String::deserialize(d)?;
    NaiveTime::parse_from_str(raw.trim(), "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw.trim(), "%H:%M"))
        .map_err(|e| serde::de::Error::custom(format!("invalid time '{}': {}", raw, e)))
}
