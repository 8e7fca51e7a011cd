//! Selection dialogue - resolving a free-form answer to one route option
//!
//! Resolution order, first rule satisfied wins:
//! 1. the first number token ("one"/"1" .. "three"/"3") picks that option
//! 2. otherwise the first mode keyword picks the first option of that mode
//! 3. otherwise the shortest option, ties going to the earliest in the list
//!
//! A number that is out of range does not fall through to the mode keywords:
//! the user named an option that does not exist, so the shortest is used.

use crate::domain::route::{RouteMode, RouteOption};

/// Which rule produced the selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionRule {
    Number,
    Mode,
    Shortest,
}

/// Outcome of resolving a response against an option list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    /// Index into the option list
    pub index: usize,
    pub rule: SelectionRule,
}

impl Selection {
    /// True when the user's answer was not understood
    pub fn is_fallback(&self) -> bool {
        self.rule == SelectionRule::Shortest
    }
}

fn number_token(token: &str) -> Option<usize> {
    match token {
        "one" | "1" => Some(1),
        "two" | "2" => Some(2),
        "three" | "3" => Some(3),
        _ => None,
    }
}

/// Index of the option with the smallest duration, earliest on ties
pub fn shortest(options: &[RouteOption]) -> Option<usize> {
    options
        .iter()
        .enumerate()
        .min_by_key(|(index, option)| (option.duration_min, *index))
        .map(|(index, _)| index)
}

/// Resolve `response` against `options`; `None` only when `options` is empty
pub fn resolve(response: &str, options: &[RouteOption]) -> Option<Selection> {
    let fallback = Selection { index: shortest(options)?, rule: SelectionRule::Shortest };

    let lowered = response.to_lowercase();
    let tokens: Vec<&str> = lowered.split_whitespace().collect();

    if let Some(number) = tokens.iter().find_map(|token| number_token(token)) {
        return Some(if (1..=options.len()).contains(&number) {
            Selection { index: number - 1, rule: SelectionRule::Number }
        } else {
            fallback
        });
    }

    let mode = tokens.iter().find_map(|token| RouteMode::from_keyword(token));
    let by_mode = mode.and_then(|mode| options.iter().position(|option| option.mode == mode));

    Some(match by_mode {
        Some(index) => Selection { index, rule: SelectionRule::Mode },
        None => fallback,
    })
}
