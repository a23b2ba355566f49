//! Closed outcome taxonomies
//!
//! Every task category has a fixed set of tags. Declaration order is
//! severity order, lowest first, so the derived `Ord` compares severity.

use std::fmt;
use std::hash::Hash;

use console::Style;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Display color of an outcome tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Green,
    Cyan,
    Yellow,
    Red,
}

impl Color {
    /// Terminal style for this color
    pub fn style(self) -> Style {
        match self {
            Self::Green => Style::new().green(),
            Self::Cyan => Style::new().cyan(),
            Self::Yellow => Style::new().yellow(),
            Self::Red => Style::new().red(),
        }
    }

    /// Render `text` in this color (plain when the terminal has no colors)
    pub fn paint(self, text: &str) -> String {
        self.style().apply_to(text).to_string()
    }
}

/// A closed, totally ordered set of task outcome tags
pub trait Outcome:
    Copy + Eq + Ord + Hash + fmt::Debug + fmt::Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Every tag of the category, lowest severity first
    const ALL: &'static [Self];

    /// The tag a task produces when everything went as planned
    const NOMINAL: Self;

    /// The tag of a task that was cancelled before or during execution
    const CANCEL: Self;

    /// The tag of a task that failed with an error
    const ERROR: Self;

    /// The tag of a task that chose not to run, if the category has one
    const SKIP: Option<Self>;

    /// Upper-case tag name
    fn name(self) -> &'static str;

    /// Display color of the tag
    fn color(self) -> Color;

    /// Position in severity order
    fn severity(self) -> usize {
        Self::ALL.iter().position(|tag| *tag == self).unwrap_or(0)
    }

    /// Whether the tag means "did not run" rather than a verdict
    fn is_inconclusive(self) -> bool {
        self == Self::CANCEL || Some(self) == Self::SKIP
    }

    /// Look up a tag by name, case-insensitively
    fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|tag| tag.name().eq_ignore_ascii_case(name.trim()))
    }

    /// Tag name rendered in the tag's color
    fn colored(self) -> String {
        self.color().paint(self.name())
    }
}

/// Outcome of a plain task
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GenericOutcome {
    Done,
    Cancel,
    Error,
}

impl Outcome for GenericOutcome {
    const ALL: &'static [Self] = &[Self::Done, Self::Cancel, Self::Error];
    const NOMINAL: Self = Self::Done;
    const CANCEL: Self = Self::Cancel;
    const ERROR: Self = Self::Error;
    const SKIP: Option<Self> = None;

    fn name(self) -> &'static str {
        match self {
            Self::Done => "DONE",
            Self::Cancel => "CANCEL",
            Self::Error => "ERROR",
        }
    }

    fn color(self) -> Color {
        match self {
            Self::Done => Color::Green,
            Self::Cancel => Color::Cyan,
            Self::Error => Color::Red,
        }
    }
}

/// Outcome of a build, fetch or simulation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildOutcome {
    Done,
    Skip,
    Cancel,
    Error,
}

impl Outcome for BuildOutcome {
    const ALL: &'static [Self] = &[Self::Done, Self::Skip, Self::Cancel, Self::Error];
    const NOMINAL: Self = Self::Done;
    const CANCEL: Self = Self::Cancel;
    const ERROR: Self = Self::Error;
    const SKIP: Option<Self> = Some(Self::Skip);

    fn name(self) -> &'static str {
        match self {
            Self::Done => "DONE",
            Self::Skip => "SKIP",
            Self::Cancel => "CANCEL",
            Self::Error => "ERROR",
        }
    }

    fn color(self) -> Color {
        match self {
            Self::Done => Color::Green,
            Self::Skip | Self::Cancel => Color::Cyan,
            Self::Error => Color::Red,
        }
    }
}

/// Outcome of a test
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestOutcome {
    Pass,
    Skip,
    Cancel,
    Fail,
    Error,
}

impl Outcome for TestOutcome {
    const ALL: &'static [Self] = &[Self::Pass, Self::Skip, Self::Cancel, Self::Fail, Self::Error];
    const NOMINAL: Self = Self::Pass;
    const CANCEL: Self = Self::Cancel;
    const ERROR: Self = Self::Error;
    const SKIP: Option<Self> = Some(Self::Skip);

    fn name(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Skip => "SKIP",
            Self::Cancel => "CANCEL",
            Self::Fail => "FAIL",
            Self::Error => "ERROR",
        }
    }

    fn color(self) -> Color {
        match self {
            Self::Pass => Color::Green,
            Self::Skip | Self::Cancel => Color::Cyan,
            Self::Fail => Color::Yellow,
            Self::Error => Color::Red,
        }
    }
}

/// Outcome of an update to persisted reference data
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateOutcome {
    Keep,
    Skip,
    Cancel,
    Insert,
    Update,
    Error,
}

impl Outcome for UpdateOutcome {
    const ALL: &'static [Self] = &[
        Self::Keep,
        Self::Skip,
        Self::Cancel,
        Self::Insert,
        Self::Update,
        Self::Error,
    ];
    const NOMINAL: Self = Self::Keep;
    const CANCEL: Self = Self::Cancel;
    const ERROR: Self = Self::Error;
    const SKIP: Option<Self> = Some(Self::Skip);

    fn name(self) -> &'static str {
        match self {
            Self::Keep => "KEEP",
            Self::Skip => "SKIP",
            Self::Cancel => "CANCEL",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Error => "ERROR",
        }
    }

    fn color(self) -> Color {
        match self {
            Self::Keep => Color::Green,
            Self::Skip | Self::Cancel => Color::Cyan,
            Self::Insert | Self::Update => Color::Yellow,
            Self::Error => Color::Red,
        }
    }
}

macro_rules! display_by_name {
    ($($ty:ty),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.name())
                }
            }
        )*
    };
}

display_by_name!(GenericOutcome, BuildOutcome, TestOutcome, UpdateOutcome);
