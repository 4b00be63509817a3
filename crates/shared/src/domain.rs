use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(SurveyId);
id_newtype!(OptionId);
id_newtype!(AgencyId);

/// List filter accepted by `GET /surveys/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurveyStatus {
    #[default]
    Ongoing,
    Done,
}

impl SurveyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SurveyStatus::Ongoing => "ongoing",
            SurveyStatus::Done => "done",
        }
    }
}

impl fmt::Display for SurveyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SurveyStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ongoing" => Ok(SurveyStatus::Ongoing),
            "done" => Ok(SurveyStatus::Done),
            other => Err(format!("unknown survey status '{other}'")),
        }
    }
}

/// Display framing of an option, fixed by its `order_num` position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionTone {
    Positive,
    Negative,
}

impl OptionTone {
    /// First option in display order is the positive one, everything after it negative.
    pub fn for_position(index: usize) -> Self {
        if index == 0 {
            OptionTone::Positive
        } else {
            OptionTone::Negative
        }
    }
}
