use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(UserId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    System,
}

/// Downstream handling path whose confidence is tracked on the dashboard.
///
/// Declaration order is the tie-break order for leader selection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    #[default]
    GrowthChallenge,
    ReflectionAgent,
    WisdomCapture,
}

impl Route {
    pub const ALL: [Route; 3] = [
        Route::GrowthChallenge,
        Route::ReflectionAgent,
        Route::WisdomCapture,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Route::GrowthChallenge => "growth_challenge",
            Route::ReflectionAgent => "reflection_agent",
            Route::WisdomCapture => "wisdom_capture",
        }
    }

    pub fn display_name(self) -> String {
        self.as_str().replacen('_', " ", 1)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|route| route.as_str() == raw)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_names_round_trip_through_parse() {
        for route in Route::ALL {
            assert_eq!(Route::parse(route.as_str()), Some(route));
        }
        assert_eq!(Route::parse("unknown_route"), None);
    }

    #[test]
    fn display_name_replaces_first_underscore() {
        assert_eq!(Route::GrowthChallenge.display_name(), "growth challenge");
        assert_eq!(Route::WisdomCapture.display_name(), "wisdom capture");
    }

    #[test]
    fn user_id_serializes_as_plain_string() {
        let encoded = serde_json::to_string(&UserId::from("u-1")).expect("encode");
        assert_eq!(encoded, "\"u-1\"");
    }
}
