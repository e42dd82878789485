use serde::{Deserialize, Serialize};

/// An unknown wire string for one of the enums below.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid enum value for {field}: {value}")]
pub struct ParseEnumError {
    pub field: String,
    pub value: String,
}

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(ParseEnumError {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(DocumentStatus {
    Pending => "pending",
    Processing => "processing",
    Completed => "completed",
    Failed => "failed",
    Archived => "archived",
});

str_enum!(FieldType {
    Text => "text",
    Number => "number",
    Currency => "currency",
    Percentage => "percentage",
    Date => "date",
    Ssn => "ssn",
    Ein => "ein",
    Checkbox => "checkbox",
});

str_enum!(Severity {
    Info => "info",
    Warning => "warning",
    Error => "error",
});

str_enum!(MessageRole {
    User => "user",
    Assistant => "assistant",
    System => "system",
});

str_enum!(SessionKind {
    General => "general",
    TaxAssistant => "tax_assistant",
    EmailAgent => "email_agent",
});

str_enum!(FormCategory {
    Individual => "individual",
    Business => "business",
    Payroll => "payroll",
    Estate => "estate",
    Other => "other",
});

str_enum!(FormComplexity {
    Basic => "basic",
    Intermediate => "intermediate",
    Advanced => "advanced",
});

str_enum!(FormStatus {
    Draft => "draft",
    Review => "review",
    Finalized => "finalized",
    Filed => "filed",
});

impl DocumentStatus {
    /// Server-side processing has not reached an outcome yet.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

impl Severity {
    fn rank(&self) -> u8 {
        match self {
            Self::Info => 0,
            Self::Warning => 1,
            Self::Error => 2,
        }
    }
}

impl PartialOrd for Severity {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Severity {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl FormStatus {
    /// Workflow `draft → review → finalized → filed`, with `review → draft`
    /// to send a form back. Filed forms are terminal.
    pub fn can_transition_to(&self, next: FormStatus) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Review)
                | (Self::Review, Self::Finalized)
                | (Self::Review, Self::Draft)
                | (Self::Finalized, Self::Filed)
        )
    }
}
