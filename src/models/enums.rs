use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

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
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
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

str_enum!(InvitationStatus {
    Pending => "pending",
    Accepted => "accepted",
    Rejected => "rejected",
    Expired => "expired",
});

str_enum!(ResourceType {
    Documents => "documents",
    Prescriptions => "prescriptions",
    Medications => "medications",
    Allergies => "allergies",
    Vaccines => "vaccines",
    Antecedentes => "antecedentes",
});

str_enum!(DoseStatus {
    Pending => "pending",
    Taken => "taken",
    Missed => "missed",
});

str_enum!(AlertRelatedType {
    Prescription => "prescription",
});

impl ResourceType {
    pub const ALL: [ResourceType; 6] = [
        ResourceType::Documents,
        ResourceType::Prescriptions,
        ResourceType::Medications,
        ResourceType::Allergies,
        ResourceType::Vaccines,
        ResourceType::Antecedentes,
    ];

    /// Types stored in the generic `patient_records` table.
    pub fn is_patient_record(&self) -> bool {
        matches!(
            self,
            Self::Documents | Self::Allergies | Self::Vaccines | Self::Antecedentes
        )
    }
}
