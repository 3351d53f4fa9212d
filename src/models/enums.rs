//! Choice lists stored as short string codes.

use crate::db::DatabaseError;

/// Macro to generate enum with as_str + std::str::FromStr pattern.
///
/// Serialized form is the stored code, so JSON payloads and database rows
/// share one vocabulary.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const CHOICES: &'static [&'static str] = &[$($s),+];

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

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = <String as serde::Deserialize>::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

str_enum!(Degree {
    Md => "MD",
    Do => "DO",
    Np => "NP",
    Pa => "PA",
    Dc => "DC",
    Dds => "DDS",
    Dmd => "DMD",
    PhD => "PhD",
    Other => "Other",
});

str_enum!(Gender {
    Male => "Male",
    Female => "Female",
});

str_enum!(MaritalStatus {
    Single => "Single",
    Married => "Married",
    Separated => "Separated",
    Divorced => "Divorced",
    Widowed => "Widowed",
    PreferNotToAnswer => "Prefer not to answer",
    Other => "Other",
});

str_enum!(Relationship {
    SelfInsured => "Self",
    Spouse => "Spouse",
    Child => "Child",
    Mother => "Mother",
    Father => "Father",
    Grandparent => "Grandparent",
    Grandchild => "Grandchild",
    NieceNephew => "Niece/Nephew",
    Stepchild => "Stepchild",
    Fosterchild => "Fosterchild",
    Ward => "Ward",
    Employee => "Employee",
    LifePartner => "Life Partner",
    SignificantOther => "Significant Other",
    HandicappedDependent => "Handicapped Dependent",
    Other => "Other",
    Unknown => "Unknown",
});

str_enum!(Language {
    BrazilianPortuguese => "Brazilian Portuguese",
    French => "French",
    German => "German",
    Italian => "Italian",
    Japanese => "Japanese",
    Korean => "Korean",
    Portuguese => "Portuguese",
    Russian => "Russian",
    SimplifiedChinese => "Simplified Chinese",
    Spanish => "Spanish",
    TraditionalChinese => "Traditional Chinese",
    UnitedStatesEnglish => "United States English",
});

str_enum!(Ethnicity {
    HispanicLatino => "Hispanic and Latino",
    NotHispanicLatino => "Not Hispanic and Latino",
});

str_enum!(InsuranceType {
    Primary => "Primary",
    Secondary => "Secondary",
    Tertiary => "Tertiary",
    Other => "Other",
});

str_enum!(UsState {
    Al => "AL", Ak => "AK", Az => "AZ", Ar => "AR", Ca => "CA",
    Co => "CO", Ct => "CT", De => "DE", Dc => "DC", Fl => "FL",
    Ga => "GA", Hi => "HI", Id => "ID", Il => "IL", In => "IN",
    Ia => "IA", Ks => "KS", Ky => "KY", La => "LA", Me => "ME",
    Md => "MD", Ma => "MA", Mi => "MI", Mn => "MN", Ms => "MS",
    Mo => "MO", Mt => "MT", Ne => "NE", Nv => "NV", Nh => "NH",
    Nj => "NJ", Nm => "NM", Ny => "NY", Nc => "NC", Nd => "ND",
    Oh => "OH", Ok => "OK", Or => "OR", Pa => "PA", Ri => "RI",
    Sc => "SC", Sd => "SD", Tn => "TN", Tx => "TX", Ut => "UT",
    Vt => "VT", Va => "VA", Wa => "WA", Wv => "WV", Wi => "WI",
    Wy => "WY",
});

str_enum!(Arm {
    Left => "L",
    Right => "R",
});

str_enum!(InjectionReaction {
    Mr => "MR",
    Nr => "NR",
    Mm3 => "3mm",
    Mm4 => "4mm",
    Mm5 => "5mm",
    Mm6 => "6mm",
    Mm7 => "7mm",
    Mm8 => "8mm",
    Mm9 => "9mm",
    Mm10 => "10mm",
    Over10mm => ">10mm",
});

str_enum!(AllergenCategory {
    Food => "food",
    Environmental => "environmental",
});

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn codes_round_trip_through_from_str() {
        for code in InjectionReaction::CHOICES {
            assert_eq!(InjectionReaction::from_str(code).unwrap().as_str(), *code);
        }
        assert_eq!(UsState::CHOICES.len(), 51);
    }

    #[test]
    fn unknown_code_is_invalid_enum() {
        let err = Degree::from_str("MBBS").unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidEnum { ref value, .. } if value == "MBBS"));
    }

    #[test]
    fn serializes_as_code() {
        assert_eq!(serde_json::to_string(&Arm::Left).unwrap(), "\"L\"");
        let parsed: MaritalStatus = serde_json::from_str("\"Prefer not to answer\"").unwrap();
        assert_eq!(parsed, MaritalStatus::PreferNotToAnswer);
        assert!(serde_json::from_str::<Gender>("\"male\"").is_err());
    }
}
